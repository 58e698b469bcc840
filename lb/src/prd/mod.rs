//! PRD approval gate
//!
//! A PRD is generated for a ticket, stored unapproved, then approved or
//! rejected by a human. Execution is only allowed with an approved PRD.

mod gate;
mod generator;

pub use gate::{GateError, can_execute, check_executable};
pub use generator::{CommandPrdGenerator, PrdError, PrdGenerator, TemplatePrdGenerator};
