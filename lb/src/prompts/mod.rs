//! Template System
//!
//! Loads and renders `.pmt` template files: the workspace manifest and the
//! PRD texts.
//!
//! Template loading chain:
//! 1. `{templates-dir}/{name}.pmt` (user override, when configured)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{PromptLoader, TicketContext};
