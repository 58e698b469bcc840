//! Per-ticket workspace provisioning
//!
//! Each ticket runs its agent inside its own directory under a user-chosen
//! base path, initialized as a git checkout and seeded with a manifest.

mod provisioner;
mod slug;

pub use provisioner::{ProvisionerConfig, ProvisioningError, WorktreeProvisioner};
pub use slug::{MAX_SLUG_LEN, slugify};
