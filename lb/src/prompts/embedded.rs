//! Embedded templates
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Workspace manifest describing the originating ticket
pub const MANIFEST: &str = include_str!("../../prompts/manifest.pmt");

/// Offline PRD skeleton built from ticket fields
pub const PRD: &str = include_str!("../../prompts/prd.pmt");

/// Request handed to an external PRD generator command
pub const PRD_REQUEST: &str = include_str!("../../prompts/prd_request.pmt");

/// Get the embedded template by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "manifest" => Some(MANIFEST),
        "prd" => Some(PRD),
        "prd_request" => Some(PRD_REQUEST),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
