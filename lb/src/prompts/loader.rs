//! Template loading and rendering

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::domain::Ticket;

use super::embedded;

/// Ticket fields exposed to templates
#[derive(Debug, Clone, Serialize)]
pub struct TicketContext {
    pub id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(rename = "type")]
    pub r#type: String,
    pub priority: String,
}

impl From<&Ticket> for TicketContext {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id.clone(),
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            acceptance_criteria: ticket.acceptance_criteria.clone(),
            r#type: ticket.r#type.to_string(),
            priority: ticket.priority.to_string(),
        }
    }
}

/// Loads and renders templates
///
/// Checks an optional override directory for `{name}.pmt` before falling
/// back to the embedded copy.
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    pub fn new(override_dir: Option<impl AsRef<Path>>) -> Self {
        let override_dir = override_dir
            .map(|d| d.as_ref().to_path_buf())
            .filter(|d| d.exists());
        debug!(?override_dir, "PromptLoader::new: called");
        let mut hbs = Handlebars::new();
        // Output is markdown, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs, override_dir }
    }

    /// Create a loader that only uses embedded templates
    pub fn embedded_only() -> Self {
        Self::new(None::<&Path>)
    }

    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read template {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Template not found: {}", name))
    }

    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        debug!(%name, "PromptLoader::render: called");
        let template = self.load_template(name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", name, e))
    }

    pub fn render_ticket(&self, name: &str, ticket: &Ticket) -> Result<String> {
        self.render(name, &TicketContext::from(ticket))
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TicketType};
    use tempfile::tempdir;

    fn sample() -> Ticket {
        let mut ticket = Ticket::with_id("t-42", "Fix <login> & logout");
        ticket.description = "Users get logged out".to_string();
        ticket.acceptance_criteria = vec!["Session survives refresh".to_string()];
        ticket.r#type = TicketType::Bug;
        ticket.priority = Priority::High;
        ticket
    }

    #[test]
    fn test_render_manifest() {
        let loader = PromptLoader::embedded_only();
        let out = loader.render_ticket("manifest", &sample()).unwrap();

        assert!(out.starts_with("# Fix <login> & logout"));
        assert!(out.contains("t-42"));
        assert!(out.contains("bug"));
        assert!(out.contains("high"));
        assert!(out.contains("Users get logged out"));
        assert!(out.contains("- [ ] Session survives refresh"));
    }

    #[test]
    fn test_manifest_without_criteria() {
        let loader = PromptLoader::embedded_only();
        let ticket = Ticket::with_id("t-1", "Bare");
        let out = loader.render_ticket("manifest", &ticket).unwrap();

        assert!(!out.contains("Acceptance Criteria"));
        assert!(out.contains("No description provided"));
    }

    #[test]
    fn test_override_directory_wins() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("manifest.pmt"), "custom {{id}}").unwrap();

        let loader = PromptLoader::new(Some(temp.path()));
        assert_eq!(loader.render_ticket("manifest", &sample()).unwrap(), "custom t-42");
        // Not overridden, still embedded
        assert!(loader.render_ticket("prd", &sample()).unwrap().starts_with("# PRD:"));
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render_ticket("nope", &sample()).is_err());
    }
}
