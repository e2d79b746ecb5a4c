//! Template-render seam.
//!
//! Rendering is external to the router: pure, side-effect-free, and injected
//! at construction.  The engine ships a plain `{var}`-substitution catalog;
//! a real deployment can swap in its CMS-backed renderer.

use serde_json::Value;

use crate::error::Result;

/// Output of a render call.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
}

/// Pure template renderer.
pub trait TemplateRenderer: Send + Sync {
    /// Render `template_key` with the given variables.
    fn render(&self, template_key: &str, variables: &Value) -> Result<Rendered>;
}
