//! Prompt template (§3, GLOSSARY "business action").

use serde::{Deserialize, Serialize};

use super::{PromptId, TenantId, ToolId};

/// {name, body with `{variable}` placeholders, declared variables, optional bound tool}.
///
/// A template with a bound tool is a "business action" — the unit exposed to end users for
/// composing workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: PromptId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Body text containing `{variable}` placeholders. Distinct from the workflow interpreter's
    /// `{{scope.key}}` interpolation grammar (§4.D) — prompt templates are rendered once, up
    /// front, against a flat variable map, before the result ever reaches the interpreter.
    pub body: String,
    pub variables: Vec<String>,
    pub bound_tool: Option<ToolId>,
}

impl PromptTemplate {
    /// `true` when this template is a "business action" (bound to exactly one tool).
    pub fn is_business_action(&self) -> bool {
        self.bound_tool.is_some()
    }

    /// Render the template by substituting `{name}` placeholders with `variables` values.
    /// Unknown placeholders are left as-is (the caller is expected to have validated
    /// `self.variables` against the supplied map beforehand).
    pub fn render(&self, variables: &std::collections::HashMap<String, String>) -> String {
        let mut out = self.body.clone();
        for (key, value) in variables {
            out = out.replace(&format!("{{{}}}", key), value);
        }
        out
    }
}
