//! Tool reference (§3). The concrete side effect behind a tool is out of scope (§1); this is
//! only the identity/status record the interpreter consults before invoking a
//! [`crate::tool::Tool`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{TenantId, ToolId};

/// The business domain a tool belongs to. Free-form categories beyond these four are expected in
/// a real deployment; the enum's `Other` variant covers them without the core needing to know
/// every category up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Email,
    Crm,
    Calendar,
    Seo,
    Other(String),
}

/// A tool with status other than `Active` MUST NOT be invoked (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Active,
    Beta,
    ComingSoon,
    Disabled,
}

impl ToolStatus {
    pub fn is_invocable(self) -> bool {
        matches!(self, ToolStatus::Active)
    }
}

/// {identity, category, status, required-config keys, stored config values}.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReference {
    pub id: ToolId,
    pub tenant_id: TenantId,
    pub name: String,
    pub category: ToolCategory,
    pub status: ToolStatus,
    pub required_config_keys: Vec<String>,
    pub config: HashMap<String, String>,
}

impl ToolReference {
    /// `Err` listing the missing keys if `config` doesn't satisfy `required_config_keys`.
    pub fn missing_config_keys(&self) -> Vec<&str> {
        self.required_config_keys
            .iter()
            .filter(|k| !self.config.contains_key(k.as_str()))
            .map(|k| k.as_str())
            .collect()
    }
}
