//! Uniform tool invocation surface (§3, §4.D). Concrete adapters (email, CRM, calendar, …) are
//! out of scope (§1 Non-goals) — this is the seam a deployment plugs them into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ToolId;

/// A structured failure from a tool invocation, distinct from [`crate::error::ConduitError`]
/// because a tool's failure modes (a downstream CRM being unreachable, a malformed parameter)
/// are defined by the tool author, not by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    /// Whether retrying the same call might succeed (e.g. a transient network failure vs. a
    /// validation error that will fail identically every time).
    pub retryable: bool,
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

/// One invokable capability. Implementations wrap whatever the real side effect is (an email
/// send, a CRM write, a calendar lookup) behind this uniform `run` method.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Configuration keys this tool needs present on its [`crate::domain::ToolReference`]
    /// before it can run (e.g. `["api_key", "from_address"]`).
    fn required_config(&self) -> &[String];
    async fn run(&self, params: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Looks up registered [`Tool`]s by id for the workflow interpreter and agent tool binding.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<ToolId, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id(), tool);
    }

    pub fn get(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        self.tools.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        id: ToolId,
        required: Vec<String>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn id(&self) -> ToolId {
            self.id
        }
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "returns its input unchanged"
        }
        fn required_config(&self) -> &[String] {
            &self.required
        }
        async fn run(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
            Ok(Value::Object(params))
        }
    }

    #[tokio::test]
    async fn registry_resolves_registered_tool() {
        let id = ToolId::new();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool {
            id,
            required: vec![],
        }));

        let tool = registry.get(id).expect("tool should be registered");
        let mut params = Map::new();
        params.insert("hello".to_string(), Value::String("world".to_string()));
        let result = tool.run(params.clone()).await.unwrap();
        assert_eq!(result, Value::Object(params));
    }

    #[test]
    fn unregistered_tool_is_none() {
        let registry = ToolRegistry::new();
        assert!(registry.get(ToolId::new()).is_none());
    }
}
