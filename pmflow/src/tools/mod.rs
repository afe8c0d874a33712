//! Tools agents can call.
//!
//! Every tool answers with a [`ToolOutput`]: a status line the model reads
//! (`✅ ...` / `❌ ...`) plus the structured id of anything it created. Tools
//! never return errors; failures, bad arguments and timeouts all become
//! failure lines the agent can react to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::core::status_line;
use crate::io::board::BoardClient;
use crate::io::llm::ToolDefinition;

pub mod board;
pub mod search;

pub use board::{BoardOp, BoardTool};
pub use search::WebSearchTool;

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub ok: bool,
    /// Status line handed back to the model.
    pub message: String,
    /// Id of the entity the call created, if any.
    pub created_id: Option<String>,
}

impl ToolOutput {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            created_id: None,
        }
    }

    pub fn created(message: impl Into<String>, id: &str) -> Self {
        Self {
            ok: true,
            message: message.into(),
            created_id: Some(id.to_string()),
        }
    }

    pub fn failure(action: &str, error: &str) -> Self {
        Self {
            ok: false,
            message: status_line::failure(action, error),
            created_id: None,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn call(&self, args: Value) -> ToolOutput;
}

/// Decode tool arguments into a typed input.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    match args {
        Value::Object(_) => {
            serde_json::from_value(args).map_err(|err| format!("invalid arguments: {err}"))
        }
        Value::Null => serde_json::from_value(Value::Object(Default::default()))
            .map_err(|err| format!("invalid arguments: {err}")),
        other => Err(format!("arguments must be a JSON object, got {other}")),
    }
}

/// Name-indexed set of tools available to agents.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// All sixteen board tools over `board`, each call capped at `timeout`.
    pub fn with_board(board: Arc<dyn BoardClient>, timeout: Duration) -> Self {
        let mut toolbox = Self::new();
        for op in BoardOp::ALL {
            toolbox.register(Arc::new(BoardTool::new(op, board.clone(), timeout)));
        }
        toolbox
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Function declarations for `names`; the first unknown name is the error.
    pub fn definitions(&self, names: &[String]) -> Result<Vec<ToolDefinition>, String> {
        names
            .iter()
            .map(|name| {
                let tool = self.tools.get(name).ok_or_else(|| name.clone())?;
                Ok(ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                })
            })
            .collect()
    }

    pub async fn invoke(&self, name: &str, args: Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput::failure(&format!("calling tool '{name}'"), "unknown tool");
        };
        let output = tool.call(args).await;
        debug!(tool = name, ok = output.ok, "tool call finished");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBoard;
    use serde_json::json;

    fn toolbox() -> Toolbox {
        Toolbox::with_board(Arc::new(FakeBoard::new()), Duration::from_secs(5))
    }

    #[test]
    fn board_toolbox_registers_sixteen_tools() {
        let toolbox = toolbox();
        assert_eq!(toolbox.names().len(), 16);
        assert!(toolbox.has("create_card"));
        assert!(toolbox.has("remove_label_from_card"));
        assert!(!toolbox.has("create_board"));
    }

    #[test]
    fn definitions_report_unknown_names() {
        let toolbox = toolbox();
        let defs = toolbox
            .definitions(&["create_card".to_string(), "move_card".to_string()])
            .expect("definitions");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].parameters["type"], "object");
        assert_eq!(
            toolbox.definitions(&["launch_rocket".to_string()]),
            Err("launch_rocket".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_line() {
        let output = toolbox().invoke("launch_rocket", json!({})).await;
        assert!(!output.ok);
        assert_eq!(
            output.message,
            "❌ Error calling tool 'launch_rocket': unknown tool"
        );
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        #[derive(Debug, serde::Deserialize)]
        struct Input {
            #[allow(dead_code)]
            card_id: String,
        }
        let err = parse_args::<Input>(json!("{not json")).expect_err("string args");
        assert!(err.contains("must be a JSON object"));
        let err = parse_args::<Input>(json!({})).expect_err("missing field");
        assert!(err.contains("card_id"));
    }
}
