//! Agent loop: call the model, run requested tools, repeat until the model
//! answers without tool calls or the budget runs out.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::remaining_budget;
use crate::engine::{AgentError, AgentLimits, AgentSpec};
use crate::io::llm::{ChatMessage, ChatModel, ChatRequest, ToolDefinition};
use crate::tools::{ToolOutput, Toolbox};

/// One tool call made during an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub ok: bool,
    pub created_id: Option<String>,
}

/// Prompts and tool declarations for one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTurn {
    pub system: String,
    pub prompt: String,
    pub tools: Vec<ToolDefinition>,
    /// Ask the model for a bare JSON answer.
    pub json_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    pub answer: String,
    /// Model calls made, including the final one.
    pub steps: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Run `agent` on `prompt` until it produces a final answer.
///
/// Tools outside `agent.tools` are never invoked; the model gets a failure
/// line instead. The wall-clock budget covers model and tool calls alike.
#[instrument(skip_all, fields(role = %agent.role))]
pub async fn run_agent(
    model: &dyn ChatModel,
    toolbox: &Toolbox,
    agent: &AgentSpec,
    turn: AgentTurn,
    limits: AgentLimits,
) -> Result<AgentRun, AgentError> {
    let AgentTurn {
        system,
        prompt,
        tools,
        json_mode,
    } = turn;
    let deadline = Instant::now() + limits.timeout;
    let timed_out = || AgentError::TimedOut {
        after: limits.timeout,
    };
    let mut messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
    let mut records = Vec::new();

    for step in 1..=limits.max_steps {
        let remaining = remaining_budget(deadline).map_err(|_| timed_out())?;
        let request = ChatRequest {
            model: agent.model.clone(),
            messages: messages.clone(),
            tools: tools.clone(),
            json_mode,
        };
        let response = tokio::time::timeout(remaining, model.complete(&request))
            .await
            .map_err(|_| timed_out())?
            .map_err(|err| AgentError::Model(format!("{err:#}")))?;

        if response.tool_calls.is_empty() {
            info!(steps = step, tool_calls = records.len(), "agent finished");
            return Ok(AgentRun {
                answer: response.content.unwrap_or_default(),
                steps: step,
                tool_calls: records,
            });
        }

        debug!(step, calls = response.tool_calls.len(), "model requested tools");
        messages.push(ChatMessage::assistant(
            response.content.clone(),
            response.tool_calls.clone(),
        ));
        for call in response.tool_calls {
            let output = if agent.tools.iter().any(|name| *name == call.name) {
                let remaining = remaining_budget(deadline).map_err(|_| timed_out())?;
                tokio::time::timeout(remaining, toolbox.invoke(&call.name, call.arguments))
                    .await
                    .map_err(|_| timed_out())?
            } else {
                warn!(tool = %call.name, "agent called a tool it was not given");
                ToolOutput::failure(
                    &format!("calling tool '{}'", call.name),
                    "tool is not available to this agent",
                )
            };
            records.push(ToolCallRecord {
                name: call.name.clone(),
                ok: output.ok,
                created_id: output.created_id.clone(),
            });
            messages.push(ChatMessage::tool_result(&call.id, output.message));
        }
    }

    warn!(steps = limits.max_steps, "agent step budget exhausted");
    Err(AgentError::BudgetExceeded {
        steps: limits.max_steps,
    })
}
