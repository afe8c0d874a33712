//! Declarative stage pipelines of LLM agent tasks.
//!
//! A [`PipelineSpec`] is a set of stages ordered by dependency edges; each
//! stage runs its tasks strictly in order. A task renders its prompt from the
//! pipeline inputs plus the outputs of the tasks it lists as context, runs an
//! agent loop, and optionally validates the final answer against a JSON
//! Schema. The first failing task stops the pipeline.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::graph::{StageOutline, TaskOutline};
use crate::core::states::TransitionError;
use crate::io::config::PmflowConfig;
use crate::io::llm::ChatModel;
use crate::io::prompt::PromptEngine;
use crate::io::schema::JsonContract;
use crate::tools::Toolbox;

pub mod agent;
pub mod pipeline;

pub use agent::{AgentRun, AgentTurn, ToolCallRecord, run_agent};
pub use pipeline::{PipelineRun, StageRecord, TaskOutput, TaskRecord, run_pipeline};

/// Persona and tool access of the agent that performs a task.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Names of the tools the agent may call.
    pub tools: Vec<String>,
    /// Overrides the model client's default model.
    pub model: Option<String>,
}

impl AgentSpec {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            tools: Vec::new(),
            model: None,
        }
    }

    pub fn with_tools<S: AsRef<str>>(mut self, tools: &[S]) -> Self {
        self.tools = tools.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// What a task's final answer must look like.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputContract {
    FreeText,
    Json(JsonContract),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    /// Unique within the pipeline; downstream tasks reference it.
    pub id: String,
    pub agent: AgentSpec,
    /// Name of a template registered with the [`PromptEngine`].
    pub template: String,
    pub expected_output: String,
    pub contract: OutputContract,
    /// Ids of earlier tasks whose outputs the prompt may use.
    pub context: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: &str, agent: AgentSpec, template: &str, expected_output: &str) -> Self {
        Self {
            id: id.to_string(),
            agent,
            template: template.to_string(),
            expected_output: expected_output.to_string(),
            contract: OutputContract::FreeText,
            context: Vec::new(),
        }
    }

    pub fn json(mut self, contract: JsonContract) -> Self {
        self.contract = OutputContract::Json(contract);
        self
    }

    pub fn with_context(mut self, task_ids: &[&str]) -> Self {
        self.context = task_ids.iter().map(|id| id.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub name: String,
    pub depends_on: Vec<String>,
    pub tasks: Vec<TaskSpec>,
}

impl StageSpec {
    pub fn new(name: &str, tasks: Vec<TaskSpec>) -> Self {
        Self {
            name: name.to_string(),
            depends_on: Vec::new(),
            tasks,
        }
    }

    pub fn after(mut self, stages: &[&str]) -> Self {
        self.depends_on = stages.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    pub name: String,
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    pub fn new(name: &str, stages: Vec<StageSpec>) -> Self {
        Self {
            name: name.to_string(),
            stages,
        }
    }

    pub(crate) fn outline(&self) -> Vec<StageOutline<'_>> {
        self.stages
            .iter()
            .map(|stage| StageOutline {
                name: &stage.name,
                depends_on: &stage.depends_on,
                tasks: stage
                    .tasks
                    .iter()
                    .map(|task| TaskOutline {
                        id: &task.id,
                        context: &task.context,
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.tasks.len()).sum()
    }
}

/// Per-task agent budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLimits {
    /// Maximum model calls per task.
    pub max_steps: u32,
    /// Wall clock per task.
    pub timeout: Duration,
}

impl AgentLimits {
    pub fn from_config(cfg: &PmflowConfig) -> Self {
        Self {
            max_steps: cfg.engine.max_agent_steps,
            timeout: cfg.agent_timeout(),
        }
    }
}

/// Everything a pipeline needs to run tasks.
#[derive(Clone)]
pub struct EngineContext {
    pub model: Arc<dyn ChatModel>,
    pub toolbox: Toolbox,
    pub prompts: Arc<PromptEngine>,
    pub limits: AgentLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("agent made {steps} model calls without a final answer")]
    BudgetExceeded { steps: u32 },
    #[error("agent timed out after {after:?}")]
    TimedOut { after: Duration },
    #[error("model call failed: {0}")]
    Model(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("render prompt: {0}")]
    Render(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("final answer is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("final answer violates the {schema} schema: {}", .errors.join("; "))]
    SchemaInvalid {
        schema: &'static str,
        errors: Vec<String>,
    },
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

impl TaskError {
    /// Stable failure class for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Render(_) => "render",
            TaskError::Agent(AgentError::BudgetExceeded { .. }) => "budget_exceeded",
            TaskError::Agent(AgentError::TimedOut { .. }) => "timed_out",
            TaskError::Agent(AgentError::Model(_)) => "model",
            TaskError::InvalidJson(_) => "invalid_json",
            TaskError::SchemaInvalid { .. } => "schema_invalid",
            TaskError::UnknownTool(_) => "unknown_tool",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("task '{task}' in stage '{stage}' of pipeline '{pipeline}' failed")]
    TaskFailed {
        pipeline: String,
        stage: String,
        task: String,
        source: TaskError,
        /// State of every stage and task when the pipeline stopped.
        run: Box<PipelineRun>,
    },
    #[error("pipeline state machine: {0}")]
    Transition(#[from] TransitionError),
}

impl PipelineError {
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            PipelineError::TaskFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_kinds_are_stable() {
        let cases = [
            (TaskError::Render("x".into()), "render"),
            (AgentError::BudgetExceeded { steps: 3 }.into(), "budget_exceeded"),
            (
                AgentError::TimedOut {
                    after: Duration::from_secs(1),
                }
                .into(),
                "timed_out",
            ),
            (AgentError::Model("x".into()).into(), "model"),
            (TaskError::InvalidJson("x".into()), "invalid_json"),
            (
                TaskError::SchemaInvalid {
                    schema: "s",
                    errors: vec![],
                },
                "schema_invalid",
            ),
            (TaskError::UnknownTool("x".into()), "unknown_tool"),
        ];
        for (error, kind) in cases {
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn builders_fill_defaults() {
        let agent = AgentSpec::new("Planner", "plan", "").with_tools(&["create_card"]);
        let task = TaskSpec::new("plan", agent, "generate_tasks", "tasks").with_context(&["a"]);
        assert_eq!(task.contract, OutputContract::FreeText);
        assert_eq!(task.context, vec!["a".to_string()]);
        let pipeline = PipelineSpec::new(
            "p",
            vec![StageSpec::new("s", vec![task]).after(&["t"])],
        );
        assert_eq!(pipeline.task_count(), 1);
        assert_eq!(pipeline.outline()[0].depends_on, &["t".to_string()]);
    }
}
