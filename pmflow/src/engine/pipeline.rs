//! Pipeline execution: stage ordering, per-task context, output contracts.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::core::graph::stage_order;
use crate::core::states::{StageProgress, StageState, TaskState};
use crate::engine::agent::{AgentTurn, run_agent};
use crate::engine::{EngineContext, OutputContract, PipelineError, PipelineSpec, TaskError, TaskSpec};
use crate::io::schema::extract_json;

/// Final answer of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutput {
    pub raw: String,
    /// Parsed answer when the task has a JSON contract.
    pub json: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub state: TaskState,
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub state: StageState,
    pub tasks: Vec<TaskRecord>,
}

/// Outcome of a pipeline run, complete or partial.
///
/// Stages are listed in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    pub pipeline: String,
    pub stages: Vec<StageRecord>,
    pub outputs: BTreeMap<String, TaskOutput>,
}

impl PipelineRun {
    pub fn raw(&self, task_id: &str) -> Option<&str> {
        self.outputs.get(task_id).map(|output| output.raw.as_str())
    }

    /// Deserialize a JSON task output.
    pub fn parsed<T: DeserializeOwned>(&self, task_id: &str) -> Result<T> {
        let value = self
            .outputs
            .get(task_id)
            .and_then(|output| output.json.clone())
            .with_context(|| format!("task {task_id} produced no JSON output"))?;
        serde_json::from_value(value).with_context(|| format!("decode output of task {task_id}"))
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.stages
            .iter()
            .flat_map(|stage| &stage.tasks)
            .find(|task| task.id == task_id)
            .map(|task| task.state)
    }

    fn sync_stage(&mut self, idx: usize, progress: &StageProgress) {
        let record = &mut self.stages[idx];
        record.state = progress.state();
        for (task, state) in record.tasks.iter_mut().zip(progress.tasks()) {
            task.state = *state;
        }
    }
}

/// Structural problems that make a pipeline unrunnable.
pub fn check_pipeline(spec: &PipelineSpec, ctx: &EngineContext) -> Vec<String> {
    let mut errors = match stage_order(&spec.outline()) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    };
    for task in spec.stages.iter().flat_map(|stage| &stage.tasks) {
        if !ctx.prompts.has_template(&task.template) {
            errors.push(format!(
                "task '{}' uses unknown template '{}'",
                task.id, task.template
            ));
        }
    }
    errors
}

/// Run every stage of `spec` in dependency order.
///
/// `inputs` must be a JSON object; its keys are available to every prompt.
/// The first failing task stops the run and the error carries the partial
/// [`PipelineRun`].
#[instrument(skip_all, fields(pipeline = %spec.name))]
pub async fn run_pipeline(
    ctx: &EngineContext,
    spec: &PipelineSpec,
    inputs: &Value,
) -> Result<PipelineRun, PipelineError> {
    let Value::Object(inputs) = inputs else {
        return Err(PipelineError::Invalid(vec![
            "pipeline inputs must be a JSON object".to_string(),
        ]));
    };
    let errors = check_pipeline(spec, ctx);
    if !errors.is_empty() {
        return Err(PipelineError::Invalid(errors));
    }
    let order = stage_order(&spec.outline()).map_err(PipelineError::Invalid)?;

    let mut run = PipelineRun {
        pipeline: spec.name.clone(),
        stages: order
            .iter()
            .map(|&idx| StageRecord {
                name: spec.stages[idx].name.clone(),
                state: StageState::Pending,
                tasks: spec.stages[idx]
                    .tasks
                    .iter()
                    .map(|task| TaskRecord {
                        id: task.id.clone(),
                        state: TaskState::Pending,
                        steps: 0,
                    })
                    .collect(),
            })
            .collect(),
        outputs: BTreeMap::new(),
    };

    for (position, &stage_idx) in order.iter().enumerate() {
        let stage = &spec.stages[stage_idx];
        info!(stage = %stage.name, tasks = stage.tasks.len(), "stage started");
        let mut progress = StageProgress::new(stage.tasks.len());
        progress.start()?;
        run.sync_stage(position, &progress);

        for (task_idx, task) in stage.tasks.iter().enumerate() {
            progress.begin_task(task_idx)?;
            run.sync_stage(position, &progress);
            match run_task(ctx, task, inputs, &run.outputs).await {
                Ok((output, steps)) => {
                    progress.complete_task(task_idx)?;
                    run.stages[position].tasks[task_idx].steps = steps;
                    run.outputs.insert(task.id.clone(), output);
                    run.sync_stage(position, &progress);
                }
                Err(source) => {
                    progress.fail_task(task_idx)?;
                    run.sync_stage(position, &progress);
                    warn!(stage = %stage.name, task = %task.id, kind = source.kind(), error = %source, "task failed");
                    return Err(PipelineError::TaskFailed {
                        pipeline: spec.name.clone(),
                        stage: stage.name.clone(),
                        task: task.id.clone(),
                        source,
                        run: Box::new(run),
                    });
                }
            }
        }
        info!(stage = %stage.name, "stage succeeded");
    }

    Ok(run)
}

/// Prompt context: the pipeline inputs plus `outputs`/`parsed` maps holding
/// only the tasks this one references.
fn task_context(
    task: &TaskSpec,
    inputs: &Map<String, Value>,
    outputs: &BTreeMap<String, TaskOutput>,
) -> Value {
    let mut raw = Map::new();
    let mut parsed = Map::new();
    for id in &task.context {
        if let Some(output) = outputs.get(id) {
            raw.insert(id.clone(), Value::String(output.raw.clone()));
            if let Some(json) = &output.json {
                parsed.insert(id.clone(), json.clone());
            }
        }
    }
    let mut ctx = inputs.clone();
    ctx.insert("outputs".to_string(), Value::Object(raw));
    ctx.insert("parsed".to_string(), Value::Object(parsed));
    Value::Object(ctx)
}

#[instrument(skip_all, fields(task = %task.id))]
async fn run_task(
    ctx: &EngineContext,
    task: &TaskSpec,
    inputs: &Map<String, Value>,
    outputs: &BTreeMap<String, TaskOutput>,
) -> Result<(TaskOutput, u32), TaskError> {
    let tools = ctx
        .toolbox
        .definitions(&task.agent.tools)
        .map_err(TaskError::UnknownTool)?;
    let prompt = ctx
        .prompts
        .render(&task.template, task_context(task, inputs, outputs))
        .map_err(|err| TaskError::Render(format!("{err:#}")))?;
    let schema = match &task.contract {
        OutputContract::FreeText => None,
        OutputContract::Json(contract) => Some(contract.schema_text()),
    };
    let system = ctx
        .prompts
        .render(
            "agent_system",
            context! {
                role => &task.agent.role,
                goal => &task.agent.goal,
                backstory => &task.agent.backstory,
                tools => &task.agent.tools,
                expected_output => &task.expected_output,
                schema => schema,
            },
        )
        .map_err(|err| TaskError::Render(format!("{err:#}")))?;

    let turn = AgentTurn {
        system,
        prompt,
        tools,
        json_mode: matches!(task.contract, OutputContract::Json(_)),
    };
    let agent_run = run_agent(ctx.model.as_ref(), &ctx.toolbox, &task.agent, turn, ctx.limits).await?;

    let json = match &task.contract {
        OutputContract::FreeText => None,
        OutputContract::Json(contract) => {
            let value = extract_json(&agent_run.answer).map_err(TaskError::InvalidJson)?;
            let errors = contract.violations(&value);
            if !errors.is_empty() {
                return Err(TaskError::SchemaInvalid {
                    schema: contract.name(),
                    errors,
                });
            }
            Some(value)
        }
    };
    Ok((
        TaskOutput {
            raw: agent_run.answer,
            json,
        },
        agent_run.steps,
    ))
}
