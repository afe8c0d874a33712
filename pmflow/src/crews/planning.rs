//! Planning crew: break the project into tasks, then turn every task into a
//! card specification routed to a list.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::core::invariants::{CardSpecRules, validate_card_specs};
use crate::core::planning::planning_policy;
use crate::core::types::{
    BoardLists, CardSpecification, CardSpecifications, Category, GeneratedTask, GeneratedTasks,
    Priority, ProjectRequest,
};
use crate::engine::{AgentSpec, EngineContext, PipelineSpec, StageSpec, TaskSpec, run_pipeline};
use crate::io::schema::JsonContract;

pub const TASKS_TASK: &str = "generate_tasks";
pub const CARDS_TASK: &str = "card_specifications";

#[derive(Debug, Clone, PartialEq)]
pub struct PlanningOutcome {
    pub tasks: Vec<GeneratedTask>,
    /// Validated card specifications in planner order.
    pub card_specifications: Vec<CardSpecification>,
}

pub fn planning_pipeline() -> PipelineSpec {
    let planner = AgentSpec::new(
        "Project Planner",
        "Break the project into moderate-sized tasks with clear acceptance criteria",
        "You are an experienced delivery lead who sizes work in 3-7 day chunks.",
    );
    let specifier = AgentSpec::new(
        "Card Specification Writer",
        "Convert every task into a complete board card specification",
        "You keep boards tidy: every card has dates, labels and a checklist.",
    );
    PipelineSpec::new(
        "planning",
        vec![
            StageSpec::new(
                "breakdown",
                vec![
                    TaskSpec::new(TASKS_TASK, planner, TASKS_TASK, "A JSON object with a tasks array")
                        .json(JsonContract::generated_tasks()),
                ],
            ),
            StageSpec::new(
                "specify",
                vec![
                    TaskSpec::new(
                        CARDS_TASK,
                        specifier,
                        CARDS_TASK,
                        "A JSON object with a card_specifications array",
                    )
                    .json(JsonContract::card_specifications())
                    .with_context(&[TASKS_TASK]),
                ],
            )
            .after(&["breakdown"]),
        ],
    )
}

pub fn planning_inputs(
    request: &ProjectRequest,
    foundation: &str,
    lists: &BoardLists,
    min_cards: usize,
) -> Value {
    json!({
        "project_name": request.name,
        "project_description": request.description,
        "project_timeline": request.timeline_text(),
        "timeline_start": request.timeline.start_date.to_string(),
        "timeline_end": request.timeline.end_date.to_string(),
        "research_output": foundation,
        "categories": Category::ALL.iter().map(Category::as_str).collect::<Vec<_>>(),
        "priorities": Priority::ALL.iter().map(Priority::as_str).collect::<Vec<_>>(),
        "policy": planning_policy(),
        "lists": lists,
        "min_cards": min_cards,
    })
}

/// Rules planned cards must satisfy on this board.
pub fn card_rules(request: &ProjectRequest, lists: &BoardLists, min_cards: usize) -> CardSpecRules {
    CardSpecRules {
        min_cards,
        allowed_list_ids: lists.ids().into_iter().map(str::to_string).collect::<HashSet<_>>(),
        timeline: Some(request.timeline),
    }
}

/// Run the planning pipeline and check the cards it produced.
///
/// Any invariant violation fails the phase; specifications are never patched.
#[instrument(skip_all, fields(project = %request.name))]
pub async fn run_planning(
    ctx: &EngineContext,
    request: &ProjectRequest,
    foundation: &str,
    lists: &BoardLists,
    min_cards: usize,
) -> Result<PlanningOutcome> {
    let inputs = planning_inputs(request, foundation, lists, min_cards);
    let run = run_pipeline(ctx, &planning_pipeline(), &inputs)
        .await
        .context("planning pipeline")?;
    let tasks: GeneratedTasks = run.parsed(TASKS_TASK)?;
    let cards: CardSpecifications = run.parsed(CARDS_TASK)?;

    let errors = validate_card_specs(
        &cards.card_specifications,
        &card_rules(request, lists, min_cards),
    );
    if !errors.is_empty() {
        bail!("card specification violations:\n- {}", errors.join("\n- "));
    }
    info!(
        tasks = tasks.tasks.len(),
        cards = cards.card_specifications.len(),
        "planning finished"
    );
    Ok(PlanningOutcome {
        tasks: tasks.tasks,
        card_specifications: cards.card_specifications,
    })
}
