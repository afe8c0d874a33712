//! Execution crew: create one card with its checklist and labels.
//!
//! Two executors share the [`CardExecutor`] seam. [`DirectExecutor`] calls
//! the board client step by step, threading each created id into the next
//! call. [`AgentExecutor`] hands the specification to an agent that drives
//! the board tools and reports back in JSON. Neither rolls back: whatever
//! was created before a failure stays on the board.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::types::CardSpecification;
use crate::engine::{AgentSpec, EngineContext, PipelineSpec, StageSpec, TaskSpec, run_pipeline};
use crate::io::board::{BoardClient, NewCard, NewLabel};
use crate::io::schema::JsonContract;

pub const CREATE_CARD_TASK: &str = "create_card";

/// Board tools the card agent may call.
pub const CARD_TOOLS: [&str; 4] = [
    "create_card",
    "create_checklist",
    "add_checklist_item",
    "create_label",
];

/// The step of direct execution that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ExecutionStep {
    CreateCard,
    CreateChecklist,
    /// Zero-based index into `checklist_items`.
    AddChecklistItem { index: usize },
    /// Zero-based index into `labels`.
    CreateLabel { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Completed,
    Failed,
}

/// Outcome of executing one card specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardReport {
    pub card_name: String,
    pub card_id: Option<String>,
    #[serde(default)]
    pub checklist_id: Option<String>,
    pub checklist_created: bool,
    pub checklist_items_added: usize,
    pub labels_created: usize,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub status: CardStatus,
    pub error_message: Option<String>,
    #[serde(default)]
    pub failed_step: Option<ExecutionStep>,
}

impl CardReport {
    fn started(card_name: &str) -> Self {
        Self {
            card_name: card_name.to_string(),
            card_id: None,
            checklist_id: None,
            checklist_created: false,
            checklist_items_added: 0,
            labels_created: 0,
            label_ids: Vec::new(),
            status: CardStatus::Completed,
            error_message: None,
            failed_step: None,
        }
    }

    fn fail(mut self, step: Option<ExecutionStep>, error: String) -> Self {
        self.status = CardStatus::Failed;
        self.failed_step = step;
        self.error_message = Some(error);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == CardStatus::Completed
    }
}

#[async_trait]
pub trait CardExecutor: Send + Sync {
    /// Never errors: failures are reported in the [`CardReport`].
    async fn execute(&self, spec: &CardSpecification) -> CardReport;
}

/// Deterministic card, checklist, items, labels sequence.
pub struct DirectExecutor {
    board: Arc<dyn BoardClient>,
    checklist_name: String,
}

impl DirectExecutor {
    pub fn new(board: Arc<dyn BoardClient>, checklist_name: &str) -> Self {
        Self {
            board,
            checklist_name: checklist_name.to_string(),
        }
    }
}

#[async_trait]
impl CardExecutor for DirectExecutor {
    async fn execute(&self, spec: &CardSpecification) -> CardReport {
        execute_card(self.board.as_ref(), spec, &self.checklist_name).await
    }
}

/// Create one card and everything attached to it.
///
/// The card is due on `end_date` and starts on `start_date`. A checklist is
/// created only when the specification has items; items keep their order.
#[instrument(skip_all, fields(card = %spec.card_name, list_id = %spec.list_id))]
pub async fn execute_card(
    board: &dyn BoardClient,
    spec: &CardSpecification,
    checklist_name: &str,
) -> CardReport {
    let mut report = CardReport::started(&spec.card_name);

    let card = match board
        .create_card(&NewCard {
            list_id: spec.list_id.clone(),
            name: spec.card_name.clone(),
            description: spec.description.clone(),
            start: Some(spec.start_date),
            due: Some(spec.end_date),
            member_ids: Vec::new(),
        })
        .await
    {
        Ok(card) => card,
        Err(err) => {
            warn!(error = %err, "card creation failed");
            return report.fail(Some(ExecutionStep::CreateCard), err.to_string());
        }
    };
    report.card_id = Some(card.id.clone());

    if !spec.checklist_items.is_empty() {
        let checklist = match board.create_checklist(&card.id, checklist_name).await {
            Ok(checklist) => checklist,
            Err(err) => {
                warn!(card_id = %card.id, error = %err, "checklist creation failed");
                return report.fail(Some(ExecutionStep::CreateChecklist), err.to_string());
            }
        };
        report.checklist_created = true;
        report.checklist_id = Some(checklist.id.clone());

        for (index, item) in spec.checklist_items.iter().enumerate() {
            if let Err(err) = board.add_checklist_item(&checklist.id, item).await {
                warn!(card_id = %card.id, index, error = %err, "checklist item failed");
                return report.fail(Some(ExecutionStep::AddChecklistItem { index }), err.to_string());
            }
            report.checklist_items_added += 1;
        }
    }

    for (index, label) in spec.labels.iter().enumerate() {
        let created = board
            .create_label(
                &card.id,
                &NewLabel {
                    name: label.name.clone(),
                    color: label.color,
                },
            )
            .await;
        match created {
            Ok(entity) => {
                report.labels_created += 1;
                report.label_ids.push(entity.id);
            }
            Err(err) => {
                warn!(card_id = %card.id, index, error = %err, "label creation failed");
                return report.fail(Some(ExecutionStep::CreateLabel { index }), err.to_string());
            }
        }
    }

    info!(card_id = %card.id, "card executed");
    report
}

/// One-task pipeline whose agent creates a card with the board tools.
pub fn card_pipeline(model: Option<String>) -> PipelineSpec {
    let manager = AgentSpec::new(
        "Board Manager",
        "Create a complete board card from a card specification",
        "You operate the project board precisely. You use only ids returned by \
         the tools and you stop at the first failure.",
    )
    .with_tools(&CARD_TOOLS)
    .with_model(model);
    PipelineSpec::new(
        "card_execution",
        vec![StageSpec::new(
            "execute",
            vec![
                TaskSpec::new(
                    CREATE_CARD_TASK,
                    manager,
                    CREATE_CARD_TASK,
                    "A JSON card report",
                )
                .json(JsonContract::card_report()),
            ],
        )],
    )
}

/// Card report shape the agent answers with.
#[derive(Debug, Deserialize)]
struct AgentCardReport {
    card_id: Option<String>,
    card_name: String,
    checklist_created: bool,
    checklist_items_added: usize,
    labels_created: usize,
    status: CardStatus,
    #[serde(default)]
    error_message: Option<String>,
}

/// Agent-driven execution through the board tools.
pub struct AgentExecutor {
    ctx: EngineContext,
    checklist_name: String,
    model: Option<String>,
}

impl AgentExecutor {
    /// `ctx.toolbox` must carry the board tools.
    pub fn new(ctx: EngineContext, checklist_name: &str, model: Option<String>) -> Self {
        Self {
            ctx,
            checklist_name: checklist_name.to_string(),
            model,
        }
    }
}

#[async_trait]
impl CardExecutor for AgentExecutor {
    #[instrument(skip_all, fields(card = %spec.card_name))]
    async fn execute(&self, spec: &CardSpecification) -> CardReport {
        let report = CardReport::started(&spec.card_name);
        let card_json = match serde_json::to_string_pretty(spec) {
            Ok(text) => text,
            Err(err) => return report.fail(None, format!("encode card specification: {err}")),
        };
        let inputs = json!({
            "card_specification": card_json,
            "checklist_name": self.checklist_name,
        });
        let run = match run_pipeline(&self.ctx, &card_pipeline(self.model.clone()), &inputs).await {
            Ok(run) => run,
            Err(err) => {
                let message = match err.task_error() {
                    Some(task_error) => format!("{err}: {task_error}"),
                    None => err.to_string(),
                };
                warn!(error = %message, "card agent failed");
                return report.fail(None, message);
            }
        };
        match run.parsed::<AgentCardReport>(CREATE_CARD_TASK) {
            Ok(agent) => CardReport {
                card_name: agent.card_name,
                card_id: agent.card_id,
                checklist_created: agent.checklist_created,
                checklist_items_added: agent.checklist_items_added,
                labels_created: agent.labels_created,
                status: agent.status,
                error_message: agent.error_message,
                ..report
            },
            Err(err) => report.fail(None, format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::types::LabelColor;
    use crate::engine::AgentLimits;
    use crate::io::llm::{ChatResponse, ToolCall};
    use crate::io::prompt::PromptEngine;
    use crate::test_support::{FakeBoard, ScriptedModel, card_spec, date};
    use crate::tools::Toolbox;

    /// Verifies a full card lands on the board with due date, ordered
    /// checklist items and an attached label.
    #[tokio::test]
    async fn direct_execution_creates_card_checklist_and_label() {
        let board = FakeBoard::new();
        let spec = card_spec("Design Schema", "L1");

        let report = execute_card(&board, &spec, "Acceptance Criteria").await;

        assert!(report.is_completed(), "{report:?}");
        assert_eq!(report.checklist_items_added, 2);
        assert_eq!(report.labels_created, 1);

        let state = board.snapshot();
        assert_eq!(state.cards.len(), 1);
        let card = &state.cards[0];
        assert_eq!(card.list_id, "L1");
        assert_eq!(card.name, "Design Schema");
        assert_eq!(card.due, Some(date("2025-11-19")));
        assert_eq!(card.start, Some(date("2025-11-17")));
        assert_eq!(report.card_id.as_deref(), Some(card.id.as_str()));

        let checklists = state.checklists_for(&card.id);
        assert_eq!(checklists.len(), 1);
        assert_eq!(checklists[0].name, "Acceptance Criteria");
        assert_eq!(checklists[0].items, ["ER diagram created", "Indexes added"]);

        let labels = state.labels_for(&card.id);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "High Priority");
        assert_eq!(labels[0].color, LabelColor::Orange);
        assert_eq!(card.label_ids, [labels[0].id.clone()]);
    }

    /// Verifies a failed checklist leaves the created card in place.
    #[tokio::test]
    async fn checklist_failure_keeps_the_card() {
        let board = FakeBoard::new();
        board.fail_op("create_checklist");

        let report = execute_card(&board, &card_spec("Design Schema", "L1"), "Acceptance Criteria").await;

        assert_eq!(report.status, CardStatus::Failed);
        assert_eq!(report.failed_step, Some(ExecutionStep::CreateChecklist));
        assert!(!report.checklist_created);
        assert!(
            report
                .error_message
                .as_deref()
                .unwrap_or_default()
                .contains("injected failure")
        );
        let state = board.snapshot();
        assert_eq!(state.cards.len(), 1);
        assert_eq!(report.card_id.as_deref(), Some(state.cards[0].id.as_str()));
        assert!(state.labels.is_empty());
    }

    #[tokio::test]
    async fn item_failure_reports_its_index() {
        let board = FakeBoard::new();
        board.fail_op_matching("add_checklist_item", "Indexes");

        let report = execute_card(&board, &card_spec("Design Schema", "L1"), "Acceptance Criteria").await;

        assert_eq!(
            report.failed_step,
            Some(ExecutionStep::AddChecklistItem { index: 1 })
        );
        assert_eq!(report.checklist_items_added, 1);
        assert_eq!(board.snapshot().checklists[0].items, ["ER diagram created"]);
    }

    #[tokio::test]
    async fn card_without_items_gets_no_checklist() {
        let board = FakeBoard::new();
        let mut spec = card_spec("Write README", "L1");
        spec.checklist_items.clear();
        spec.labels.clear();

        let report = execute_card(&board, &spec, "Acceptance Criteria").await;

        assert!(report.is_completed());
        assert!(!report.checklist_created);
        assert!(board.snapshot().checklists.is_empty());
    }

    #[test]
    fn failed_step_serializes_with_index() {
        let value = serde_json::to_value(ExecutionStep::CreateLabel { index: 2 }).expect("json");
        assert_eq!(value, json!({"step": "create_label", "index": 2}));
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn agent_executor(board: Arc<FakeBoard>, model: Arc<ScriptedModel>) -> AgentExecutor {
        let ctx = EngineContext {
            model,
            toolbox: Toolbox::with_board(board, Duration::from_secs(5)),
            prompts: Arc::new(PromptEngine::new()),
            limits: AgentLimits {
                max_steps: 8,
                timeout: Duration::from_secs(5),
            },
        };
        AgentExecutor::new(ctx, "Acceptance Criteria", Some("gpt-4o".to_string()))
    }

    /// Verifies the agent path drives the tools and returns its report.
    #[tokio::test]
    async fn agent_execution_uses_board_tools() {
        let board = Arc::new(FakeBoard::new());
        let model = Arc::new(ScriptedModel::new(vec![
            ChatResponse::tools(vec![call(
                "c1",
                "create_card",
                json!({
                    "list_id": "L1",
                    "card_name": "Design Schema",
                    "description": "d",
                    "start_date": "2025-11-17",
                    "end_date": "2025-11-19"
                }),
            )]),
            ChatResponse::tools(vec![call(
                "c2",
                "create_checklist",
                json!({"card_id": "card-1", "checklist_name": "Acceptance Criteria"}),
            )]),
            ChatResponse::tools(vec![
                call(
                    "c3",
                    "add_checklist_item",
                    json!({"checklist_id": "checklist-2", "item_name": "ER diagram created"}),
                ),
                call(
                    "c4",
                    "add_checklist_item",
                    json!({"checklist_id": "checklist-2", "item_name": "Indexes added"}),
                ),
                call(
                    "c5",
                    "create_label",
                    json!({"card_id": "card-1", "label_name": "High Priority", "color": "orange"}),
                ),
            ]),
            ChatResponse::text(
                json!({
                    "card_id": "card-1",
                    "card_name": "Design Schema",
                    "checklist_created": true,
                    "checklist_items_added": 2,
                    "labels_created": 1,
                    "status": "completed",
                    "error_message": null
                })
                .to_string(),
            ),
        ]));

        let report = agent_executor(board.clone(), model.clone())
            .execute(&card_spec("Design Schema", "L1"))
            .await;

        assert!(report.is_completed(), "{report:?}");
        assert_eq!(report.card_id.as_deref(), Some("card-1"));
        let state = board.snapshot();
        assert_eq!(state.cards[0].due, Some(date("2025-11-19")));
        assert_eq!(state.checklists[0].items, ["ER diagram created", "Indexes added"]);
        assert_eq!(state.labels[0].color, LabelColor::Orange);

        let first = &model.requests()[0];
        assert_eq!(first.model.as_deref(), Some("gpt-4o"));
        assert_eq!(first.tools.len(), CARD_TOOLS.len());
        let prompt = first.messages[1].content.clone().unwrap_or_default();
        assert!(prompt.contains("\"card_name\": \"Design Schema\""));
        assert!(prompt.contains("checklist_name \"Acceptance Criteria\""));
    }

    #[tokio::test]
    async fn agent_report_violating_schema_fails_the_card() {
        let board = Arc::new(FakeBoard::new());
        let model = Arc::new(ScriptedModel::new(vec![ChatResponse::text(
            r#"{"card_name": "Design Schema", "status": "done"}"#,
        )]));

        let report = agent_executor(board, model)
            .execute(&card_spec("Design Schema", "L1"))
            .await;

        assert_eq!(report.status, CardStatus::Failed);
        assert!(
            report
                .error_message
                .as_deref()
                .unwrap_or_default()
                .contains("card_report")
        );
    }
}
