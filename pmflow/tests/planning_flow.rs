//! End-to-end flow tests against the in-memory board and a scripted model.
//!
//! The fake board hands out ids from one counter shared by every entity
//! kind, so on a fresh board the flow always produces `board-1` and the
//! lists `list-2..=list-7` (Backlog first).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pmflow::crews::execution::{CardStatus, DirectExecutor, ExecutionStep};
use pmflow::engine::{AgentLimits, EngineContext};
use pmflow::flow::ProjectFlow;
use pmflow::io::config::FlowConfig;
use pmflow::io::llm::ChatResponse;
use pmflow::io::prompt::PromptEngine;
use pmflow::test_support::{FakeBoard, ScriptedModel, card_specs, date, sample_request};
use pmflow::tools::Toolbox;
use serde_json::json;

const BACKLOG: &str = "list-2";

fn flow(board: Arc<FakeBoard>, answers: Vec<ChatResponse>, config: FlowConfig) -> ProjectFlow {
    let engine = EngineContext {
        model: Arc::new(ScriptedModel::new(answers)),
        toolbox: Toolbox::new(),
        prompts: Arc::new(PromptEngine::new()),
        limits: AgentLimits {
            max_steps: 3,
            timeout: Duration::from_secs(5),
        },
    };
    let executor = Arc::new(DirectExecutor::new(board.clone(), &config.checklist_name));
    ProjectFlow::new(engine, board, executor, config)
}

fn config() -> FlowConfig {
    FlowConfig {
        research_coordinator: false,
        ..FlowConfig::default()
    }
}

/// Research, task breakdown and card specification answers for `cards` cards.
fn script(cards: usize) -> Vec<ChatResponse> {
    vec![
        ChatResponse::text("COMPREHENSIVE RESEARCH: payments, catalog search ..."),
        ChatResponse::text("PROJECT ANALYSIS: three milestones ..."),
        ChatResponse::text("TEAM ASSESSMENT: backend heavy ..."),
        ChatResponse::text("## EXECUTIVE SUMMARY\nBuild catalog first."),
        ChatResponse::text(
            json!({"tasks": [{
                "task_id": "T1", "title": "Catalog schema", "description": "Design tables",
                "category": "Database", "priority": "High", "estimated_days": 3,
                "acceptance_criteria": ["ER diagram created"], "dependencies": []
            }]})
            .to_string(),
        ),
        ChatResponse::text(
            json!({ "card_specifications": card_specs(cards, BACKLOG) }).to_string(),
        ),
    ]
}

/// Verifies a full run with the default minimum creates every card with its
/// dates, checklist items and labels.
#[tokio::test]
async fn flow_creates_every_planned_card() {
    let board = Arc::new(FakeBoard::new().with_delay(Duration::from_millis(2)));

    let report = flow(board.clone(), script(10), config())
        .run(&sample_request(), None, |_| {})
        .await
        .expect("flow");

    assert_eq!(report.cards_created(), 10);
    assert_eq!(report.cards_failed(), 0);
    let names: Vec<&str> = report.cards.iter().map(|card| card.card_name.as_str()).collect();
    let expected: Vec<String> = (1..=10).map(|i| format!("Card {i}")).collect();
    assert_eq!(names, expected);

    let state = board.snapshot();
    assert_eq!(state.boards.len(), 1);
    assert_eq!(state.lists.len(), 6);
    assert_eq!(state.cards.len(), 10);
    for card in &state.cards {
        assert_eq!(card.list_id, BACKLOG);
        assert_eq!(card.start, Some(date("2025-11-17")));
        assert_eq!(card.due, Some(date("2025-11-19")));

        let checklists = state.checklists_for(&card.id);
        assert_eq!(checklists.len(), 1, "{}", card.name);
        assert_eq!(checklists[0].name, "Acceptance Criteria");
        assert_eq!(checklists[0].items, ["ER diagram created", "Indexes added"]);

        let labels = state.labels_for(&card.id);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "High Priority");
    }
}

/// Verifies concurrently created cards all receive distinct ids.
#[tokio::test]
async fn concurrent_cards_get_distinct_ids() {
    let board = Arc::new(FakeBoard::new().with_delay(Duration::from_millis(1)));
    let config = FlowConfig {
        execution_concurrency: 4,
        ..config()
    };

    let reports = flow(board.clone(), Vec::new(), config)
        .execute_cards(&card_specs(12, "L1"))
        .await
        .expect("execute");

    let ids: HashSet<&str> = reports
        .iter()
        .filter_map(|report| report.card_id.as_deref())
        .collect();
    assert_eq!(ids.len(), 12);
    assert_eq!(board.snapshot().cards.len(), 12);
}

/// Verifies re-running execution duplicates cards rather than reusing them.
#[tokio::test]
async fn reexecution_duplicates_cards() {
    let board = Arc::new(FakeBoard::new());
    let flow = flow(board.clone(), Vec::new(), config());
    let specs = card_specs(3, "L1");

    let first = flow.execute_cards(&specs).await.expect("first");
    let second = flow.execute_cards(&specs).await.expect("second");

    let state = board.snapshot();
    assert_eq!(state.cards.len(), 6);
    assert_eq!(state.cards_named("Card 1").len(), 2);
    assert_ne!(first[0].card_id, second[0].card_id);
}

/// Verifies a late step failure keeps the card and its finished checklist.
#[tokio::test]
async fn label_failure_keeps_partial_card() {
    let board = Arc::new(FakeBoard::new());
    board.fail_op("create_label");

    let reports = flow(board.clone(), Vec::new(), config())
        .execute_cards(&card_specs(2, "L1"))
        .await
        .expect("execute");

    for report in &reports {
        assert_eq!(report.status, CardStatus::Failed);
        assert_eq!(report.failed_step, Some(ExecutionStep::CreateLabel { index: 0 }));
        assert!(report.checklist_created);
        assert_eq!(report.checklist_items_added, 2);
        assert_eq!(report.labels_created, 0);
    }
    let state = board.snapshot();
    assert_eq!(state.cards.len(), 2);
    assert_eq!(state.checklists.len(), 2);
    assert!(state.labels.is_empty());
}

/// Verifies fewer cards than the default minimum fail planning and leave the
/// board without cards.
#[tokio::test]
async fn too_few_cards_stop_before_execution() {
    let board = Arc::new(FakeBoard::new());

    let err = flow(board.clone(), script(9), config())
        .run(&sample_request(), None, |_| {})
        .await
        .expect_err("planning");

    let message = format!("{err:#}");
    assert!(message.contains("planning phase"), "{message}");
    assert!(message.contains("expected at least 10"), "{message}");
    let state = board.snapshot();
    assert_eq!(state.boards.len(), 1);
    assert!(state.cards.is_empty());
}
