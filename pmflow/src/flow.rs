//! Project flow: research, board setup, planning, then card execution.
//!
//! Phases run strictly in sequence. Planning must finish (and pass its
//! invariants) before the first card is created; cards then fan out on a
//! bounded pool and succeed or fail independently. Running the flow twice
//! creates a second board and a second set of cards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::batch::run_bounded;
use crate::core::research::ResearchDecision;
use crate::core::types::{BoardLists, CardSpecification, ProjectRequest};
use crate::crews::board_setup::setup_board;
use crate::crews::execution::{AgentExecutor, CardExecutor, CardReport, DirectExecutor};
use crate::crews::planning::run_planning;
use crate::crews::research::run_research;
use crate::engine::{AgentLimits, EngineContext};
use crate::io::board::{BoardClient, TrelloClient};
use crate::io::config::{Credentials, ExecutionMode, FlowConfig, PmflowConfig};
use crate::io::llm::OpenAiChat;
use crate::io::prompt::PromptEngine;
use crate::tools::{Toolbox, WebSearchTool};

/// Progress notifications for observers such as the run store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowPhase {
    Research,
    BoardSetup,
    Planning,
    Execution { cards: usize },
    Finished { created: usize, failed: usize },
}

impl FlowPhase {
    pub fn name(&self) -> &'static str {
        match self {
            FlowPhase::Research => "research",
            FlowPhase::BoardSetup => "board_setup",
            FlowPhase::Planning => "planning",
            FlowPhase::Execution { .. } => "execution",
            FlowPhase::Finished { .. } => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub board_id: String,
    pub lists: BoardLists,
    pub research: ResearchDecision,
    pub foundation: String,
    pub card_specifications: Vec<CardSpecification>,
    /// One report per specification, in specification order.
    pub cards: Vec<CardReport>,
}

impl FlowReport {
    pub fn cards_created(&self) -> usize {
        self.cards.iter().filter(|card| card.is_completed()).count()
    }

    pub fn cards_failed(&self) -> usize {
        self.cards.len() - self.cards_created()
    }
}

pub struct ProjectFlow {
    engine: EngineContext,
    board: Arc<dyn BoardClient>,
    executor: Arc<dyn CardExecutor>,
    config: FlowConfig,
}

impl ProjectFlow {
    pub fn new(
        engine: EngineContext,
        board: Arc<dyn BoardClient>,
        executor: Arc<dyn CardExecutor>,
        config: FlowConfig,
    ) -> Self {
        Self {
            engine,
            board,
            executor,
            config,
        }
    }

    /// Flow over the configured services: an OpenAI-compatible model, the
    /// board API, and web search when a Serper key is present.
    pub fn from_config(cfg: &PmflowConfig, creds: &Credentials) -> Self {
        let board: Arc<dyn BoardClient> = Arc::new(TrelloClient::new(
            &cfg.board.base_url,
            &creds.board_api_key,
            &creds.board_api_token,
            Duration::from_secs(cfg.board.request_timeout_secs),
        ));
        let model = Arc::new(OpenAiChat::new(
            &cfg.llm.base_url,
            &creds.openai_api_key,
            &cfg.llm.model,
            cfg.llm.max_tokens,
            Duration::from_secs(cfg.llm.request_timeout_secs),
        ));
        let mut toolbox = Toolbox::with_board(board.clone(), cfg.tool_timeout());
        if let Some(key) = &creds.serper_api_key {
            toolbox.register(Arc::new(WebSearchTool::new(
                &cfg.search.base_url,
                key,
                cfg.search.max_results,
                cfg.tool_timeout(),
            )));
        }
        let engine = EngineContext {
            model,
            toolbox,
            prompts: Arc::new(PromptEngine::new()),
            limits: AgentLimits::from_config(cfg),
        };
        let executor = card_executor(cfg, &engine, board.clone());
        Self::new(engine, board, executor, cfg.flow.clone())
    }

    pub fn board(&self) -> Arc<dyn BoardClient> {
        self.board.clone()
    }

    /// Run every phase for `request`.
    ///
    /// `board_id` reuses an existing board instead of creating one. Phase,
    /// research, board and planning failures abort the flow; card failures
    /// only show up in the report.
    #[instrument(skip_all, fields(project = %request.name))]
    pub async fn run<F>(
        &self,
        request: &ProjectRequest,
        board_id: Option<&str>,
        on_phase: F,
    ) -> Result<FlowReport>
    where
        F: Fn(&FlowPhase) + Send + Sync,
    {
        on_phase(&FlowPhase::Research);
        let research = run_research(&self.engine, request, self.config.research_coordinator)
            .await
            .context("research phase")?;

        on_phase(&FlowPhase::BoardSetup);
        let (board_id, lists) = setup_board(self.board.as_ref(), request, board_id)
            .await
            .context("board setup phase")?;

        on_phase(&FlowPhase::Planning);
        let planning = run_planning(
            &self.engine,
            request,
            &research.foundation,
            &lists,
            self.config.min_card_specs,
        )
        .await
        .context("planning phase")?;

        on_phase(&FlowPhase::Execution {
            cards: planning.card_specifications.len(),
        });
        let cards = self.execute_cards(&planning.card_specifications).await?;

        let report = FlowReport {
            board_id,
            lists,
            research: research.decision,
            foundation: research.foundation,
            card_specifications: planning.card_specifications,
            cards,
        };
        on_phase(&FlowPhase::Finished {
            created: report.cards_created(),
            failed: report.cards_failed(),
        });
        info!(
            board_id = %report.board_id,
            created = report.cards_created(),
            failed = report.cards_failed(),
            "flow finished"
        );
        Ok(report)
    }

    /// Execute `specs` with at most `execution_concurrency` cards in flight.
    #[instrument(skip_all, fields(cards = specs.len()))]
    pub async fn execute_cards(&self, specs: &[CardSpecification]) -> Result<Vec<CardReport>> {
        let executor = self.executor.as_ref();
        let items: Vec<&CardSpecification> = specs.iter().collect();
        let reports = run_bounded(
            items,
            self.config.execution_concurrency,
            |spec, item| async move {
                let report = executor.execute(spec).await;
                if !report.is_completed() {
                    warn!(
                        card = %report.card_name,
                        index = item.index,
                        error = report.error_message.as_deref().unwrap_or_default(),
                        "card failed"
                    );
                }
                report
            },
        )
        .await?;
        Ok(reports)
    }
}

/// Executor for `flow.execution_mode`.
pub fn card_executor(
    cfg: &PmflowConfig,
    engine: &EngineContext,
    board: Arc<dyn BoardClient>,
) -> Arc<dyn CardExecutor> {
    match cfg.flow.execution_mode {
        ExecutionMode::Direct => Arc::new(DirectExecutor::new(board, &cfg.flow.checklist_name)),
        ExecutionMode::Agent => Arc::new(AgentExecutor::new(
            engine.clone(),
            &cfg.flow.checklist_name,
            Some(cfg.llm.execution_model.clone()),
        )),
    }
}
