//! Shared application state for the API server.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use pmflow::core::types::ProjectRequest;
use pmflow::io::board::BoardClient;
use pmflow::io::run_store::RunStore;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A project accepted by the API, with the board created for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub request: ProjectRequest,
    pub organization_id: Option<String>,
    pub board_id: String,
    /// Latest flow run for this project.
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// In-memory project records.
#[derive(Debug, Default)]
pub struct ProjectStore {
    projects: RwLock<HashMap<Uuid, ProjectRecord>>,
}

impl ProjectStore {
    pub fn insert(&self, record: ProjectRecord) {
        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<ProjectRecord> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Work item for the background flow worker.
#[derive(Debug, Clone)]
pub struct FlowJob {
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub request: ProjectRequest,
    pub board_id: String,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<dyn BoardClient>,
    pub projects: Arc<ProjectStore>,
    pub runs: Arc<RunStore>,
    /// Queue of the background flow worker.
    pub jobs: mpsc::Sender<FlowJob>,
}

impl AppState {
    pub fn new(board: Arc<dyn BoardClient>, runs: RunStore, jobs: mpsc::Sender<FlowJob>) -> Self {
        Self {
            board,
            projects: Arc::new(ProjectStore::default()),
            runs: Arc::new(runs),
            jobs,
        }
    }
}
