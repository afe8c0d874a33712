//! HTTP route handlers for the project API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::Utc;
use pmflow::core::types::{FieldErrors, ProjectRequest, TeamMember, Timeline};
use pmflow::crews::board_setup::{create_board, invite_team};
use pmflow::io::run_store::{RunRecord, RunStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::{AppState, FlowJob, ProjectRecord};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/project/create/", post(create_project))
        .route("/api/v1/project/{id}/", get(get_project))
        .route("/api/v1/project/{id}/run/", get(get_run))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Failure body with the status it is sent with.
struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    fn fields(errors: FieldErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!(errors),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CreateProjectBody {
    name: String,
    description: String,
    #[serde(default)]
    industry: String,
    #[serde(default)]
    team_members: Vec<TeamMember>,
    timeline: Timeline,
    #[serde(default)]
    organization_id: Option<Value>,
}

const REQUIRED_FIELDS: [&str; 3] = ["name", "description", "timeline"];

/// Field errors for a missing or malformed body, before typed decoding.
fn decode_body(body: Value) -> Result<CreateProjectBody, ApiError> {
    let Value::Object(fields) = &body else {
        let mut errors = FieldErrors::new();
        errors.insert(
            "non_field_errors".to_string(),
            vec!["Invalid data. Expected a dictionary.".to_string()],
        );
        return Err(ApiError::fields(errors));
    };
    let mut errors = FieldErrors::new();
    for field in REQUIRED_FIELDS {
        if fields.get(field).is_none_or(Value::is_null) {
            errors.insert(field.to_string(), vec!["This field is required.".to_string()]);
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::fields(errors));
    }
    serde_json::from_value(body).map_err(|err| {
        let mut errors = FieldErrors::new();
        errors.insert("non_field_errors".to_string(), vec![err.to_string()]);
        ApiError::fields(errors)
    })
}

/// POST /api/v1/project/create/ - create the board, invite the team and
/// queue the planning flow.
async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ProjectRecord>), ApiError> {
    let body = decode_body(body)?;
    let mut request = ProjectRequest {
        name: body.name,
        description: body.description,
        industry: body.industry,
        timeline: body.timeline,
        team_members: body.team_members,
    };
    let errors = request.validate();
    if !errors.is_empty() {
        return Err(ApiError::fields(errors));
    }

    let board_id = create_board(state.board.as_ref(), &request)
        .await
        .map_err(|err| {
            warn!(error = %err, "board creation failed");
            ApiError::message(StatusCode::BAD_GATEWAY, format!("Failed to create board: {err}"))
        })?;
    invite_team(state.board.as_ref(), &board_id, &mut request.team_members)
        .await
        .map_err(|err| {
            warn!(error = %format!("{err:#}"), "member invitation failed");
            ApiError::message(
                StatusCode::BAD_GATEWAY,
                format!("Failed to invite team members: {err:#}"),
            )
        })?;

    let project_id = Uuid::new_v4();
    let run_id = Uuid::new_v4();
    let record = ProjectRecord {
        id: project_id,
        request: request.clone(),
        organization_id: body.organization_id.map(|id| match id {
            Value::String(text) => text,
            other => other.to_string(),
        }),
        board_id: board_id.clone(),
        run_id,
        created_at: Utc::now(),
    };
    state.projects.insert(record.clone());

    let internal = |err: String| ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, err);
    state
        .runs
        .write(&RunRecord::queued(run_id, project_id))
        .map_err(|err| internal(format!("Failed to record run: {err:#}")))?;
    let job = FlowJob {
        run_id,
        project_id,
        request,
        board_id,
    };
    // A full queue is rejected rather than awaited.
    if let Err(err) = state.jobs.try_send(job) {
        let reason = match err {
            TrySendError::Full(_) => "flow queue is full",
            TrySendError::Closed(_) => "flow queue is closed",
        };
        warn!(%run_id, reason, "flow not queued");
        if let Err(update_err) = state.runs.update(run_id, |run| {
            run.status = RunStatus::Failed;
            run.error = Some(reason.to_string());
        }) {
            warn!(error = %format!("{update_err:#}"), "could not update run record");
        }
        return Err(internal(format!("Failed to queue planning flow: {reason}")));
    }

    info!(%project_id, %run_id, board_id = %record.board_id, "project created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/project/{id}/ - stored project.
async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectRecord>, ApiError> {
    state
        .projects
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::message(StatusCode::NOT_FOUND, "project not found"))
}

/// GET /api/v1/project/{id}/run/ - latest run record, for polling.
async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunRecord>, ApiError> {
    let project = state
        .projects
        .get(id)
        .ok_or_else(|| ApiError::message(StatusCode::NOT_FOUND, "project not found"))?;
    match state.runs.load(project.run_id) {
        Ok(Some(run)) => Ok(Json(run)),
        Ok(None) => Err(ApiError::message(StatusCode::NOT_FOUND, "run not found")),
        Err(err) => Err(ApiError::message(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{err:#}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use pmflow::io::run_store::RunStore;
    use pmflow::test_support::FakeBoard;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct Harness {
        board: Arc<FakeBoard>,
        state: AppState,
        jobs: mpsc::Receiver<FlowJob>,
        temp: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with_queue(8)
    }

    fn harness_with_queue(capacity: usize) -> Harness {
        let temp = tempfile::tempdir().expect("tempdir");
        let board = Arc::new(FakeBoard::new());
        let (tx, rx) = mpsc::channel(capacity);
        let state = AppState::new(board.clone(), RunStore::new(temp.path()), tx);
        Harness {
            board,
            state,
            jobs: rx,
            temp,
        }
    }

    fn valid_body() -> Value {
        json!({
            "name": "Storefront",
            "description": "Online store with catalog, cart and checkout.",
            "industry": "Retail",
            "organization_id": 7,
            "timeline": {"start_date": "2025-11-03", "end_date": "2026-01-30"},
            "team_members": [
                {"name": "Ada", "email": "ada@example.com", "role": "Backend Developer", "skills": ["rust"]}
            ]
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Verifies a valid request creates the board, invites members and
    /// queues a flow job.
    #[tokio::test]
    async fn create_project_queues_flow() {
        let mut h = harness();
        let (status, body) = send(
            router(h.state.clone()),
            "POST",
            "/api/v1/project/create/",
            Some(valid_body()),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["board_id"], "board-1");
        assert_eq!(body["organization_id"], "7");
        assert_eq!(body["team_members"][0]["board_member_id"], "member-2");

        let job = h.jobs.try_recv().expect("queued job");
        assert_eq!(job.board_id, "board-1");
        assert_eq!(
            job.request.team_members[0].board_member_id.as_deref(),
            Some("member-2")
        );
        let run_id: Uuid = serde_json::from_value(body["run_id"].clone()).expect("run id");
        let run = h.state.runs.load(run_id).expect("load").expect("run");
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(h.board.snapshot().boards.len(), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_reported_per_field() {
        let h = harness();
        let (status, body) = send(
            router(h.state.clone()),
            "POST",
            "/api/v1/project/create/",
            Some(json!({"name": "Storefront"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["description"][0], "This field is required.");
        assert_eq!(body["timeline"][0], "This field is required.");
        assert!(h.board.snapshot().boards.is_empty());
    }

    #[tokio::test]
    async fn invalid_member_email_is_rejected() {
        let h = harness();
        let mut request = valid_body();
        request["team_members"][0]["email"] = json!("not-an-email");

        let (status, body) = send(
            router(h.state.clone()),
            "POST",
            "/api/v1/project/create/",
            Some(request),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["team_members[0].email"][0], "Enter a valid email address.");
    }

    #[tokio::test]
    async fn board_failure_is_bad_gateway() {
        let mut h = harness();
        h.board.fail_op("create_board");

        let (status, body) = send(
            router(h.state.clone()),
            "POST",
            "/api/v1/project/create/",
            Some(valid_body()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("injected failure")
        );
        assert!(h.jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_queue_is_internal_error() {
        let h = harness();
        let Harness { state, jobs, .. } = h;
        drop(jobs);

        let (status, body) = send(
            router(state),
            "POST",
            "/api/v1/project/create/",
            Some(valid_body()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .starts_with("Failed to queue planning flow")
        );
    }

    /// Verifies a full queue answers 500 at once and fails the run record.
    #[tokio::test]
    async fn full_queue_is_rejected_without_waiting() {
        let mut h = harness_with_queue(1);
        let app = router(h.state.clone());
        let create = || send(app.clone(), "POST", "/api/v1/project/create/", Some(valid_body()));

        let (first, _) = create().await;
        assert_eq!(first, StatusCode::CREATED);

        let (second, body) = tokio::time::timeout(Duration::from_secs(2), create())
            .await
            .expect("handler must not wait for queue space");
        assert_eq!(second, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to queue planning flow: flow queue is full");

        let queued = h.jobs.try_recv().expect("first job");
        assert!(h.jobs.try_recv().is_err());

        let mut runs: Vec<RunRecord> = std::fs::read_dir(h.temp.path())
            .expect("runs dir")
            .map(|entry| {
                let raw = std::fs::read_to_string(entry.expect("entry").path()).expect("read");
                serde_json::from_str(&raw).expect("run record")
            })
            .collect();
        runs.sort_by_key(|run| run.run_id != queued.run_id);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Queued);
        assert_eq!(runs[1].status, RunStatus::Failed);
        assert_eq!(runs[1].error.as_deref(), Some("flow queue is full"));
    }

    #[tokio::test]
    async fn project_and_run_can_be_polled() {
        let h = harness();
        let app = router(h.state.clone());
        let (_, created) = send(app.clone(), "POST", "/api/v1/project/create/", Some(valid_body())).await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, project) = send(app.clone(), "GET", &format!("/api/v1/project/{id}/"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(project["name"], "Storefront");

        let (status, run) = send(app.clone(), "GET", &format!("/api/v1/project/{id}/run/"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["status"], "queued");

        let missing = Uuid::new_v4();
        let (status, _) = send(app, "GET", &format!("/api/v1/project/{missing}/"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let h = harness();
        let response = router(h.state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
