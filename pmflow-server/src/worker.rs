//! Background worker: runs queued flows one at a time and keeps their run
//! records current.

use std::sync::Arc;

use pmflow::flow::{FlowPhase, ProjectFlow};
use pmflow::io::run_store::{RunRecord, RunStatus, RunStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::state::FlowJob;

pub fn spawn_worker(
    flow: Arc<ProjectFlow>,
    runs: Arc<RunStore>,
    mut jobs: mpsc::Receiver<FlowJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            process_job(&flow, &runs, job).await;
        }
        info!("job queue closed, worker stopping");
    })
}

/// Run one job to completion, recording every phase.
#[instrument(skip_all, fields(run_id = %job.run_id, project_id = %job.project_id))]
pub async fn process_job(flow: &ProjectFlow, runs: &RunStore, job: FlowJob) {
    record(runs, &job, |run| run.status = RunStatus::Running);

    let outcome = flow
        .run(&job.request, Some(job.board_id.as_str()), |phase| {
            let name = phase.name();
            record(runs, &job, |run| run.phase = Some(name.to_string()));
            if let FlowPhase::Execution { cards } = phase {
                info!(cards, "executing cards");
            }
        })
        .await;

    match outcome {
        Ok(report) => {
            let created = report.cards_created();
            let failed = report.cards_failed();
            info!(board_id = %report.board_id, created, failed, "flow finished");
            record(runs, &job, |run| {
                run.cards_created = created;
                run.cards_failed = failed;
                run.status = if failed == 0 {
                    RunStatus::Succeeded
                } else {
                    RunStatus::PartiallyFailed
                };
            });
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(error = %message, "flow failed");
            record(runs, &job, |run| {
                run.status = RunStatus::Failed;
                run.error = Some(message);
            });
        }
    }
}

fn record(runs: &RunStore, job: &FlowJob, apply: impl FnOnce(&mut RunRecord)) {
    if let Err(err) = runs.update(job.run_id, apply) {
        warn!(error = %format!("{err:#}"), "could not update run record");
    }
}
