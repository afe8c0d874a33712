//! Project planning API server.
//!
//! Accepts project requests, creates and staffs their boards synchronously,
//! then runs the planning flow on a background worker. Run progress is
//! polled through the run record of each project.

mod routes;
mod state;
mod worker;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pmflow::flow::ProjectFlow;
use pmflow::io::config::{Credentials, load_config};
use pmflow::io::run_store::RunStore;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

/// Queued flows beyond this are rejected with a 500.
const JOB_QUEUE_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "pmflow-server")]
#[command(about = "HTTP API for planning projects onto task boards")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    #[arg(long, default_value = "pmflow.toml")]
    config: PathBuf,

    /// Directory for run records
    #[arg(long, default_value = ".pmflow/runs")]
    runs_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    pmflow::logging::init_with_default("pmflow_server=info,pmflow=info,tower_http=info");

    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    let creds = Credentials::from_env()?;
    let flow = Arc::new(ProjectFlow::from_config(&cfg, &creds));

    let (jobs_tx, jobs_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
    let state = AppState::new(flow.board(), RunStore::new(&args.runs_dir), jobs_tx);
    worker::spawn_worker(flow, state.runs.clone(), jobs_rx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, runs_dir = %args.runs_dir.display(), "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_have_defaults() {
        let args = Args::parse_from(["pmflow-server"]);
        assert_eq!(args.bind, "127.0.0.1");
        assert_eq!(args.port, 8000);
        assert_eq!(args.config, PathBuf::from("pmflow.toml"));
    }

    #[test]
    fn args_override_port_and_runs_dir() {
        let args = Args::parse_from(["pmflow-server", "--port", "9100", "--runs-dir", "/tmp/runs"]);
        assert_eq!(args.port, 9100);
        assert_eq!(args.runs_dir, PathBuf::from("/tmp/runs"));
    }
}
