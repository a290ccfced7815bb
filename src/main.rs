use anyhow::Result;
use axum::Router;
use grid_merge_orchestrator::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    if cfg.auth.token.is_empty() || cfg.auth.token.starts_with("__SET_VIA_ENV") {
        anyhow::bail!("MERGE__AUTH__TOKEN is unset; configure a random bearer token before starting");
    }

    if cfg.auth.token == "devtoken" {
        warn!("auth token is the development default, do not expose this instance");
    }

    let (app_state, intake_rx) = controller::AppState::new(cfg.clone()).await?;
    let processes = app_state.repos.processes.list().await?;
    info!(
        processes = processes.len(),
        mode = ?cfg.collaborators.mode,
        verdict_policy = ?cfg.merge.verdict_policy,
        "merge orchestrator configured"
    );

    #[allow(unused_mut)]
    let mut app: Router = api::router(app_state.clone(), &cfg);

    #[cfg(feature = "metrics")]
    {
        app = api::with_metrics(app);
    }

    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("listening on all interfaces; the manual replace/export routes are reachable from the network");
    }

    info!(%addr, "starting grid merge orchestrator");

    controller::spawn_controller_tasks(app_state, intake_rx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
