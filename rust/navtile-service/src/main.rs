use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use navtile_core::QueryOptions;
use navtile_service::{build_router, AppState, Config, MeshState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cfg = Config::from_env()?;
    let options = QueryOptions { max_nodes: cfg.max_nodes, ..Default::default() };
    let mesh = match &cfg.mesh_path {
        Some(path) => MeshState::load(path, options.clone()).unwrap_or_else(|e| {
            error!(error = %format!("{e:#}"), path = ?path, "initial load failed, starting without a tile set");
            MeshState::unloaded(Some(path.clone()), options)
        }),
        None => MeshState::unloaded(None, options),
    };

    let app = build_router(AppState::new(mesh));
    let addr = cfg.addr();
    info!(addr = %addr, mesh = ?cfg.mesh_path, max_nodes = cfg.max_nodes, "starting navtile-service");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
