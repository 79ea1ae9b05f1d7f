//! Foldyx Web Server
//!
//! Run with: cargo run -p foldyx-web

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use foldyx_config::Config;
use foldyx_jobs::gpu::detect_gpu_count;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("foldyx=debug,info")),
        )
        .init();

    info!("Foldyx starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!(
        "Configuration loaded. Tool: {}, output format: {}, workspace: {}",
        config.tool.executable,
        config.tool.output_format.as_flag(),
        config.workspace.path
    );

    tokio::fs::create_dir_all(&config.workspace.path).await?;

    let gpu_count = detect_gpu_count(&config.tool.gpu_probe).await;
    if gpu_count <= 1 {
        warn!("Running with a single device; multi-GPU options are disabled");
    }

    let bind = config.server.bind.clone();
    let state = foldyx_web::state::AppState::new(config, gpu_count);
    let app = foldyx_web::router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
