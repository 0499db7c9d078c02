use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docstore::{DocumentStore, Post, ServerConfig, User, web::build_router};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docstore")]
#[command(about = "JSON API over file-backed users and posts collections")]
struct Cli {
    /// Bind host (overrides APP_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides APP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding users.json and posts.json (overrides DOCSTORE_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Bound on queued writes per collection, 0 for unbounded
    /// (overrides DOCSTORE_QUEUE_CAPACITY)
    #[arg(long)]
    queue_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env().context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(capacity) = cli.queue_capacity {
        config.queue_capacity = Some(capacity).filter(|c| *c > 0);
    }

    let users = Arc::new(
        DocumentStore::<User>::initialize(config.store("users"))
            .await
            .context("failed to initialize users store")?,
    );
    let posts = Arc::new(
        DocumentStore::<Post>::initialize(config.store("posts"))
            .await
            .context("failed to initialize posts store")?,
    );

    let app = build_router(users.clone(), posts.clone());

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, data_dir = %config.data_dir.display(), "docstore server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    users
        .close()
        .await
        .context("failed to drain users writes")?;
    posts
        .close()
        .await
        .context("failed to drain posts writes")?;

    info!("docstore server stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docstore=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
