// ============================
// crates/portal-bin/src/main.rs
// ============================
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use truenas_passwd_lib::{
    config::{LogFormat, Settings, DEFAULT_CONFIG_FILE},
    create_router,
    truenas,
    AppState,
};

/// How often expired sessions and stale login failures are purged
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Self-service password portal for TrueNAS users
#[derive(Parser, Debug)]
#[command(name = "truenas-passwd", version, about)]
struct Cli {
    /// Config file; environment variables override its values
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Listen address, overriding `bind_addr`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Check the TrueNAS API connection and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    init_tracing(&settings);

    if cli.check {
        return Ok(check(&settings).await);
    }

    let state = AppState::from_settings(settings).context("building application state")?;
    let addr = state.settings.bind_addr;
    let state = Arc::new(state);
    let _maintenance = state.spawn_maintenance(MAINTENANCE_INTERVAL);

    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving")?;

    tracing::info!("shut down");
    Ok(ExitCode::SUCCESS)
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_ascii_lowercase()));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn check(settings: &Settings) -> ExitCode {
    let result = match truenas::build_admin_api(&settings.truenas) {
        Ok(api) => api.connect().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            println!("TrueNAS API at {} is reachable", settings.truenas.host);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("TrueNAS API check failed: {e}");
            ExitCode::FAILURE
        },
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
