//! embystreams-gateway: secured read-only gateway for media-server sessions.
//!
//! Serves the dashboard widget's API: verifies the CSRF token, rate-limits
//! each caller, validates the stored media-server settings, and returns the
//! normalized now-playing sessions.

mod auth;
mod config;
mod gateway;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use auth::StaticSessionToken;
use config::{GatewayConfig, Overrides};
use embystreams_core::{csrf, FileConfigStore};
use gateway::{Gateway, UpstreamClient};

const CSRF_ENV: &str = "EMBYSTREAMS_CSRF_TOKEN";

/// embystreams-gateway: EmbyStreams dashboard API
#[derive(Parser, Debug)]
#[command(name = "embystreams-gateway", version, about = "EmbyStreams dashboard gateway")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.embystreams/gateway.toml")]
    config: String,

    /// Plugin settings file (KEY="value" format)
    #[arg(long)]
    settings: Option<String>,

    /// Session CSRF secret expected in X-CSRF-Token
    #[arg(long)]
    csrf_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting embystreams-gateway");

    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "gateway failed");
        std::process::exit(1);
    }

    info!("embystreams-gateway stopped");
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = PathBuf::from(&cli.config);
    let cfg = GatewayConfig::load(
        Some(&config_path),
        Overrides {
            bind: cli.bind,
            port: cli.port,
            settings_path: cli.settings,
            csrf_token: cli.csrf_token,
        },
    )
    .map_err(anyhow::Error::msg)
    .context("failed to load config")?;
    info!(config = ?cfg, "configuration resolved");

    let csrf_token = resolve_csrf_token(cfg.csrf_token.clone())?;
    let store = FileConfigStore::new(&cfg.settings_path);
    let upstream = UpstreamClient::new(&cfg.api_root).context("failed to build HTTP client")?;
    let gateway = Gateway::new(
        Arc::new(store),
        Arc::new(StaticSessionToken::new(csrf_token)),
        upstream,
    );

    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.bind, cfg.port))?;

    server::serve(gateway, addr, shutdown_signal())
        .await
        .context("server error")
}

/// Config or CLI value, else the environment, else a fresh random token.
fn resolve_csrf_token(configured: Option<String>) -> anyhow::Result<String> {
    if let Some(token) = configured {
        return Ok(token);
    }
    if let Some(token) = std::env::var(CSRF_ENV).ok().filter(|t| !t.is_empty()) {
        return Ok(token);
    }

    let token = csrf::generate_token()
        .map_err(|_| anyhow::anyhow!("system random source unavailable"))?;
    warn!(
        env = CSRF_ENV,
        "no CSRF token configured; generated one for this run. Provision it to the dashboard host"
    );
    info!(csrf_token = %token, "generated CSRF token");
    Ok(token)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("received shutdown signal");
}
