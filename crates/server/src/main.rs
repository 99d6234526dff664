use anyhow::{Context, Result};
use palisade_core::{AppConfig, Gatekeeper};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod router;

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` takes precedence; otherwise the configured level applies to
/// the palisade crates with everything else at `warn`.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("warn,palisade_core={level},server={level}"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty().with_target(false)).init();
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_logging(&config);

    info!(
        bind = %config.bind_addr(),
        upstream = %config.upstream.http_url,
        rpm = config.gate.requests_per_minute,
        allow = ?config.gate.allow,
        exempt = ?config.gate.exempt_ips,
        block_range_limit = config.gate.block_range_limit,
        "server starting"
    );

    let gatekeeper =
        Arc::new(Gatekeeper::from_config(&config).context("failed to build gatekeeper")?);
    if config.gate.prune_idle_buckets {
        gatekeeper.limiter().start_pruning();
    }

    let app = router::build_router(Arc::clone(&gatekeeper), &config);
    let addr: SocketAddr =
        config.bind_addr().parse().context("invalid bind address")?;
    let listener =
        tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down");
    Ok(())
}
