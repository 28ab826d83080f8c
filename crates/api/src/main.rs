use anyhow::Context;

use authgate_infra::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    authgate_observability::init();

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    let state = authgate_api::app::services::build_state(&config).await?;
    let app = authgate_api::app::build_app(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        issuer = %config.issuer,
        concurrent_reads = config.resolver.concurrent_reads,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
