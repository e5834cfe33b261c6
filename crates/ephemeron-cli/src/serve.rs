//! `serve`: webhook + reaper loop + internal probes.
//!
//! # 起動順
//! 1. Redis に接続して ping（失敗したら終了）
//! 2. 未初期化なら reconcile（失敗はログのみ。次の起動でまた試す）
//! 3. reaper loop を spawn
//! 4. public / internal の 2 つの listener を起動
//!
//! SIGTERM / SIGINT で両方の server を graceful に止め、reaper の終了を待つ。

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ephemeron_core::app::{Ingestor, ReaperHandle};
use ephemeron_core::config::Config;
use ephemeron_core::http::{HookState, hook_router, probe_router};
use ephemeron_core::metrics;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::Services;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn run(config: Config) -> Result<()> {
    config
        .validate_for_serve()
        .context("invalid configuration")?;
    metrics::register_metrics();

    let services = Services::connect(&config).await?;

    if let Err(e) = services.reconciler(&config).run_if_needed().await {
        tracing::error!(error = %e, "auto-recovery failed");
    }

    let reaper = ReaperHandle::spawn(Arc::new(services.reaper(&config)), config.reap_interval);
    tracing::info!(
        interval_secs = config.reap_interval.as_secs(),
        "reaper loop started"
    );

    let ingestor = Arc::new(Ingestor::new(
        services.store.clone(),
        services.clock.clone(),
        config.ttl_policy(),
    ));
    let public = hook_router(HookState::new(ingestor, &config.hook_token));
    let internal = probe_router(services.store.clone());

    let public_listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind to port {}", config.port))?;
    let internal_listener = TcpListener::bind(("0.0.0.0", config.internal_port))
        .await
        .with_context(|| format!("failed to bind to port {}", config.internal_port))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutting down HTTP servers");
        // ignore send error: servers may already be gone
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(port = config.internal_port, "starting internal server");
    let internal_server = tokio::spawn(
        axum::serve(internal_listener, internal)
            .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()))
            .into_future(),
    );

    tracing::info!(port = config.port, "starting server");
    let served = axum::serve(public_listener, public)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx))
        .await;

    let drain = async {
        match internal_server.await {
            Ok(Err(e)) => tracing::error!(error = %e, "internal server failed"),
            Err(e) => tracing::error!(error = %e, "internal server task panicked"),
            Ok(Ok(())) => {}
        }
        reaper.shutdown_and_join().await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "shutdown grace period elapsed, exiting"
        );
    }

    served.context("server failed")
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    // sender dropped counts as shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C");
    }
}
