mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use session_log::{EventKind, LogRecord, LogSink, SessionLogger};
use smtp_inspect::LineInspector;
use tcp_relay::{Relay, RelayConfig, SessionId};

use crate::cli::Cli;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args. `--version` prints and exits here.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let from_file = config::load(&cli.config)?;
    let config_found = from_file.is_some();
    let mut cfg = from_file.unwrap_or_default();
    cli.apply(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    // 3. Diagnostic tracing. RUST_LOG wins over the configured level.
    let default_level = if cfg.logging.verbose {
        "debug"
    } else {
        cfg.logging.level.as_str()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    info!(
        version = VERSION,
        log_file = %cfg.logging.log_file.display(),
        "starting smtp-proxy: tcp proxy and SMTP logger"
    );

    // 4. Open the session log. Not being able to write it is fatal.
    let (sink, _writer) = LogSink::start(&cfg.logging.log_file)
        .await
        .with_context(|| {
            format!(
                "unable to open log file {}",
                cfg.logging.log_file.display()
            )
        })?;
    let logger = SessionLogger::new(sink, cfg.logging.verbose);

    logger
        .log(
            LogRecord::info(
                EventKind::ProxyStarted,
                format!("starting smtp-proxy: tcp proxy and SMTP logger, version {VERSION}"),
            )
            .with_details(serde_json::json!({
                "version": VERSION,
                "log_file": cfg.logging.log_file.display().to_string(),
                "verbose": cfg.logging.verbose,
            })),
        )
        .await;

    // 5. Build the relay.
    let inspector = LineInspector::new().context("failed to build SMTP line inspector")?;
    let relay = Relay::new(RelayConfig {
        listen_addr: cfg.network.local_addr.clone(),
        upstream_addr: cfg.network.remote_addr.clone(),
        chunk_size: cfg.relay.chunk_size,
        inspector: Arc::new(inspector),
        logger: logger.clone(),
        session_ids: SessionId::generate,
    });

    // 6. Bind. Failure is fatal and recorded in the session log first.
    let listener = match relay.bind().await {
        Ok(listener) => listener,
        Err(err) => {
            logger
                .log(LogRecord::error(
                    EventKind::ProxyStopped,
                    format!(
                        "unable to create listener on {}: {err}",
                        cfg.network.local_addr
                    ),
                ))
                .await;
            logger.flush().await;
            return Err(err).with_context(|| {
                format!("unable to create listener on {}", cfg.network.local_addr)
            });
        }
    };

    // 7. Serve until SIGINT/SIGTERM.
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    relay
        .serve(listener, async move {
            let _ = shutdown_rx.recv().await;
        })
        .await;

    // 8. Log shutdown and make sure it reaches the disk.
    info!("smtp-proxy shutting down");
    logger
        .log(LogRecord::info(
            EventKind::ProxyStopped,
            "smtp-proxy shutting down",
        ))
        .await;
    logger.flush().await;

    Ok(())
}

/// Resolve on ctrl-c, or on SIGTERM where available.
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        info!("received SIGINT (ctrl-c)");
                    }
                    _ = sigterm.recv() => {
                        info!("received SIGTERM");
                    }
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler; only ctrl-c will stop the proxy");
                let _ = ctrl_c.await;
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received SIGINT (ctrl-c)");
    }
}
