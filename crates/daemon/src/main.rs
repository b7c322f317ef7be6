// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claw Daemon (clawd)
//!
//! Background process that ingests tracker webhooks and drives the
//! dispatch pipeline.
//!
//! Architecture:
//! - Webhook listener: accepts POSTs, acks fast, hands payloads to the router
//! - Router: dedup + intent routing onto the engine
//! - Dispatch loop: consumes queued dispatches (DAG unblocks)
//! - Maintenance tasks: dedup sweep, completed-record pruning, recovery

use claw_daemon::http;
use claw_daemon::lifecycle::{self, build_classifier, build_engine, setup_logging, Config};
use claw_daemon::router::Router;
use claw_engine::classify::IntentClassifier;
use claw_engine::runtime::{
    run_dispatch_loop, spawn_supervised, STALE_DISPATCH_MAX_AGE_MS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("clawd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("clawd {}", env!("CARGO_PKG_VERSION"));
                println!("Claw Daemon - drives issue dispatches from tracker webhooks");
                println!();
                println!("USAGE:");
                println!("    clawd");
                println!();
                println!("Listens for tracker webhooks on CLAW_LISTEN (default");
                println!("127.0.0.1:8787) and keeps state under CLAW_CONFIG_DIR.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: clawd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    let _log_guard = setup_logging(&config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting clawd");

    let (engine, dispatch_rx) = build_engine(&config)?;
    let classifier = IntentClassifier::new(build_classifier(&config));
    let router = Arc::new(Router::new(Arc::clone(&engine), classifier));

    // Queued dispatches (DAG unblocks) get their own consumer.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(run_dispatch_loop(engine, dispatch_rx));
    }

    // Startup housekeeping runs behind the listener so webhook ingestion
    // is responsive immediately.
    {
        let engine = Arc::clone(&engine);
        spawn_supervised("startup-recovery", async move {
            engine.ensure_webhook().await;
            match engine.recover().await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "recovered dispatches"),
                Err(e) => error!(error = %e, "recovery pass failed"),
            }
            match engine.reclaim_stale(STALE_DISPATCH_MAX_AGE_MS).await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "reclaimed stale dispatches"),
                Err(e) => error!(error = %e, "stale reclaim failed"),
            }
        });
    }

    // Periodic maintenance: dedup sweep and completed-record pruning.
    {
        let engine = Arc::clone(&engine);
        let sweep_interval =
            Duration::from_millis(engine.config().dedup_sweep_interval_ms.max(1_000));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                engine.sweep_dedup();
            }
        });
    }
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
            loop {
                ticker.tick().await;
                match engine.prune_completed() {
                    Ok(0) => {}
                    Ok(n) => info!(count = n, "pruned completed dispatches"),
                    Err(e) => warn!(error = %e, "prune failed"),
                }
            }
        });
    }

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "webhook listener ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "webhook connection");
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            handle_connection(stream, router).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received; shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received; shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Read one webhook request, ack immediately, then run the handler on a
/// supervised task (the tracker times out slow responders).
async fn handle_connection(
    stream: tokio::net::TcpStream,
    router: Arc<lifecycle::DaemonRouter>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let outcome = match tokio::time::timeout(http::READ_TIMEOUT, http::read_request(&mut reader))
        .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "webhook read failed");
            return;
        }
        Err(_) => {
            let _ = http::write_response(&mut write_half, &http::Ingested::BadRequest("read timeout"))
                .await;
            return;
        }
    };

    if let Err(e) = http::write_response(&mut write_half, &outcome).await {
        tracing::debug!(error = %e, "webhook response write failed");
    }

    if let http::Ingested::Payload(payload) = outcome {
        spawn_supervised("webhook-handler", async move {
            router.dispatch(payload).await;
        });
    }
}
