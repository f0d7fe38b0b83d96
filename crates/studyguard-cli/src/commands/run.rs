//! Live engine: observations on stdin, actions on stdout
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use studyguard_core::{Daemon, ObservationLog};
use studyguard_storage::{Action, AuditStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::helpers::{build_classifier, load_config, parse_observation_line};

pub async fn handle_run(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let classifier = build_classifier(&config)?;
    let store = Arc::new(AuditStore::new(db_path)?);

    let log = ObservationLog::new();
    let (tx, rx) = mpsc::channel(32);
    let mut daemon = Daemon::new(&config, log.clone(), classifier, store, tx);
    let shutdown = daemon.shutdown_handle();

    let reader = tokio::spawn(read_observations(log, shutdown));
    let writer = tokio::spawn(write_actions(rx));

    daemon.run().await?;
    drop(daemon);

    reader.abort();
    writer.await.context("Action writer panicked")??;
    Ok(())
}

/// Append every stdin line to the log; end of input ends the session
async fn read_observations(log: ObservationLog, shutdown: Arc<AtomicBool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_observation_line(&line, Some(Utc::now())) {
                Ok(Some(observation)) => {
                    let appended = log.append(observation);
                    log::debug!("Observation #{}: {}", appended.sequence, appended.url);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Skipping observation: {e:#}"),
            },
            Ok(None) => {
                log::info!("Observation stream closed");
                break;
            }
            Err(e) => {
                log::error!("Failed to read observations: {e}");
                break;
            }
        }
    }
    shutdown.store(true, Ordering::SeqCst);
}

async fn write_actions(mut rx: mpsc::Receiver<Action>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(action) = rx.recv().await {
        let mut line = serde_json::to_string(&action)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
