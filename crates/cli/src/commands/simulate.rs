//! Local sensor replay commands

use anyhow::{Context, Result};
use std::path::Path;
use stress_lib::replay::{ReadingLog, ReplayConfig, ReplayRunner, DEFAULT_LOG_CAPACITY};
use tokio::sync::broadcast;
use tracing::info;

use crate::output::{print_info, print_success};

/// Replay the dataset until Ctrl-C or `count` records
pub async fn simulate(config: ReplayConfig, count: Option<u64>) -> Result<()> {
    print_info(&format!(
        "Replaying {} ({:?}) every {:?} into {}",
        config.dataset.display(),
        config.mode(),
        config.interval,
        config.log_path.display()
    ));

    let runner = ReplayRunner::from_config(&config)
        .with_context(|| format!("Failed to start replay of {}", config.dataset.display()))?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping replay");
            let _ = shutdown_tx.send(());
        }
    });

    let summary = runner.run(shutdown_rx, count).await?;

    print_success(&format!("Replayed {} readings", summary.records));
    if let Some(last) = summary.last_timestamp {
        println!("Last timestamp: {}", last);
    }
    Ok(())
}

/// Empty the reading log file
pub fn clear(path: &Path) -> Result<()> {
    let mut log = ReadingLog::with_persistence(path.to_path_buf(), DEFAULT_LOG_CAPACITY);
    let removed = log.len();
    log.clear();
    log.flush()?;
    print_success(&format!(
        "Cleared {} readings from {}",
        removed,
        path.display()
    ));
    Ok(())
}
