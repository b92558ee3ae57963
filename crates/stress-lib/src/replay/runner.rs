//! Replay loop
//!
//! Drives a shared simulator on a fixed interval, appending every record to
//! the reading log until shutdown or an optional record limit.

use super::log::{ReadingLog, DEFAULT_LOG_CAPACITY, DEFAULT_LOG_FILE};
use super::simulator::{ReplayMode, ReplayOptions, ReplaySimulator, DEFAULT_CYCLE_PERIOD};
use crate::models::{Label, ReplayRecord};
use crate::observability::{StressMetrics, StructuredLogger};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Default delay between replayed records
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(1);

/// Simulator handle shared between tasks. The lock covers a whole advance.
pub type SharedSimulator = Arc<Mutex<ReplaySimulator>>;

/// Everything needed to start a replay
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub dataset: PathBuf,
    /// Replay only rows with this label
    pub label: Option<Label>,
    pub cycle: bool,
    /// Walk rows in order; also makes cycling walk each label in order
    pub sequential: bool,
    pub cycle_period: u64,
    pub seed: Option<u64>,
    pub interval: Duration,
    pub log_path: PathBuf,
    pub log_capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("balanced_data.csv"),
            label: None,
            cycle: false,
            sequential: false,
            cycle_period: DEFAULT_CYCLE_PERIOD,
            seed: None,
            interval: DEFAULT_REPLAY_INTERVAL,
            log_path: PathBuf::from(DEFAULT_LOG_FILE),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ReplayConfig {
    pub fn mode(&self) -> ReplayMode {
        ReplayMode::from_flags(self.label, self.cycle, self.sequential)
    }

    pub fn options(&self) -> ReplayOptions {
        ReplayOptions {
            cycle_period: self.cycle_period,
            shuffle: !self.sequential,
            seed: self.seed,
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub records: u64,
    pub last_timestamp: Option<String>,
}

pub struct ReplayRunner {
    simulator: SharedSimulator,
    log: ReadingLog,
    mode: ReplayMode,
    interval: Duration,
    logger: StructuredLogger,
    metrics: StressMetrics,
}

impl ReplayRunner {
    pub fn new(simulator: SharedSimulator, log: ReadingLog, mode: ReplayMode, interval: Duration) -> Self {
        Self {
            simulator,
            log,
            mode,
            interval,
            logger: StructuredLogger::new("replay"),
            metrics: StressMetrics::new(),
        }
    }

    /// Load the dataset and open the persisted log described by `config`
    pub fn from_config(config: &ReplayConfig) -> Result<Self> {
        let simulator = ReplaySimulator::load(&config.dataset, config.options())?;
        let log = ReadingLog::with_persistence(config.log_path.clone(), config.log_capacity);
        Ok(Self::new(
            Arc::new(Mutex::new(simulator)),
            log,
            config.mode(),
            config.interval,
        ))
    }

    pub fn simulator(&self) -> SharedSimulator {
        self.simulator.clone()
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn log(&self) -> &ReadingLog {
        &self.log
    }

    /// Advance once, record the result and flush the log
    pub fn step(&mut self) -> Result<ReplayRecord> {
        let record = self.advance_once()?;
        self.log.flush()?;
        Ok(record)
    }

    /// Advance and append to the in-memory log without touching disk
    fn advance_once(&mut self) -> Result<ReplayRecord> {
        let (record, cycle_label) = {
            let mut simulator = self
                .simulator
                .lock()
                .map_err(|e| anyhow!("Lock poisoned: {}", e))?;
            let record = simulator.advance(self.mode)?;
            let cycle_label = match self.mode {
                ReplayMode::Cycling => simulator.active_cycle_label(),
                _ => None,
            };
            (record, cycle_label)
        };

        self.log.push(record.clone());
        self.metrics.inc_replay_records();
        self.logger.log_replay_record(&record, cycle_label);
        Ok(record)
    }

    /// Run until `shutdown` fires, `limit` records are written, or an advance
    /// fails
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
        limit: Option<u64>,
    ) -> Result<ReplaySummary> {
        let rows = self
            .simulator
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))?
            .dataset()
            .len();
        self.logger
            .log_replay_started(&format!("{:?}", self.mode), rows, self.interval.as_millis());

        let mut summary = ReplaySummary::default();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if limit.is_some_and(|max| summary.records >= max) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick_and_persist().await {
                        Ok(record) => {
                            summary.records += 1;
                            summary.last_timestamp = Some(record.timestamp);
                        }
                        Err(e) => {
                            error!(error = %e, "Replay step failed");
                            self.logger.log_replay_stopped(summary.records);
                            return Err(e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Replay received shutdown signal");
                    break;
                }
            }
        }

        if let Ok(mut simulator) = self.simulator.lock() {
            simulator.stop();
        }
        self.logger.log_replay_stopped(summary.records);
        Ok(summary)
    }

    /// One advance whose log file write runs on the blocking pool, keeping
    /// fsync off the runtime threads
    async fn tick_and_persist(&mut self) -> Result<ReplayRecord> {
        let record = self.advance_once()?;
        if let Some(pending) = self.log.take_pending()? {
            tokio::task::spawn_blocking(move || pending.write())
                .await
                .map_err(|e| anyhow!("Log writer task failed: {}", e))??;
        }
        Ok(record)
    }
}
