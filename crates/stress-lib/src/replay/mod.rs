//! Replay of historical telemetry as a live sensor stream
//!
//! This module provides:
//! - Loading of the labeled historical dataset
//! - A deterministic simulator with explicit cursor/clock state
//! - A bounded reading log mirrored to disk
//! - An interval-driven runner for long-lived replays

mod dataset;
mod log;
mod runner;
mod simulator;
mod state;

#[cfg(test)]
mod tests;

pub use dataset::HistoricalDataset;
pub use log::{PendingWrite, ReadingLog, DEFAULT_LOG_CAPACITY, DEFAULT_LOG_FILE};
pub use runner::{ReplayConfig, ReplayRunner, ReplaySummary, SharedSimulator, DEFAULT_REPLAY_INTERVAL};
pub use simulator::{
    ReplayMode, ReplayOptions, ReplaySimulator, ReplayStream, SimulatorPhase, DEFAULT_CYCLE_PERIOD,
};
pub use state::{CursorKey, ReplayState};
