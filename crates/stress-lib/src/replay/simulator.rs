//! Deterministic replay of historical telemetry
//!
//! Each advance picks a historical row (sequentially, at random, optionally
//! restricted to one label or cycling through labels) and reports its sensor
//! values stamped with the simulator's own clock, which moves exactly one
//! second per advance regardless of mode.

use super::dataset::HistoricalDataset;
use super::state::{CursorKey, ReplayState};
use crate::error::ReplayError;
use crate::models::{Label, ReplayRecord, REPLAY_TIMESTAMP_FORMAT};
use chrono::{Local, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Advances between label rotations in cycling mode
pub const DEFAULT_CYCLE_PERIOD: u64 = 10;

/// Row selection strategy for one advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    AllSequential,
    AllRandom,
    FilteredSequential(Label),
    FilteredRandom(Label),
    /// Rotate through the dataset's labels every cycle period
    ///
    /// Only labels present in the dataset take part, in ascending order, so a
    /// label with no rows is skipped rather than replayed from the full set.
    Cycling,
}

impl ReplayMode {
    /// Mode matching the simulator's command-line switches
    pub fn from_flags(label: Option<Label>, cycle: bool, sequential: bool) -> Self {
        match (label, cycle, sequential) {
            (Some(label), _, true) => ReplayMode::FilteredSequential(label),
            (Some(label), _, false) => ReplayMode::FilteredRandom(label),
            (None, true, _) => ReplayMode::Cycling,
            (None, false, true) => ReplayMode::AllSequential,
            (None, false, false) => ReplayMode::AllRandom,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub cycle_period: u64,
    /// Cycling picks rows at random within the active label when set
    pub shuffle: bool,
    /// Seed for random selection; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            cycle_period: DEFAULT_CYCLE_PERIOD,
            shuffle: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorPhase {
    /// Dataset loaded, nothing emitted yet
    Ready,
    Streaming,
    Stopped,
}

pub struct ReplaySimulator {
    dataset: Arc<HistoricalDataset>,
    labels: Vec<Label>,
    state: ReplayState,
    options: ReplayOptions,
    rng: StdRng,
    phase: SimulatorPhase,
}

impl ReplaySimulator {
    /// Load the dataset at `path` and move to `Ready`
    pub fn load(path: &Path, options: ReplayOptions) -> Result<Self, ReplayError> {
        let dataset = HistoricalDataset::load(path)?;
        Ok(Self::new(Arc::new(dataset), options))
    }

    pub fn new(dataset: Arc<HistoricalDataset>, options: ReplayOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = ReplayState::new(initial_clock(&dataset));
        info!(
            rows = dataset.len(),
            start = %state.clock(),
            cycle_period = options.cycle_period,
            "Replay simulator ready"
        );
        Self {
            labels: dataset.labels(),
            dataset,
            state,
            options,
            rng,
            phase: SimulatorPhase::Ready,
        }
    }

    pub fn phase(&self) -> SimulatorPhase {
        self.phase
    }

    /// Read-only view of cursors and clock, for diagnostics
    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    pub fn dataset(&self) -> &HistoricalDataset {
        &self.dataset
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Label cycling mode is currently replaying
    pub fn active_cycle_label(&self) -> Option<Label> {
        self.labels.get(self.state.cycle_index()).copied()
    }

    /// Emit the next record. The clock advances by one second on success.
    pub fn advance(&mut self, mode: ReplayMode) -> Result<ReplayRecord, ReplayError> {
        if self.phase == SimulatorPhase::Stopped {
            return Err(ReplayError::Stopped);
        }
        if self.dataset.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }

        let index = match mode {
            ReplayMode::AllSequential => self.state.next_index(CursorKey::All, self.dataset.len()),
            ReplayMode::AllRandom => self.rng.gen_range(0..self.dataset.len()),
            ReplayMode::FilteredSequential(label) => self.pick_filtered(label, false),
            ReplayMode::FilteredRandom(label) => self.pick_filtered(label, true),
            ReplayMode::Cycling => {
                let position = self
                    .state
                    .rotate_cycle(self.options.cycle_period, self.labels.len());
                let label = self.labels[position];
                self.pick_filtered(label, self.options.shuffle)
            }
        };

        let reading = &self.dataset.rows()[index].reading;
        let timestamp = self.state.tick();
        self.phase = SimulatorPhase::Streaming;

        Ok(ReplayRecord {
            x: reading.x,
            y: reading.y,
            z: reading.z,
            eda: reading.eda,
            hr: reading.hr,
            temp: reading.temp,
            timestamp: timestamp.format(REPLAY_TIMESTAMP_FORMAT).to_string(),
        })
    }

    /// Row index among rows labeled `label`; an absent label falls back to the
    /// whole dataset while keeping the label's own cursor.
    fn pick_filtered(&mut self, label: Label, random: bool) -> usize {
        let indices = self.dataset.indices_for(label);
        if indices.is_empty() {
            debug!(%label, "No rows for label, replaying from the full dataset");
            let len = self.dataset.len();
            return if random {
                self.rng.gen_range(0..len)
            } else {
                self.state.next_index(CursorKey::Label(label), len)
            };
        }
        let position = if random {
            self.rng.gen_range(0..indices.len())
        } else {
            self.state.next_index(CursorKey::Label(label), indices.len())
        };
        indices[position]
    }

    /// Stop the stream; further advances fail until restarted
    pub fn stop(&mut self) {
        if self.phase != SimulatorPhase::Stopped {
            info!(advances = self.state.advances(), "Replay simulator stopped");
        }
        self.phase = SimulatorPhase::Stopped;
    }

    /// Rewind cursors and clock to their initial positions
    pub fn restart(&mut self) {
        self.state = ReplayState::new(initial_clock(&self.dataset));
        self.phase = SimulatorPhase::Ready;
        debug!(start = %self.state.clock(), "Replay simulator restarted");
    }

    /// Endless iterator over `mode`; ends only if the simulator is stopped or
    /// the dataset is empty
    pub fn stream(&mut self, mode: ReplayMode) -> ReplayStream<'_> {
        ReplayStream {
            simulator: self,
            mode,
        }
    }
}

pub struct ReplayStream<'a> {
    simulator: &'a mut ReplaySimulator,
    mode: ReplayMode,
}

impl Iterator for ReplayStream<'_> {
    type Item = ReplayRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.simulator.advance(self.mode).ok()
    }
}

/// First row's timestamp, or wall-clock time when absent or unparseable
fn initial_clock(dataset: &HistoricalDataset) -> NaiveDateTime {
    dataset.first_timestamp().unwrap_or_else(|| {
        warn!(
            rows = dataset.len(),
            "No parseable first timestamp in dataset, starting clock at current time"
        );
        Local::now().naive_local()
    })
}
