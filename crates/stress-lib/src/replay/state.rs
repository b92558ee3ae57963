//! Mutable replay position: cursors and the synthetic clock
//!
//! Only the simulator that owns a `ReplayState` mutates it. Every mutation is a
//! read-modify-write, so a state shared between tasks must sit behind a single
//! lock around the whole advance.

use crate::models::Label;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

/// Which sequence a cursor walks: the whole dataset or one label's rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKey {
    All,
    Label(Label),
}

#[derive(Debug, Clone)]
pub struct ReplayState {
    cursors: HashMap<CursorKey, usize>,
    clock: NaiveDateTime,
    advances: u64,
    cycle_count: u64,
    cycle_index: usize,
}

impl ReplayState {
    pub fn new(clock: NaiveDateTime) -> Self {
        Self {
            cursors: HashMap::new(),
            clock,
            advances: 0,
            cycle_count: 0,
            cycle_index: 0,
        }
    }

    /// Next index the cursor will hand out (0 for an unused cursor)
    pub fn cursor(&self, key: CursorKey) -> usize {
        self.cursors.get(&key).copied().unwrap_or(0)
    }

    /// Timestamp the next advance will report
    pub fn clock(&self) -> NaiveDateTime {
        self.clock
    }

    /// Total advances since the state was created
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Position of the active label in the cycled label set
    pub fn cycle_index(&self) -> usize {
        self.cycle_index
    }

    /// Hand out the cursor's position within `len` and move it forward, wrapping
    pub(crate) fn next_index(&mut self, key: CursorKey, len: usize) -> usize {
        let cursor = self.cursors.entry(key).or_insert(0);
        let index = *cursor % len;
        *cursor = (index + 1) % len;
        index
    }

    /// Return the current synthetic time and move the clock one second on
    pub(crate) fn tick(&mut self) -> NaiveDateTime {
        let now = self.clock;
        self.clock = now + Duration::seconds(1);
        self.advances += 1;
        now
    }

    /// Count one cycling advance, rotating to the next label at each period
    /// boundary (including the very first call). Returns the active position.
    pub(crate) fn rotate_cycle(&mut self, period: u64, label_count: usize) -> usize {
        if label_count == 0 {
            return 0;
        }
        if self.cycle_count % period.max(1) == 0 {
            self.cycle_index = (self.cycle_index + 1) % label_count;
        }
        self.cycle_count += 1;
        self.cycle_index
    }
}
