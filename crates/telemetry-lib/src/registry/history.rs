//! Bounded per-device reading history
//!
//! Keeps the most recent readings for a device across all of its sensors,
//! evicting the oldest entries first once capacity is reached.

use crate::models::Reading;
use std::collections::VecDeque;

/// Default number of readings retained per device
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// FIFO history of readings for a single device
#[derive(Debug, Clone)]
pub struct ReadingHistory {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl ReadingHistory {
    /// Create a history holding at most `capacity` readings (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append a reading, evicting from the front when full
    pub fn push(&mut self, reading: Reading) {
        while self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// Values of the most recent `n` readings for one sensor, oldest first
    pub fn recent_values(&self, sensor_id: &str, n: usize) -> Vec<f64> {
        let mut values: Vec<f64> = self
            .readings
            .iter()
            .rev()
            .filter(|r| r.sensor_id() == sensor_id)
            .take(n)
            .map(|r| r.value)
            .collect();
        values.reverse();
        values
    }

    /// The most recent readings, oldest first. `None` returns everything.
    pub fn latest(&self, limit: Option<usize>) -> Vec<Reading> {
        let skip = limit
            .map(|l| self.readings.len().saturating_sub(l))
            .unwrap_or(0);
        self.readings.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReadingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
