use serde::{Deserialize, Serialize};
use std::time::Duration;

const DAY_MS: u64 = 86_400_000;
const HOUR_MS: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Entries idle for longer than this are swept.
    pub ttl_days: u64,
    /// Opening a store sweeps when the last sweep is older than this.
    pub sweep_interval_hours: u64,
    /// Minimum similarity for fuzzy reads.
    pub read_threshold: f32,
    /// Repeater rows at or above this index are neither stored nor read.
    pub max_row_index: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_days: 90,
            sweep_interval_hours: 24,
            read_threshold: 0.8,
            max_row_index: 50,
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms())
    }

    pub(crate) fn ttl_ms(&self) -> u64 {
        self.ttl_days.saturating_mul(DAY_MS)
    }

    pub(crate) fn sweep_interval_ms(&self) -> u64 {
        self.sweep_interval_hours.saturating_mul(HOUR_MS)
    }
}
