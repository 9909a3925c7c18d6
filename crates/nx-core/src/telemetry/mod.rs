//! Process-wide counters and histograms.
//!
//! Recording is compiled in only with the `telemetry` feature; without it
//! every call is a no-op and [`snapshot`] is empty. Log output goes through
//! `tracing` with the targets in [`tags`].

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub mod tags;

/// Histogram summary captured in telemetry snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// In-memory view of collected metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    /// Value of the counter `name`, if it was ever incremented.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Microseconds elapsed since `started_at`, clamped to `u64::MAX`.
#[inline]
pub fn elapsed_us(started_at: Instant) -> u64 {
    started_at.elapsed().as_micros().min(u64::MAX as u128) as u64
}

/// Adds `value` to the counter `name`. Compiles to nothing without the
/// `telemetry` feature.
#[inline]
pub fn increment_counter(name: &'static str, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::increment_counter(name, value);

    let _ = (name, value);
}

/// Records one sample for the histogram `name`.
#[inline]
pub fn record_histogram(name: &'static str, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::record_histogram(name, value);

    let _ = (name, value);
}

/// Copies every metric recorded since the last [`reset`].
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        registry::snapshot()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

/// Clears all counters and histograms.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::reset();
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, OnceLock};

    use super::{HistogramSnapshot, TelemetrySnapshot};
    use crate::core::lock_unpoisoned;

    #[derive(Debug, Clone, Copy, Default)]
    struct HistogramAggregate {
        count: u64,
        total: u64,
        min: u64,
        max: u64,
    }

    impl HistogramAggregate {
        fn record(&mut self, value: u64) {
            if self.count == 0 {
                self.min = value;
                self.max = value;
            } else {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }
            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }

        fn snapshot(&self) -> HistogramSnapshot {
            let mean = if self.count == 0 {
                0.0
            } else {
                self.total as f64 / self.count as f64
            };
            HistogramSnapshot {
                count: self.count,
                total: self.total,
                min: self.min,
                max: self.max,
                mean,
            }
        }
    }

    #[derive(Default)]
    struct Store {
        counters: Mutex<BTreeMap<&'static str, u64>>,
        histograms: Mutex<BTreeMap<&'static str, HistogramAggregate>>,
    }

    fn store() -> &'static Store {
        static STORE: OnceLock<Store> = OnceLock::new();
        STORE.get_or_init(Store::default)
    }

    pub(super) fn increment_counter(name: &'static str, value: u64) {
        let mut counters = lock_unpoisoned(&store().counters);
        let entry = counters.entry(name).or_insert(0);
        *entry = entry.saturating_add(value);
    }

    pub(super) fn record_histogram(name: &'static str, value: u64) {
        lock_unpoisoned(&store().histograms)
            .entry(name)
            .or_default()
            .record(value);
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        let counters = lock_unpoisoned(&store().counters)
            .iter()
            .map(|(name, value)| ((*name).to_owned(), *value))
            .collect();
        let histograms = lock_unpoisoned(&store().histograms)
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.snapshot()))
            .collect();

        TelemetrySnapshot {
            counters,
            histograms,
        }
    }

    pub(super) fn reset() {
        lock_unpoisoned(&store().counters).clear();
        lock_unpoisoned(&store().histograms).clear();
    }
}
