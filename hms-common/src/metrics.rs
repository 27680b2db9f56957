//! Process-wide processing metrics
//!
//! [`MetricsRecorder`] is created once at startup and injected (behind an
//! `Arc`) into every component that records outcomes. All mutations go through
//! one internal lock so a [`MetricsState`] snapshot is always consistent.

use crate::evidence::SourceIdentity;
use crate::webhook::EventType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Latency samples kept for the rolling average
pub const LATENCY_WINDOW: usize = 1000;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsState {
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    /// Fraction of finished events that succeeded (0.0 before any event)
    pub success_rate: f64,
    pub average_processing_time_seconds: f64,
    pub events_by_type: BTreeMap<String, u64>,
    pub events_by_source: BTreeMap<String, u64>,
    /// Start of the current counting period (process start or last reset)
    pub since: DateTime<Utc>,
}

#[derive(Debug)]
struct Counters {
    total_processed: u64,
    total_failed: u64,
    total_retries: u64,
    events_by_type: BTreeMap<String, u64>,
    events_by_source: BTreeMap<String, u64>,
    latencies: VecDeque<Duration>,
    since: DateTime<Utc>,
}

impl Counters {
    fn new() -> Self {
        Self {
            total_processed: 0,
            total_failed: 0,
            total_retries: 0,
            events_by_type: EventType::ALL
                .iter()
                .map(|t| (t.as_str().to_string(), 0))
                .collect(),
            events_by_source: BTreeMap::new(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            since: Utc::now(),
        }
    }

    fn count_event(&mut self, event_type: EventType, origin: &SourceIdentity) {
        *self.events_by_type.entry(event_type.as_str().to_string()).or_insert(0) += 1;
        *self.events_by_source.entry(origin.as_str().to_string()).or_insert(0) += 1;
    }
}

/// Concurrency-safe counter aggregate
#[derive(Debug)]
pub struct MetricsRecorder {
    inner: Mutex<Counters>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::new()),
        }
    }

    // Counters stay meaningful after a panic elsewhere; keep serving them
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Event processed successfully; `elapsed` spans all attempts
    pub fn record_success(&self, elapsed: Duration, event_type: EventType, origin: &SourceIdentity) {
        let mut counters = self.lock();
        counters.total_processed += 1;
        counters.count_event(event_type, origin);
        if counters.latencies.len() == LATENCY_WINDOW {
            counters.latencies.pop_front();
        }
        counters.latencies.push_back(elapsed);
    }

    /// Event ended in permanent failure
    pub fn record_failure(&self, event_type: EventType, origin: &SourceIdentity) {
        let mut counters = self.lock();
        counters.total_failed += 1;
        counters.count_event(event_type, origin);
    }

    /// One retry scheduled
    pub fn record_retry(&self) {
        self.lock().total_retries += 1;
    }

    pub fn snapshot(&self) -> MetricsState {
        let counters = self.lock();
        let finished = counters.total_processed + counters.total_failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            counters.total_processed as f64 / finished as f64
        };
        let average_processing_time_seconds = if counters.latencies.is_empty() {
            0.0
        } else {
            let total: f64 = counters.latencies.iter().map(Duration::as_secs_f64).sum();
            round_to(total / counters.latencies.len() as f64, 3)
        };

        MetricsState {
            total_processed: counters.total_processed,
            total_failed: counters.total_failed,
            total_retries: counters.total_retries,
            success_rate,
            average_processing_time_seconds,
            events_by_type: counters.events_by_type.clone(),
            events_by_source: counters.events_by_source.clone(),
            since: counters.since,
        }
    }

    /// Explicit admin reset; starts a new counting period
    pub fn reset(&self) {
        *self.lock() = Counters::new();
        tracing::info!("Processing metrics reset");
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
