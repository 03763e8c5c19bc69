//! Incremental per-source statistics.
//!
//! [`RunningStats`] accumulates aggregates in O(1) space: counters, an
//! incremental mean over processing times, min/max by comparison, and a
//! per-record-type tally. It never stores samples, so it stays cheap no
//! matter how long a source keeps reporting. Derived values that depend on
//! the wall clock (signals per hour) are recomputed at snapshot time.
//!
//! The accumulator is not synchronized; it lives inside a source's state
//! cell and is only mutated under that source's lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics snapshot for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatistics {
    /// When the source was first observed.
    pub first_seen: DateTime<Utc>,
    /// Events reported, including ignored and failed ones.
    pub total_events: u64,
    /// Events whose handler completed without error.
    pub processed_events: u64,
    /// Signal records emitted.
    pub total_signals: u64,
    /// Signals flagged successful.
    pub successful_signals: u64,
    /// Signals flagged failed.
    pub failed_signals: u64,
    /// Errors recorded for the source.
    pub error_count: u64,
    /// `successful_signals / total_signals`, over signals only.
    ///
    /// Reads 1.0 while no signal has been emitted yet: a source that has
    /// not produced anything is reported as healthy, not failing.
    pub success_rate: f64,
    /// Incremental mean over the combined event and signal samples, in
    /// milliseconds. Zero before the first sample.
    pub average_processing_ms: f64,
    /// Fastest observed processing time, absent before the first sample.
    pub min_processing_ms: Option<f64>,
    /// Slowest observed processing time, absent before the first sample.
    pub max_processing_ms: Option<f64>,
    /// Signals per hour of wall-clock time since `first_seen`, recomputed
    /// for each snapshot. Elapsed time is clamped to at least one second
    /// so fresh sources report a finite rate.
    pub signals_per_hour: f64,
    /// Mean confidence across signals that carried one.
    pub average_confidence: Option<f32>,
    /// Signal counts by record type.
    pub signals_by_type: HashMap<String, u64>,
}

/// Incremental statistics accumulator for one source.
#[derive(Debug, Clone)]
pub struct RunningStats {
    first_seen: DateTime<Utc>,
    total_events: u64,
    processed_events: u64,
    total_signals: u64,
    successful_signals: u64,
    failed_signals: u64,
    error_count: u64,
    samples: u64,
    mean_processing_ms: f64,
    min_processing_ms: Option<f64>,
    max_processing_ms: Option<f64>,
    confidence_sum: f64,
    confidence_samples: u64,
    signals_by_type: HashMap<String, u64>,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    /// Creates an empty accumulator. The current instant becomes the
    /// source's first observation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            first_seen: Utc::now(),
            total_events: 0,
            processed_events: 0,
            total_signals: 0,
            successful_signals: 0,
            failed_signals: 0,
            error_count: 0,
            samples: 0,
            mean_processing_ms: 0.0,
            min_processing_ms: None,
            max_processing_ms: None,
            confidence_sum: 0.0,
            confidence_samples: 0,
            signals_by_type: HashMap::new(),
        }
    }

    /// When the source was first observed.
    #[must_use]
    pub const fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    /// Records a processed event.
    ///
    /// `processed` marks whether the handler completed without error.
    /// Negative or non-finite processing times are clamped to zero.
    pub fn record_event(&mut self, processed: bool, processing_time_ms: f64) {
        self.total_events += 1;
        if processed {
            self.processed_events += 1;
        }
        self.observe_time(processing_time_ms);
    }

    /// Records an emitted signal.
    pub fn record_signal(
        &mut self,
        record_type: &str,
        success: bool,
        processing_time_ms: f64,
        confidence: Option<f32>,
    ) {
        self.total_signals += 1;
        if success {
            self.successful_signals += 1;
        } else {
            self.failed_signals += 1;
        }
        *self.signals_by_type.entry(record_type.to_string()).or_insert(0) += 1;
        if let Some(c) = confidence {
            if c.is_finite() {
                self.confidence_sum += f64::from(c.clamp(0.0, 1.0));
                self.confidence_samples += 1;
            }
        }
        self.observe_time(processing_time_ms);
    }

    /// Records an error attributed to the source.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Derives a [`SourceStatistics`] snapshot as of `now`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> SourceStatistics {
        let success_rate = if self.total_signals == 0 {
            1.0
        } else {
            self.successful_signals as f64 / self.total_signals as f64
        };

        let elapsed_secs =
            ((now - self.first_seen).num_milliseconds() as f64 / 1000.0).max(1.0);
        let signals_per_hour = self.total_signals as f64 / (elapsed_secs / 3600.0);

        let average_confidence = if self.confidence_samples == 0 {
            None
        } else {
            #[allow(clippy::cast_possible_truncation)]
            Some((self.confidence_sum / self.confidence_samples as f64) as f32)
        };

        SourceStatistics {
            first_seen: self.first_seen,
            total_events: self.total_events,
            processed_events: self.processed_events,
            total_signals: self.total_signals,
            successful_signals: self.successful_signals,
            failed_signals: self.failed_signals,
            error_count: self.error_count,
            success_rate,
            average_processing_ms: self.mean_processing_ms,
            min_processing_ms: self.min_processing_ms,
            max_processing_ms: self.max_processing_ms,
            signals_per_hour,
            average_confidence,
            signals_by_type: self.signals_by_type.clone(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe_time(&mut self, processing_time_ms: f64) {
        let time = if processing_time_ms.is_finite() {
            processing_time_ms.max(0.0)
        } else {
            0.0
        };

        self.samples += 1;
        self.mean_processing_ms += (time - self.mean_processing_ms) / self.samples as f64;
        self.min_processing_ms = Some(self.min_processing_ms.map_or(time, |m| m.min(time)));
        self.max_processing_ms = Some(self.max_processing_ms.map_or(time, |m| m.max(time)));
    }
}
