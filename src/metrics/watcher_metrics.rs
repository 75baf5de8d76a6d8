//! Watcher metrics tracking using OpenTelemetry.

use crate::core::PollOutcome;
use crate::store::Marker;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for watcher operations.
///
/// Counts poll ticks by outcome, marker read failures and manual triggers,
/// tracks the last seen marker, and times consumer reloads.
///
/// # Examples
///
/// ```rust,no_run
/// use storewatch::metrics::WatcherMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("storewatch");
/// let metrics = WatcherMetrics::new(meter);
///
/// let timer = metrics.start_reload();
/// // ... reload the view ...
/// metrics.record_reload_success(timer);
/// ```
#[derive(Clone)]
pub struct WatcherMetrics {
    polls: Counter<u64>,
    read_failures: Counter<u64>,
    changes_detected: Counter<u64>,
    signals: Counter<u64>,
    manual_triggers: Counter<u64>,
    last_seen_marker: Gauge<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
}

impl WatcherMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let polls = meter
            .u64_counter("storewatch.poll.ticks")
            .with_description("Number of poll ticks, labelled by outcome")
            .build();

        let read_failures = meter
            .u64_counter("storewatch.poll.read_failures")
            .with_description("Number of marker reads that failed")
            .build();

        let changes_detected = meter
            .u64_counter("storewatch.changes.detected")
            .with_description("Number of marker advances observed by the poll loop")
            .build();

        let signals = meter
            .u64_counter("storewatch.signals")
            .with_description("Reload signals, labelled by delivery (sent, coalesced)")
            .build();

        let manual_triggers = meter
            .u64_counter("storewatch.triggers.manual")
            .with_description("Number of manual reload triggers")
            .build();

        let last_seen_marker = meter
            .u64_gauge("storewatch.marker.last_seen")
            .with_description("Last modification marker observed by the watcher")
            .build();

        let reload_failures = meter
            .u64_counter("storewatch.reload.failures")
            .with_description("Number of consumer reloads that failed")
            .build();

        let reload_duration = meter
            .f64_histogram("storewatch.reload.duration")
            .with_description("Duration of consumer reloads in seconds")
            .with_unit("s")
            .build();

        Self {
            polls,
            read_failures,
            changes_detected,
            signals,
            manual_triggers,
            last_seen_marker,
            reload_failures,
            reload_duration,
        }
    }

    /// Record the outcome of one poll tick.
    pub fn record_poll(&self, outcome: PollOutcome) {
        self.polls
            .add(1, &[KeyValue::new("outcome", outcome.as_str())]);

        match outcome {
            PollOutcome::ReadFailed => self.read_failures.add(1, &[]),
            PollOutcome::Suppressed => self.changes_detected.add(1, &[]),
            PollOutcome::Signaled | PollOutcome::Coalesced => {
                self.changes_detected.add(1, &[]);
                self.record_signal(outcome);
            }
            PollOutcome::Unchanged | PollOutcome::NotStarted | PollOutcome::Closed => {}
        }
    }

    /// Record a manual reload trigger and how its signal was delivered.
    pub fn record_trigger(&self, outcome: PollOutcome) {
        self.manual_triggers.add(1, &[]);
        self.record_signal(outcome);
    }

    /// Record the marker the watcher now considers seen.
    pub fn record_marker(&self, marker: Marker) {
        self.last_seen_marker.record(marker.value(), &[]);
    }

    /// Start a consumer reload timer.
    pub fn start_reload(&self) -> Instant {
        Instant::now()
    }

    /// Record a successful consumer reload.
    pub fn record_reload_success(&self, start: Instant) {
        self.reload_duration
            .record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a failed consumer reload.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration
            .record(start.elapsed().as_secs_f64(), &[]);
    }

    fn record_signal(&self, outcome: PollOutcome) {
        let delivery = match outcome {
            PollOutcome::Signaled => "sent",
            PollOutcome::Coalesced => "coalesced",
            _ => return,
        };
        self.signals.add(1, &[KeyValue::new("delivery", delivery)]);
    }
}
