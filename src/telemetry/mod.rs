//! Tracker telemetry: a bounded event history plus a live broadcast feed.
//!
//! Everything the tracker does worth watching (accepted steps, calibration,
//! step-length refinement, rejected inputs, resets, queue pressure) goes
//! through [`TelemetryHub`]. Recording never fails and never blocks a caller
//! for longer than a short mutex hold.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::calibration::{FixOutcome, TrackerSnapshot};
use crate::config::AppConfig;
use crate::error::{ErrorCode, TrackerError};

pub mod events;

pub use events::MetricEvent;

const STEP_LENGTH_WINDOW: usize = 16;

/// Minimum change in queue occupancy, in percentage points, worth reporting.
const QUEUE_GAUGE_DEADBAND: f32 = 2.5;

static HUB: Lazy<TelemetryHub> = Lazy::new(|| {
    let settings = AppConfig::load().telemetry;
    TelemetryHub::new(
        settings.channel_capacity,
        settings.history_capacity,
        STEP_LENGTH_WINDOW,
    )
});

/// Process-wide hub used by the tracker manager and the debug server.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

// A panic while recording must not disable telemetry for the session.
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Fixed-size event ring; the oldest entry is evicted first.
struct History {
    events: VecDeque<MetricEvent>,
    capacity: usize,
    published: u64,
    evicted: u64,
}

impl History {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            published: 0,
            evicted: 0,
        }
    }

    fn push(&mut self, event: MetricEvent) {
        self.published += 1;
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    fn to_snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            recent: self.events.iter().cloned().collect(),
            total_events: self.published,
            dropped_events: self.evicted,
        }
    }
}

/// Fans events out to subscribers and keeps the most recent ones for polling.
pub struct TelemetryCollector {
    feed: broadcast::Sender<MetricEvent>,
    history: Mutex<History>,
}

impl TelemetryCollector {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            feed,
            history: Mutex::new(History::with_capacity(history_capacity)),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        guard(&self.history).push(event.clone());
        // No subscribers is the normal case outside the debug server.
        let _ = self.feed.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.feed.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        guard(&self.history).to_snapshot()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowStats {
    avg: f64,
    min: f64,
    max: f64,
    count: usize,
}

/// Sliding window over the step lengths measured between fixes.
struct StepLengthWindow {
    samples: VecDeque<f64>,
    size: usize,
}

impl StepLengthWindow {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            samples: VecDeque::with_capacity(size),
            size,
        }
    }

    fn add(&mut self, step_length_m: f64) -> WindowStats {
        while self.samples.len() >= self.size {
            self.samples.pop_front();
        }
        self.samples.push_back(step_length_m);

        let (sum, min, max) = self.samples.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), &sample| (sum + sample, min.min(sample), max.max(sample)),
        );
        let count = self.samples.len();
        WindowStats {
            avg: sum / count as f64,
            min,
            max,
            count,
        }
    }
}

pub struct TelemetryHub {
    collector: TelemetryCollector,
    step_lengths: Mutex<StepLengthWindow>,
    last_queue_levels: Mutex<HashMap<&'static str, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, step_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            step_lengths: Mutex::new(StepLengthWindow::new(step_window)),
            last_queue_levels: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_step(&self, snapshot: &TrackerSnapshot) {
        self.collector.publish(MetricEvent::StepApplied {
            session_steps: snapshot.session_steps,
            distance_m: snapshot.cumulative_distance_m,
            phase: snapshot.phase,
        });
    }

    pub fn record_calibration(&self, snapshot: &TrackerSnapshot) {
        self.collector.publish(MetricEvent::CalibrationCompleted {
            session_steps: snapshot.session_steps,
            step_length_m: snapshot.step_length_m,
            target_step_estimate: snapshot.target_step_estimate,
        });
    }

    /// Only fixes that produced a new step length are recorded.
    pub fn record_fix(&self, outcome: &FixOutcome) {
        let FixOutcome::Applied {
            displacement_m,
            steps_since_fix,
            refined_step_length_m: Some(step_length_m),
            ..
        } = *outcome
        else {
            return;
        };

        self.collector.publish(MetricEvent::StepLengthRefined {
            displacement_m,
            steps_since_fix,
            step_length_m,
        });

        let stats = guard(&self.step_lengths).add(step_length_m);
        self.collector.publish(MetricEvent::StepLengthStats {
            avg_m: stats.avg,
            min_m: stats.min,
            max_m: stats.max,
            sample_count: stats.count,
        });
    }

    pub fn record_rejection(&self, err: &TrackerError, context: impl Into<String>) {
        self.collector.publish(MetricEvent::InputRejected {
            code: err.code(),
            kind: err.kind(),
            context: context.into(),
        });
    }

    pub fn record_reset(&self) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        self.collector
            .publish(MetricEvent::SessionReset { timestamp_ms });
    }

    /// Report queue fill level, suppressing changes inside the deadband.
    pub fn record_queue_occupancy(&self, channel: &'static str, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        {
            let mut levels = guard(&self.last_queue_levels);
            if let Some(previous) = levels.get(channel) {
                if (previous - percent).abs() < QUEUE_GAUGE_DEADBAND {
                    return;
                }
            }
            levels.insert(channel, percent);
        }
        self.collector.publish(MetricEvent::QueueOccupancy {
            channel: channel.to_owned(),
            percent,
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, STEP_LENGTH_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationPhase;

    fn reset_at(timestamp_ms: u64) -> MetricEvent {
        MetricEvent::SessionReset { timestamp_ms }
    }

    fn refined(step_length: Option<f64>) -> FixOutcome {
        FixOutcome::Applied {
            displacement_m: 40.0,
            steps_since_fix: 50,
            refined_step_length_m: step_length,
            calibration_completed: false,
        }
    }

    #[test]
    fn history_evicts_oldest_and_counts_drops() {
        let collector = TelemetryCollector::new(8, 2);
        for ts in 1..=3 {
            collector.publish(reset_at(ts));
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent, vec![reset_at(2), reset_at(3)]);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
    }

    #[test]
    fn zero_capacity_history_still_keeps_latest() {
        let collector = TelemetryCollector::new(0, 0);
        collector.publish(reset_at(1));
        collector.publish(reset_at(2));

        assert_eq!(collector.snapshot().recent, vec![reset_at(2)]);
    }

    #[test]
    fn subscribers_see_events_live() {
        let collector = TelemetryCollector::default();
        let mut rx = collector.subscribe();
        collector.publish(reset_at(9));

        assert_eq!(rx.try_recv().unwrap(), reset_at(9));
    }

    #[test]
    fn window_stats_follow_sliding_window() {
        let mut window = StepLengthWindow::new(2);
        window.add(0.9);
        window.add(0.6);
        let stats = window.add(0.8);

        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 0.6);
        assert_eq!(stats.max, 0.8);
        assert!((stats.avg - 0.7).abs() < 1e-12);
    }

    #[test]
    fn refined_fix_publishes_length_then_stats() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_fix(&refined(Some(0.8)));

        let recent = hub.snapshot().recent;
        assert!(matches!(
            recent[0],
            MetricEvent::StepLengthRefined { steps_since_fix: 50, .. }
        ));
        assert!(matches!(
            recent[1],
            MetricEvent::StepLengthStats { sample_count: 1, .. }
        ));
    }

    #[test]
    fn baseline_and_unrefined_fixes_are_silent() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_fix(&FixOutcome::Baseline);
        hub.record_fix(&refined(None));

        assert_eq!(hub.snapshot().total_events, 0);
    }

    #[test]
    fn steps_and_rejections_keep_their_context() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_step(&TrackerSnapshot {
            session_steps: 10,
            phase: CalibrationPhase::Calibrating,
            step_length_m: 0.7,
            cumulative_distance_m: 7.0,
            target_step_estimate: None,
            calibration_anchor: 0,
            has_position_fix: false,
        });
        hub.record_rejection(&TrackerError::NegativeStepCount { raw: -1 }, "on_step_update");

        let recent = hub.snapshot().recent;
        assert!(matches!(
            recent[0],
            MetricEvent::StepApplied { session_steps: 10, phase: CalibrationPhase::Calibrating, .. }
        ));
        assert!(matches!(
            &recent[1],
            MetricEvent::InputRejected { code: 3001, context, .. } if context == "on_step_update"
        ));
    }

    #[test]
    fn queue_levels_inside_deadband_are_suppressed() {
        let hub = TelemetryHub::new(8, 8, 4);
        for percent in [10.0, 11.0, 12.4, 13.0, 130.0] {
            hub.record_queue_occupancy("commands", percent);
        }

        let reported: Vec<f32> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::QueueOccupancy { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec![10.0, 13.0, 100.0]);
    }
}
