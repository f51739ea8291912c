//! Loop telemetry: rolling throughput and processing-latency figures.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Samples retained in the rolling window
const WINDOW: usize = 100;

/// Minimum interval between published snapshot refreshes
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Published view of recent loop performance
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    /// Iterations per second over the rolling window
    pub fps: f64,
    /// Mean per-iteration processing time in milliseconds
    pub avg_processing_ms: f64,
}

/// Accumulates per-iteration timings and publishes a snapshot at most once
/// per second.
#[derive(Debug)]
pub struct Telemetry {
    iteration_starts: VecDeque<Instant>,
    processing: VecDeque<Duration>,
    snapshot: TelemetrySnapshot,
    last_refresh: Option<Instant>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            iteration_starts: VecDeque::with_capacity(WINDOW),
            processing: VecDeque::with_capacity(WINDOW),
            snapshot: TelemetrySnapshot::default(),
            last_refresh: None,
        }
    }

    /// Record one completed iteration that started at `start` and spent
    /// `processing` on actual work.
    pub fn record(&mut self, start: Instant, processing: Duration) {
        if self.iteration_starts.len() == WINDOW {
            self.iteration_starts.pop_front();
        }
        self.iteration_starts.push_back(start);

        if self.processing.len() == WINDOW {
            self.processing.pop_front();
        }
        self.processing.push_back(processing);

        let due = self
            .last_refresh
            .map(|t| t.elapsed() >= REFRESH_INTERVAL)
            .unwrap_or(true);
        if due {
            self.refresh();
            self.last_refresh = Some(Instant::now());
        }
    }

    /// Most recently published figures
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot
    }

    fn refresh(&mut self) {
        let n = self.iteration_starts.len();
        let fps = if n >= 2 {
            // Span between the oldest and newest start covers n-1 intervals
            let span = self.iteration_starts[n - 1]
                .duration_since(self.iteration_starts[0])
                .as_secs_f64();
            if span > 0.0 {
                (n - 1) as f64 / span
            } else {
                0.0
            }
        } else {
            0.0
        };

        let avg_processing_ms = if self.processing.is_empty() {
            0.0
        } else {
            let total: Duration = self.processing.iter().sum();
            total.as_secs_f64() * 1000.0 / self.processing.len() as f64
        };

        self.snapshot = TelemetrySnapshot {
            fps,
            avg_processing_ms,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_is_zero() {
        let telemetry = Telemetry::new();
        assert_eq!(telemetry.snapshot(), TelemetrySnapshot::default());
    }

    #[test]
    fn test_first_record_publishes_immediately() {
        let mut telemetry = Telemetry::new();
        telemetry.record(Instant::now(), Duration::from_millis(4));
        let snap = telemetry.snapshot();
        assert!((snap.avg_processing_ms - 4.0).abs() < 0.5);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut telemetry = Telemetry::new();
        let base = Instant::now();
        for i in 0..(WINDOW + 50) {
            telemetry.record(base + Duration::from_millis(i as u64), Duration::from_millis(2));
        }
        assert_eq!(telemetry.iteration_starts.len(), WINDOW);
        assert_eq!(telemetry.processing.len(), WINDOW);
    }

    #[test]
    fn test_fps_reflects_iteration_spacing() {
        let mut telemetry = Telemetry::new();
        let base = Instant::now();
        // 10 ms spacing: 100 iterations per second
        for i in 0..50 {
            telemetry.record(base + Duration::from_millis(i * 10), Duration::from_millis(1));
        }
        // Force a refresh past the rate limit
        telemetry.refresh();
        let snap = telemetry.snapshot();
        assert!((snap.fps - 100.0).abs() < 1.0, "fps was {}", snap.fps);
    }
}
