//! The targeting loop: capture, segment, select, act.
//!
//! One iteration walks Idle → Capturing → Segmenting → Selecting →
//! (Acting | NoTarget) → Idle. The loop runs on a dedicated worker thread
//! and must never die: every per-iteration failure is logged, surfaced
//! through [`TrackerState`], and followed by a short sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;

use super::input::InputSource;
use super::render::OverlayRenderer;
use crate::actuator::{ActuatorDispatch, LogicalButton};
use crate::config::SharedConfig;
use crate::error::TrackerError;
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use crate::trajectory::{TrajectoryEngine, TrajectoryState};
use crate::vision::{
    self, merge_overlapping, CaptureRect, FrameSource, RegionSegmenter,
};

/// Sleep while the trigger is not held
const IDLE_SLEEP: Duration = Duration::from_millis(5);
/// Backoff after a failed capture or iteration error
const BACKOFF_SLEEP: Duration = Duration::from_millis(5);
/// Pacing between consecutive active iterations
const PACING_SLEEP: Duration = Duration::from_millis(1);
/// Interval between periodic stats log lines
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Externally visible status of the targeting loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Stopped,
    /// Running, trigger not held
    Idle,
    /// Running and actively iterating
    Tracking,
    /// Last iteration failed; the loop keeps running
    Error(String),
}

/// What one iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Trigger not held; annotations cleared, movement session reset
    Inactive,
    /// Frame source returned nothing this iteration
    CaptureMiss,
    /// Active but no region qualified
    NoTarget,
    /// Moved toward a target
    Acted,
}

/// Everything one iteration touches, owned by the worker thread
struct Pipeline {
    config: SharedConfig,
    source: Box<dyn FrameSource>,
    renderer: Box<dyn OverlayRenderer>,
    input: Box<dyn InputSource>,
    dispatch: Arc<ActuatorDispatch>,
    engine: TrajectoryEngine,
    movement: TrajectoryState,
    state: Arc<Mutex<TrackerState>>,
    telemetry: Arc<Mutex<Telemetry>>,
    last_stats: Instant,
}

impl Pipeline {
    fn run_iteration(&mut self) -> Result<IterationOutcome> {
        let cfg = self.config.read().clone();

        if !self.input.is_pressed(cfg.trigger.primary_key) {
            // Leaving the active phase ends the movement session
            self.movement.reset();
            if cfg.selector.annotate {
                self.renderer
                    .begin_frame(cfg.capture.region_width, cfg.capture.region_height);
                self.renderer.commit();
            }
            *self.state.lock() = TrackerState::Idle;
            return Ok(IterationOutcome::Inactive);
        }

        *self.state.lock() = TrackerState::Tracking;
        let started = Instant::now();

        let rect = CaptureRect::centered(
            cfg.capture.screen_width,
            cfg.capture.screen_height,
            cfg.capture.region_width,
            cfg.capture.region_height,
            cfg.capture.offset_x,
            cfg.capture.offset_y,
        );
        let Some(frame) = self.source.capture(rect) else {
            log::debug!("frame source returned nothing, skipping iteration");
            return Ok(IterationOutcome::CaptureMiss);
        };

        let segmenter = RegionSegmenter::from_config(&cfg.segmenter, cfg.capture.screen_height);
        let regions = merge_overlapping(segmenter.segment(&frame));

        let reference =
            vision::reference_point(frame.width, frame.height, cfg.selector.reference_offset_y);
        let target = vision::select_target(
            &regions,
            reference,
            cfg.selector.anchor_x,
            cfg.selector.anchor_y,
        );

        if cfg.selector.annotate {
            self.renderer.begin_frame(frame.width, frame.height);
            vision::annotate(self.renderer.as_mut(), &regions, target.as_ref(), reference);
            self.renderer.commit();
        }

        // Kinematics tunables may change between iterations
        if self.engine.config() != &cfg.trajectory {
            self.engine = TrajectoryEngine::new(cfg.trajectory.clone());
        }

        let outcome = match target {
            Some(target) => {
                let next = self.engine.step(
                    &mut self.movement,
                    reference,
                    target.anchor,
                    cfg.trajectory.sensitivity,
                );
                self.dispatch.move_relative(
                    cfg.actuator.backend,
                    next.x - reference.x,
                    next.y - reference.y,
                )?;

                if cfg.trigger.click_enabled && self.input.is_pressed(cfg.trigger.secondary_key) {
                    self.dispatch.click(
                        cfg.actuator.backend,
                        LogicalButton::Left,
                        Duration::from_millis(cfg.trigger.click_duration_ms),
                    )?;
                }
                IterationOutcome::Acted
            }
            None => {
                self.movement.reset();
                IterationOutcome::NoTarget
            }
        };

        if cfg.debug {
            let processing = started.elapsed();
            let mut telemetry = self.telemetry.lock();
            telemetry.record(started, processing);
            if self.last_stats.elapsed() >= STATS_INTERVAL {
                let snap = telemetry.snapshot();
                log::debug!(
                    "loop stats: {:.1} it/s, {:.2} ms avg processing",
                    snap.fps,
                    snap.avg_processing_ms
                );
                self.last_stats = Instant::now();
            }
        }

        Ok(outcome)
    }
}

/// Owns the worker thread running the targeting pipeline
pub struct TargetingLoop {
    config: SharedConfig,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<TrackerState>>,
    telemetry: Arc<Mutex<Telemetry>>,
    dispatch: Arc<ActuatorDispatch>,
    pipeline: Option<Pipeline>,
    worker: Option<JoinHandle<()>>,
}

impl TargetingLoop {
    pub fn new(
        config: SharedConfig,
        source: Box<dyn FrameSource>,
        renderer: Box<dyn OverlayRenderer>,
        input: Box<dyn InputSource>,
        dispatch: Arc<ActuatorDispatch>,
    ) -> Self {
        let state = Arc::new(Mutex::new(TrackerState::Stopped));
        let telemetry = Arc::new(Mutex::new(Telemetry::new()));
        let trajectory = config.read().trajectory.clone();

        let pipeline = Pipeline {
            config: Arc::clone(&config),
            source,
            renderer,
            input,
            dispatch: Arc::clone(&dispatch),
            engine: TrajectoryEngine::new(trajectory),
            movement: TrajectoryState::new(),
            state: Arc::clone(&state),
            telemetry: Arc::clone(&telemetry),
            last_stats: Instant::now(),
        };

        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            state,
            telemetry,
            dispatch,
            pipeline: Some(pipeline),
            worker: None,
        }
    }

    /// Spawn the worker thread. Fails if already running.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TrackerError::AlreadyRunning);
        }
        let Some(mut pipeline) = self.pipeline.take() else {
            self.running.store(false, Ordering::SeqCst);
            return Err(TrackerError::AlreadyRunning);
        };

        *self.state.lock() = TrackerState::Idle;
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);

        let worker = thread::Builder::new()
            .name("targeting-loop".to_string())
            .spawn(move || {
                // Best effort; the loop still runs at normal priority if
                // the platform refuses the request
                if let Err(e) = thread_priority::set_current_thread_priority(
                    thread_priority::ThreadPriority::Max,
                ) {
                    log::warn!("could not raise targeting loop priority: {e:?}");
                }
                log::info!("targeting loop started");
                while running.load(Ordering::SeqCst) {
                    let pause = match pipeline.run_iteration() {
                        Ok(IterationOutcome::Inactive) => IDLE_SLEEP,
                        Ok(IterationOutcome::CaptureMiss) => BACKOFF_SLEEP,
                        Ok(_) => PACING_SLEEP,
                        Err(e) => {
                            log::warn!("iteration failed: {e:#}");
                            *state.lock() = TrackerState::Error(format!("{e:#}"));
                            BACKOFF_SLEEP
                        }
                    };
                    thread::sleep(pause);
                }
                *state.lock() = TrackerState::Stopped;
                log::info!("targeting loop stopped");
            })?;

        self.worker = Some(worker);
        Ok(())
    }

    /// Signal the worker to stop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TrackerState {
        self.state.lock().clone()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.lock().snapshot()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The dispatcher shared with the loop, for button-state queries
    pub fn dispatch(&self) -> &Arc<ActuatorDispatch> {
        &self.dispatch
    }
}

impl Drop for TargetingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{Backend, PointerBackend, SerialTransport, TransportFactory};
    use crate::config::TrackerConfig;
    use crate::tracker::input::NullInput;
    use crate::tracker::render::NullRenderer;
    use crate::vision::Frame;
    use std::io;

    struct SolidSource {
        frame: Option<Frame>,
    }

    impl FrameSource for SolidSource {
        fn capture(&mut self, rect: CaptureRect) -> Option<Frame> {
            let _ = rect;
            self.frame.clone()
        }
    }

    struct HeldKey(u16);

    impl InputSource for HeldKey {
        fn is_pressed(&mut self, key: u16) -> bool {
            key == self.0
        }
    }

    #[derive(Default)]
    struct RecordingPointer {
        moves: Arc<Mutex<Vec<(i32, i32)>>>,
    }

    impl PointerBackend for RecordingPointer {
        fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
            self.moves.lock().push((dx, dy));
            Ok(())
        }
        fn set_button(&mut self, _button: LogicalButton, _pressed: bool) -> Result<()> {
            Ok(())
        }
        fn scroll(&mut self, _amount: i32) -> Result<()> {
            Ok(())
        }
    }

    struct NoPorts;

    impl TransportFactory for NoPorts {
        fn list_ports(&self) -> io::Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn open(
            &self,
            _port: &str,
            _baud: u32,
            _timeout: Duration,
        ) -> io::Result<Box<dyn SerialTransport>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no ports"))
        }
    }

    fn test_config() -> TrackerConfig {
        let mut cfg = TrackerConfig::default();
        cfg.capture.region_width = 200;
        cfg.capture.region_height = 200;
        cfg.actuator.backend = Backend::OsInjection;
        cfg
    }

    fn pipeline(
        frame: Option<Frame>,
        input: Box<dyn InputSource>,
        cfg: TrackerConfig,
    ) -> (Pipeline, Arc<Mutex<Vec<(i32, i32)>>>) {
        let moves = Arc::new(Mutex::new(Vec::new()));
        let pointer = RecordingPointer {
            moves: Arc::clone(&moves),
        };
        let dispatch = Arc::new(ActuatorDispatch::new(
            cfg.actuator.clone(),
            Box::new(pointer),
            Box::new(NoPorts),
        ));
        let config = cfg.shared();
        let trajectory = config.read().trajectory.clone();
        let state = Arc::new(Mutex::new(TrackerState::Stopped));
        let telemetry = Arc::new(Mutex::new(Telemetry::new()));

        let pipeline = Pipeline {
            config,
            source: Box::new(SolidSource { frame }),
            renderer: Box::new(NullRenderer),
            input,
            dispatch,
            engine: TrajectoryEngine::with_seed(trajectory, 7),
            movement: TrajectoryState::new(),
            state,
            telemetry,
            last_stats: Instant::now(),
        };
        (pipeline, moves)
    }

    fn magenta_frame() -> Frame {
        // Dark background with one saturated magenta blob off-center
        let mut frame = Frame::filled(200, 200, [0, 0, 0, 255]);
        frame.fill_rect(120, 60, 40, 40, [255, 0, 255, 255]);
        frame
    }

    #[test]
    fn test_inactive_without_trigger() {
        let (mut pipeline, moves) =
            pipeline(Some(magenta_frame()), Box::new(NullInput), test_config());
        let outcome = pipeline.run_iteration().unwrap();
        assert_eq!(outcome, IterationOutcome::Inactive);
        assert_eq!(*pipeline.state.lock(), TrackerState::Idle);
        assert!(moves.lock().is_empty());
    }

    #[test]
    fn test_capture_miss_is_not_an_error() {
        let cfg = test_config();
        let key = cfg.trigger.primary_key;
        let (mut pipeline, _) = pipeline(None, Box::new(HeldKey(key)), cfg);
        assert_eq!(
            pipeline.run_iteration().unwrap(),
            IterationOutcome::CaptureMiss
        );
    }

    #[test]
    fn test_no_target_on_blank_frame() {
        let cfg = test_config();
        let key = cfg.trigger.primary_key;
        let frame = Frame::filled(200, 200, [0, 0, 0, 255]);
        let (mut pipeline, moves) = pipeline(Some(frame), Box::new(HeldKey(key)), cfg);
        assert_eq!(
            pipeline.run_iteration().unwrap(),
            IterationOutcome::NoTarget
        );
        assert!(moves.lock().is_empty());
    }

    #[test]
    fn test_moves_toward_detected_blob() {
        let cfg = test_config();
        let key = cfg.trigger.primary_key;
        let (mut pipeline, moves) =
            pipeline(Some(magenta_frame()), Box::new(HeldKey(key)), cfg);

        assert_eq!(pipeline.run_iteration().unwrap(), IterationOutcome::Acted);

        let moves = moves.lock();
        assert_eq!(moves.len(), 1);
        let (dx, dy) = moves[0];
        // Blob sits up and to the right of the frame center
        assert!(dx > 0, "expected rightward movement, got {dx}");
        assert!(dy < 0, "expected upward movement, got {dy}");
    }

    #[test]
    fn test_start_twice_fails() {
        let cfg = test_config();
        let moves = Arc::new(Mutex::new(Vec::new()));
        let pointer = RecordingPointer {
            moves: Arc::clone(&moves),
        };
        let dispatch = Arc::new(ActuatorDispatch::new(
            cfg.actuator.clone(),
            Box::new(pointer),
            Box::new(NoPorts),
        ));
        let mut looper = TargetingLoop::new(
            cfg.shared(),
            Box::new(SolidSource { frame: None }),
            Box::new(NullRenderer),
            Box::new(NullInput),
            dispatch,
        );

        looper.start().unwrap();
        assert!(matches!(
            looper.start(),
            Err(TrackerError::AlreadyRunning)
        ));
        looper.stop();
        assert!(!looper.is_running());
        assert_eq!(looper.state(), TrackerState::Stopped);
    }
}
