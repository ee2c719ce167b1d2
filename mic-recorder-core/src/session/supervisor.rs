use std::sync::Arc;

use chrono::Local;

use crate::cancel::CancellationToken;
use crate::device::selector::{select_device, SelectionPolicy};
use crate::models::config::{RecorderConfig, BYTES_PER_SAMPLE};
use crate::models::error::CaptureError;
use crate::models::segment::Segment;
use crate::models::state::{BackoffReason, SupervisorPhase, SupervisorState};
use crate::recorder::chunked::ChunkedSegmentRecorder;
use crate::storage::disk_guard::DiskSpaceGuard;
use crate::traits::capture_backend::CaptureBackend;
use crate::traits::supervisor_delegate::SupervisorDelegate;

/// Totals returned when the supervisor shuts down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub segments_completed: u64,
    pub segments_failed: u64,
}

/// Top-level recording loop.
///
/// Drives device discovery, disk admission, segment recording and backoff
/// until the cancellation token fires. Cancellation is checked on every
/// phase entry, and every wait is interruptible.
///
/// ```text
/// [Selector] → [DiskSpaceGuard] → [ChunkedSegmentRecorder] → [SegmentWriter]
///      ↑                                      │ failure
///      └───────── rediscover ◄────────────────┘
/// ```
pub struct RecordingSupervisor {
    backend: Arc<dyn CaptureBackend>,
    config: RecorderConfig,
    policy: SelectionPolicy,
    guard: DiskSpaceGuard,
    recorder: ChunkedSegmentRecorder,
    state: SupervisorState,
    phase: SupervisorPhase,
    rediscovering_after_failure: bool,
    delegate: Option<Arc<dyn SupervisorDelegate>>,
    report: SupervisorReport,
}

impl RecordingSupervisor {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        config: RecorderConfig,
        cancel: CancellationToken,
    ) -> Result<Self, CaptureError> {
        config
            .validate()
            .map_err(CaptureError::InvalidConfiguration)?;

        let recorder =
            ChunkedSegmentRecorder::from_config(Arc::clone(&backend), &config, cancel.clone());
        Ok(Self {
            policy: SelectionPolicy::new(config.preferred_device.clone()),
            guard: DiskSpaceGuard::system(),
            recorder,
            state: SupervisorState::new(cancel),
            phase: SupervisorPhase::Startup,
            rediscovering_after_failure: false,
            delegate: None,
            report: SupervisorReport::default(),
            backend,
            config,
        })
    }

    /// Replace the free-space source (the default queries the filesystem).
    pub fn with_disk_guard(mut self, guard: DiskSpaceGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SupervisorDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Run until cancelled. Never returns early on capture or disk errors.
    pub fn run(&mut self) -> SupervisorReport {
        let mut next = SupervisorPhase::Startup;
        loop {
            if self.state.cancel_requested() {
                next = SupervisorPhase::Shutdown;
            }
            self.enter(next);

            next = match next {
                SupervisorPhase::Startup => {
                    log::info!(
                        "Recording supervisor starting. Output: {}, segment: {:.0}s, chunk: {:.0}s",
                        self.config.output_directory.display(),
                        self.config.segment_duration_secs,
                        self.config.chunk_duration_secs
                    );
                    SupervisorPhase::DiscoveringDevice
                }
                SupervisorPhase::DiscoveringDevice => self.discover(),
                SupervisorPhase::AdmissionCheck => self.admission_check(),
                SupervisorPhase::Recording => self.record_next_segment(),
                SupervisorPhase::BackoffShort | SupervisorPhase::BackoffLong => self.back_off(),
                SupervisorPhase::Shutdown => break,
            };
        }

        self.shutdown();
        self.report.clone()
    }

    fn enter(&mut self, phase: SupervisorPhase) {
        if phase != self.phase {
            log::debug!("Supervisor: {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;
        if let Some(ref delegate) = self.delegate {
            delegate.on_phase_changed(phase);
        }
    }

    fn discover(&mut self) -> SupervisorPhase {
        let device = select_device(self.backend.as_ref(), &self.policy);
        match device {
            Some(ref d) => log::info!("Using input device {}", d),
            None => log::error!("No suitable input device found."),
        }
        self.state.current_device = device;

        if std::mem::take(&mut self.rediscovering_after_failure) {
            let failures = self.state.consecutive_failures;
            if failures >= self.config.max_consecutive_failures {
                log::error!(
                    "{} consecutive segment failures. Pausing for {:.0}s before resetting.",
                    failures,
                    self.config.long_pause_secs
                );
                return self.schedule_backoff(BackoffReason::PersistentFailures);
            }
            return self.schedule_backoff(BackoffReason::SegmentFailed);
        }

        if self.state.current_device.is_some() {
            SupervisorPhase::AdmissionCheck
        } else {
            self.schedule_backoff(BackoffReason::NoDevice)
        }
    }

    fn admission_check(&mut self) -> SupervisorPhase {
        if self.state.current_device.is_none() {
            return SupervisorPhase::DiscoveringDevice;
        }

        let check = self.guard.check(
            &self.config.output_directory,
            self.config.segment_duration(),
            self.config.sample_rate,
            self.config.channels,
            BYTES_PER_SAMPLE,
            self.config.min_free_space_bytes(),
        );
        if check.admits() {
            SupervisorPhase::Recording
        } else {
            self.schedule_backoff(BackoffReason::DiskSpaceLow)
        }
    }

    fn record_next_segment(&mut self) -> SupervisorPhase {
        let Some(device) = self.state.current_device.clone() else {
            return SupervisorPhase::DiscoveringDevice;
        };

        let segment = Segment::new(
            &self.config.output_directory,
            self.config.segment_duration(),
            Local::now(),
        );
        let outcome = self.recorder.record(segment, &device);

        match outcome {
            Ok(result) => {
                self.state.consecutive_failures = 0;
                self.report.segments_completed += 1;
                if let Some(ref delegate) = self.delegate {
                    delegate.on_segment_finished(&result);
                }
                SupervisorPhase::AdmissionCheck
            }
            Err(_) if self.state.cancel_requested() => {
                log::info!("Segment abandoned during shutdown.");
                SupervisorPhase::Shutdown
            }
            Err(e) => {
                self.state.consecutive_failures += 1;
                self.report.segments_failed += 1;
                log::error!(
                    "Segment failed on {}: {} (consecutive failures: {})",
                    device,
                    e,
                    self.state.consecutive_failures
                );
                if let Some(ref delegate) = self.delegate {
                    delegate.on_segment_failed(&e, self.state.consecutive_failures);
                }
                self.rediscovering_after_failure = true;
                SupervisorPhase::DiscoveringDevice
            }
        }
    }

    fn schedule_backoff(&mut self, reason: BackoffReason) -> SupervisorPhase {
        let delay = match reason {
            BackoffReason::NoDevice | BackoffReason::SegmentFailed => self.config.retry_delay(),
            BackoffReason::DiskSpaceLow => self.config.disk_check_interval(),
            BackoffReason::PersistentFailures => self.config.long_pause(),
        };
        self.state.pending_backoff = Some((reason, delay));
        reason.phase()
    }

    fn back_off(&mut self) -> SupervisorPhase {
        let Some((reason, delay)) = self.state.pending_backoff.take() else {
            return SupervisorPhase::DiscoveringDevice;
        };

        log::info!("Waiting {:.1}s ({:?})", delay.as_secs_f64(), reason);
        if self.state.cancel.wait_timeout(delay) {
            return SupervisorPhase::Shutdown;
        }

        match reason {
            BackoffReason::NoDevice => SupervisorPhase::DiscoveringDevice,
            BackoffReason::DiskSpaceLow => SupervisorPhase::AdmissionCheck,
            BackoffReason::PersistentFailures => {
                self.state.consecutive_failures = 0;
                self.after_failure_pause()
            }
            BackoffReason::SegmentFailed => self.after_failure_pause(),
        }
    }

    fn after_failure_pause(&self) -> SupervisorPhase {
        if self.state.current_device.is_some() {
            SupervisorPhase::AdmissionCheck
        } else {
            SupervisorPhase::DiscoveringDevice
        }
    }

    fn shutdown(&mut self) {
        self.state.current_device = None;
        self.state.pending_backoff = None;
        log::info!(
            "Recording supervisor stopped. Segments completed: {}, failed: {}",
            self.report.segments_completed,
            self.report.segments_failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use crate::models::segment::RecordingResult;
    use crate::test_support::{device, FixedFreeSpace, MockBackend};

    type StopWhen = Box<dyn Fn(&EventLog) -> bool + Send + Sync>;

    #[derive(Default)]
    struct EventLog {
        phases: Vec<SupervisorPhase>,
        failures: Vec<u32>,
        finished: Vec<RecordingResult>,
    }

    /// Records every callback and cancels once `stop_when` holds.
    struct Recorder {
        log: Mutex<EventLog>,
        cancel: CancellationToken,
        stop_when: StopWhen,
    }

    impl Recorder {
        fn new<F>(cancel: &CancellationToken, stop_when: F) -> Arc<Self>
        where
            F: Fn(&EventLog) -> bool + Send + Sync + 'static,
        {
            Arc::new(Self {
                log: Mutex::new(EventLog::default()),
                cancel: cancel.clone(),
                stop_when: Box::new(stop_when),
            })
        }

        fn after<F: FnOnce(&mut EventLog)>(&self, update: F) {
            let mut log = self.log.lock();
            update(&mut log);
            if (self.stop_when)(&log) {
                self.cancel.cancel();
            }
        }

        fn phases(&self) -> Vec<SupervisorPhase> {
            self.log.lock().phases.clone()
        }
    }

    impl SupervisorDelegate for Recorder {
        fn on_phase_changed(&self, phase: SupervisorPhase) {
            self.after(|log| log.phases.push(phase));
        }

        fn on_segment_finished(&self, result: &RecordingResult) {
            self.after(|log| log.finished.push(result.clone()));
        }

        fn on_segment_failed(&self, _error: &CaptureError, consecutive_failures: u32) {
            self.after(|log| log.failures.push(consecutive_failures));
        }
    }

    fn config(dir: &Path) -> RecorderConfig {
        RecorderConfig {
            sample_rate: 100,
            channels: 1,
            output_directory: dir.to_path_buf(),
            segment_duration_secs: 0.2,
            chunk_duration_secs: 0.1,
            retry_delay_secs: 0.0,
            disk_check_interval_secs: 0.0,
            long_pause_secs: 0.0,
            max_consecutive_failures: 5,
            ..RecorderConfig::default()
        }
    }

    fn plenty_of_space() -> DiskSpaceGuard {
        DiskSpaceGuard::new(Box::new(FixedFreeSpace(Ok(u64::MAX))))
    }

    fn supervisor(
        backend: &MockBackend,
        config: RecorderConfig,
        cancel: &CancellationToken,
    ) -> RecordingSupervisor {
        RecordingSupervisor::new(Arc::new(backend.clone()), config, cancel.clone())
            .unwrap()
            .with_disk_guard(plenty_of_space())
    }

    fn count(phases: &[SupervisorPhase], phase: SupervisorPhase) -> usize {
        phases.iter().filter(|p| **p == phase).count()
    }

    #[test]
    fn records_consecutive_segments_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]);
        let events = Recorder::new(&cancel, |log| log.finished.len() == 3);

        let mut sup = supervisor(&backend, config(dir.path()), &cancel);
        sup.set_delegate(events.clone());
        let report = sup.run();

        assert_eq!(
            report,
            SupervisorReport {
                segments_completed: 3,
                segments_failed: 0
            }
        );
        let log = events.log.lock();
        let complete = |r: &RecordingResult| r.file_path.exists() && !r.is_partial();
        assert!(log.finished.iter().all(complete));
        assert_eq!(
            &log.phases[..5],
            &[
                SupervisorPhase::Startup,
                SupervisorPhase::DiscoveringDevice,
                SupervisorPhase::AdmissionCheck,
                SupervisorPhase::Recording,
                SupervisorPhase::AdmissionCheck,
            ]
        );
        // device is discovered once and reused
        assert_eq!(count(&log.phases, SupervisorPhase::DiscoveringDevice), 1);
        assert_eq!(log.phases.last(), Some(&SupervisorPhase::Shutdown));
        assert_eq!(sup.phase(), SupervisorPhase::Shutdown);
    }

    #[test]
    fn long_pause_after_repeated_failures_then_counter_resets() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]).failing_read(0);
        let events = Recorder::new(&cancel, |log| log.failures.len() == 6);

        let mut sup = supervisor(&backend, config(dir.path()), &cancel);
        sup.set_delegate(events.clone());
        let report = sup.run();

        assert_eq!(report.segments_failed, 6);
        assert_eq!(report.segments_completed, 0);

        let log = events.log.lock();
        assert_eq!(log.failures, vec![1, 2, 3, 4, 5, 1]);

        let long: Vec<usize> = log
            .phases
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == SupervisorPhase::BackoffLong)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(long.len(), 1);
        let before_pause = &log.phases[..long[0]];
        assert_eq!(count(before_pause, SupervisorPhase::Recording), 5);
        assert_eq!(count(before_pause, SupervisorPhase::BackoffShort), 4);

        // every failure triggers rediscovery
        assert_eq!(count(&log.phases, SupervisorPhase::DiscoveringDevice), 6);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn waits_for_device_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(Vec::new());

        let plug_in = backend.clone();
        let events = Recorder::new(&cancel, move |log| {
            if count(&log.phases, SupervisorPhase::BackoffShort) == 2 {
                plug_in.set_devices(vec![device(3, "Late Mic", 1)]);
            }
            !log.finished.is_empty()
        });

        let mut sup = supervisor(&backend, config(dir.path()), &cancel);
        sup.set_delegate(events.clone());
        let report = sup.run();

        assert_eq!(report.segments_completed, 1);
        assert_eq!(
            &events.phases()[..7],
            &[
                SupervisorPhase::Startup,
                SupervisorPhase::DiscoveringDevice,
                SupervisorPhase::BackoffShort,
                SupervisorPhase::DiscoveringDevice,
                SupervisorPhase::BackoffShort,
                SupervisorPhase::DiscoveringDevice,
                SupervisorPhase::AdmissionCheck,
            ]
        );
    }

    #[test]
    fn low_disk_space_pauses_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]);
        let events = Recorder::new(&cancel, |log| {
            count(&log.phases, SupervisorPhase::BackoffLong) == 3
        });

        let full = DiskSpaceGuard::new(Box::new(FixedFreeSpace(Ok(1024))));
        let mut sup = supervisor(&backend, config(dir.path()), &cancel).with_disk_guard(full);
        sup.set_delegate(events.clone());
        sup.run();

        let phases = events.phases();
        assert_eq!(count(&phases, SupervisorPhase::Recording), 0);
        assert_eq!(count(&phases, SupervisorPhase::DiscoveringDevice), 1);
        assert_eq!(count(&phases, SupervisorPhase::AdmissionCheck), 3);
        assert_eq!(backend.streams_opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disk_query_failure_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]);
        let events = Recorder::new(&cancel, |log| !log.finished.is_empty());

        let query_error = CaptureError::DiskSpaceQuery("statvfs failed".into());
        let unknown = DiskSpaceGuard::new(Box::new(FixedFreeSpace(Err(query_error))));
        let mut sup = supervisor(&backend, config(dir.path()), &cancel).with_disk_guard(unknown);
        sup.set_delegate(events.clone());

        assert_eq!(sup.run().segments_completed, 1);
    }

    #[test]
    fn success_resets_failure_counter() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]).failing_open();

        let recovering = backend.clone();
        let events = Recorder::new(&cancel, move |log| {
            if log.failures.len() == 2 {
                recovering.set_open_error(None);
            }
            log.finished.len() == 1
        });

        let mut sup = supervisor(&backend, config(dir.path()), &cancel);
        sup.set_delegate(events.clone());
        let report = sup.run();

        assert_eq!(report.segments_failed, 2);
        assert_eq!(report.segments_completed, 1);
        assert_eq!(sup.state().consecutive_failures, 0);
    }

    #[test]
    fn cancel_before_run_shuts_down_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]);
        let events = Recorder::new(&cancel, |_| false);

        let mut sup = supervisor(&backend, config(dir.path()), &cancel);
        sup.set_delegate(events.clone());

        assert_eq!(sup.run(), SupervisorReport::default());
        assert_eq!(events.phases(), vec![SupervisorPhase::Shutdown]);
        assert_eq!(backend.streams_opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancellation_interrupts_long_pause() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let backend = MockBackend::new(vec![device(0, "USB Mic", 1)]).failing_read(0);
        let cfg = RecorderConfig {
            max_consecutive_failures: 1,
            long_pause_secs: 600.0,
            ..config(dir.path())
        };

        let canceller = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let started = Instant::now();
        let report = supervisor(&backend, cfg, &cancel).run();
        handle.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(report.segments_completed, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(Vec::new());
        let cfg = RecorderConfig {
            max_consecutive_failures: 0,
            ..config(dir.path())
        };
        let result = RecordingSupervisor::new(Arc::new(backend), cfg, CancellationToken::new());
        assert!(matches!(result, Err(CaptureError::InvalidConfiguration(_))));
    }
}
