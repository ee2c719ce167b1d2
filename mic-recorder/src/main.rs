//! mic-recorder: unattended segmented microphone recorder
//!
//! Mic → chunks → normalized 16-bit WAV segment → atomic rename
//!
//! Runs until SIGINT/SIGTERM. Capture and disk errors are retried forever;
//! only startup failures (bad config, unusable output directory) exit non-zero.

mod bootstrap;
mod config;
mod logging;
#[cfg(unix)]
mod signals;

use std::process::ExitCode;
use std::sync::Arc;

use mic_recorder_core::cancel::CancellationToken;
use mic_recorder_core::models::error::CaptureError;
use mic_recorder_core::session::supervisor::RecordingSupervisor;
use mic_recorder_core::traits::capture_backend::CaptureBackend;

use config::{BackendKind, ConfigSource};

fn build_backend(
    kind: BackendKind,
    cancel: &CancellationToken,
) -> Result<Arc<dyn CaptureBackend>, CaptureError> {
    match kind {
        BackendKind::Cpal => Ok(Arc::new(mic_recorder_backends::CpalBackend::new())),
        #[cfg(target_os = "linux")]
        BackendKind::Arecord => Ok(Arc::new(
            mic_recorder_backends::ArecordBackend::new().with_cancellation(cancel.clone()),
        )),
        #[cfg(not(target_os = "linux"))]
        BackendKind::Arecord => {
            let _ = cancel;
            Err(CaptureError::InvalidConfiguration(
                "the arecord backend is only available on Linux".into(),
            ))
        }
    }
}

fn main() -> ExitCode {
    let path = config::config_path();
    let (cfg, source) = match config::load_config(&path) {
        Ok(loaded) => loaded,
        Err(e) => {
            let _ = logging::init(None);
            log::error!("Cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(cfg.log_file.as_deref()) {
        log::warn!("{}; logging to stderr", e);
    }

    let version = env!("CARGO_PKG_VERSION");
    log::info!("─── mic-recorder v{} starting ───", version);
    match source {
        ConfigSource::File(p) => log::info!("Loaded config from {}", p.display()),
        ConfigSource::Defaults(p) => log::info!("No config at {}, using defaults", p.display()),
    }
    log::info!(
        "Config: backend={:?}, {} Hz, {} channel(s), output={}",
        cfg.backend,
        cfg.recorder.sample_rate,
        cfg.recorder.channels,
        cfg.recorder.output_directory.display()
    );

    if let Err(e) = bootstrap::prepare_output_directory(&cfg.recorder.output_directory) {
        log::error!("Cannot start: {}", e);
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();

    #[cfg(unix)]
    let watcher = match signals::install(&cancel) {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("Cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };
    #[cfg(not(unix))]
    {
        log::warn!("Signal handling unavailable on this platform; kill the process to stop.");
    }

    let backend = match build_backend(cfg.backend, &cancel) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("Cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut supervisor = match RecordingSupervisor::new(backend, cfg.recorder, cancel.clone()) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            log::error!("Cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = supervisor.run();

    // Release the watcher if the loop ended without a signal.
    cancel.cancel();
    #[cfg(unix)]
    let _ = watcher.join();

    log::info!(
        "─── mic-recorder stopped: {} segment(s) written, {} failed ───",
        report.segments_completed,
        report.segments_failed
    );
    ExitCode::SUCCESS
}
