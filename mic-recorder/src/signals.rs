//! SIGINT/SIGTERM → cancellation bridge.
//!
//! The handler only flips an atomic flag; a watcher thread turns the flag
//! into `CancellationToken::cancel`, which is not async-signal-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use mic_recorder_core::cancel::CancellationToken;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

const WATCH_INTERVAL: Duration = Duration::from_millis(100);

extern "C" fn handle_shutdown(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_handlers() -> Result<(), String> {
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        unsafe {
            // SAFETY: handle_shutdown is an extern "C" signal handler with no side
            // effects beyond storing to an atomic, which is async-signal-safe.
            let handler = handle_shutdown as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                return Err(format!("failed to install {} handler", name));
            }
        }
    }
    Ok(())
}

/// Install the handlers and start the thread that cancels `token` once a
/// shutdown signal arrives. The thread exits when the token is cancelled.
pub fn install(token: &CancellationToken) -> Result<thread::JoinHandle<()>, String> {
    install_handlers()?;

    let token = token.clone();
    thread::Builder::new()
        .name("signal-watch".into())
        .spawn(move || loop {
            if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
                log::info!("Shutdown signal received. Finishing current chunk...");
                token.cancel();
                return;
            }
            if token.wait_timeout(WATCH_INTERVAL) {
                return;
            }
        })
        .map_err(|e| format!("failed to spawn signal watcher: {}", e))
}
