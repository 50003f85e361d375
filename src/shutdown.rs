//! Translates operator signals into cooperative cancellation of every loop,
//! generalized from the reference crate's `TERM_FLAG` + `signal_hook`
//! registration in `lib.rs::register_signals`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long shutdown is allowed to take before the process
/// force-exits, mirroring the reference crate's stop-timeout watchdog in
/// `lib.rs::run` (`tasks::spawn0(... panic!("FORCE STOP") ...)`).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The two flags the signal handlers drive: `cancel` is what every
/// acquisition loop polls to know it should stop, `interrupted` is set only
/// by SIGINT specifically so the exit code can follow the shell convention
/// of 130 for an interactive interrupt, distinct from a managed SIGTERM.
pub struct SignalFlags {
    pub cancel: Arc<AtomicBool>,
    pub interrupted: Arc<AtomicBool>,
}

/// Registers SIGINT/SIGTERM handlers. Both signals flip `cancel`; only
/// SIGINT additionally flips `interrupted`.
pub fn install_signal_handlers() -> std::io::Result<SignalFlags> {
    let cancel = Arc::new(AtomicBool::new(false));
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&cancel))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&cancel))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))?;
    Ok(SignalFlags { cancel, interrupted })
}

/// Spawns the forced-exit watchdog: if shutdown has not completed within
/// `SHUTDOWN_GRACE` of being requested, the process is killed outright
/// rather than hang on a stuck blocking call. Mirrors the reference crate's
/// own "timeout has been reached, FORCE STOP" thread.
pub fn spawn_force_exit_watchdog(cancel: Arc<AtomicBool>) {
    std::thread::Builder::new()
        .name("shutdown-watchdog".to_string())
        .spawn(move || loop {
            if cancel.load(Ordering::SeqCst) {
                std::thread::sleep(SHUTDOWN_GRACE);
                log::error!("shutdown grace period exceeded, forcing exit");
                std::process::exit(130);
            }
            std::thread::sleep(Duration::from_millis(100));
        })
        .expect("failed to spawn shutdown watchdog");
}
