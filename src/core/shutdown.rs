//! # Cross-platform OS signal handling.
//!
//! [`arm`] spawns a listener that cancels the supervisor's shutdown token
//! when the process receives a termination signal. The token is the single
//! shutdown trigger: OS signals and programmatic
//! [`Supervisor::request_shutdown`](crate::Supervisor::request_shutdown)
//! both cancel it, and cancelling an already-cancelled token is a no-op,
//! so repeated signals are harmless.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for hard stop)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use log::{error, info};
use tokio_util::sync::CancellationToken;

/// Spawns the signal listener. The caller guards against arming twice.
pub(crate) fn arm(token: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(()) => info!("termination signal received"),
            Err(err) => {
                // Without signal listeners only request_shutdown() can
                // stop the process; keep running rather than die here.
                error!("cannot register signal handlers: {err}");
                return;
            }
        }
        token.cancel();
    });
}

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
