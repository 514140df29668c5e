use console::Term;
use gitsweep::{Cancellation, cancellation};

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C cancels in-flight sweeps, which stop at their next
/// suspension point and keep their checkpoint. A second one exits at once.
pub(crate) fn setup_shutdown_handler() -> Cancellation {
    let (handle, token) = cancellation();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stderr().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, stopping after the current page...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, stopping after the current page");
        }

        handle.cancel();

        // Wait for second Ctrl+C for force quit
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });

    token
}
