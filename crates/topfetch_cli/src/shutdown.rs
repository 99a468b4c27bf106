use console::Term;
use tokio::sync::oneshot;

/// Exit status used when the user interrupts the run.
pub(crate) const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Set up the Ctrl+C handler.
///
/// The returned receiver resolves on the first Ctrl+C so the caller can stop
/// the running command. A second Ctrl+C exits immediately.
pub(crate) fn setup_shutdown_handler() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, stopping...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, stopping");
        }

        let _ = tx.send(());

        // Wait for second Ctrl+C for force quit
        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    rx
}
