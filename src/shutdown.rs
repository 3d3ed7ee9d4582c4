//! Signal handling for a running batch

use tokio_util::sync::CancellationToken;

/// Install a handler for SIGTERM and SIGINT (Ctrl-C elsewhere).
///
/// Returns a `CancellationToken` that is cancelled when a signal arrives.
/// Must be called from inside a tokio runtime.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if wait_for_signal().await {
            token_clone.cancel();
        }
    });

    token
}

/// Resolves `true` once a shutdown signal is received, `false` if no handler
/// could be installed.
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Failed to install signal handlers, interrupts will not be graceful");
            return false;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::warn!("Received SIGTERM, stopping running predictions");
        }
        _ = sigint.recv() => {
            tracing::warn!("Received SIGINT, stopping running predictions");
        }
    }
    true
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Received Ctrl-C, stopping running predictions");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler, interrupts will not be graceful");
            false
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_starts_uncancelled() {
        let token = install_shutdown_handler();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());
    }
}
