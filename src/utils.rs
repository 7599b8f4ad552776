use chrono::Utc;
use tokio::signal;
use tracing::{error, warn};

/// Current wall-clock time as Unix epoch seconds.
pub fn epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Current epoch seconds rendered as a decimal string, the format used in
/// every JSON error body.
pub fn epoch_seconds_string() -> String {
    epoch_seconds().to_string()
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed the corresponding branch never resolves,
/// so the server keeps running and can still be stopped by the other signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, draining connections");
        }
        _ = terminate => {
            warn!("Received SIGTERM, draining connections");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_seconds_string_is_numeric() {
        let s = epoch_seconds_string();
        assert!(s.parse::<i64>().is_ok());
        // Sanity: after 2020-01-01
        assert!(epoch_seconds() > 1_577_836_800);
    }
}
