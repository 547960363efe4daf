//! Periodic purge of expired sessions and revocation entries.
//!
//! Reads already ignore expired rows; this job reclaims the storage.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use warden_core::session::SessionManager;

/// Run the sweep loop every `every` until `cancel` is triggered.
pub async fn run(sessions: Arc<SessionManager>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Session sweep job started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweep job stopping");
                break;
            }
            _ = interval.tick() => {
                match sessions.sweep_expired().await {
                    Ok(report) => {
                        if report.sessions > 0 || report.revocations > 0 {
                            tracing::info!(
                                sessions = report.sessions,
                                revocations = report.revocations,
                                "Session sweep: purged expired rows"
                            );
                        } else {
                            tracing::debug!("Session sweep: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Session sweep: purge failed");
                    }
                }
            }
        }
    }
}
