//! Background cleanup job for expired sessions and idle session locks.
//!
//! The memory store only forgets an expired record when something reads it,
//! and the per-session lock table grows with every session id ever seen.
//! This job periodically sweeps both.

use crate::auth::service::AuthService;
use std::sync::Arc;
use std::time::Duration;

/// Run the cleanup loop.
///
/// Sweeps every `interval`. A failed pass is logged and retried on the next
/// tick.
pub async fn run_cleanup_loop(auth: Arc<AuthService>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match auth.cleanup().await {
            Ok(stats) if stats.sessions_purged > 0 || stats.locks_pruned > 0 => {
                tracing::info!(
                    sessions_purged = stats.sessions_purged,
                    locks_pruned = stats.locks_pruned,
                    "Cleanup job completed"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Cleanup job failed"),
        }
    }
}
