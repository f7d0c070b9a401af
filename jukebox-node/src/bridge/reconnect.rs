//! Fixed-backoff reconnection
//!
//! Shared by the pub/sub client and the slave's control client. Attempts are
//! bounded; once the budget is spent the caller reports `Disconnected` and
//! stops.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait between attempts
    pub interval: Duration,
    /// Attempts per outage (the first connect counts)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

/// Call `connect` until it succeeds, the budget runs out or `cancel` fires
///
/// Returns `None` in the last two cases.
pub async fn connect_with_retry<T, E, F, Fut>(
    link: &str,
    policy: ReconnectPolicy,
    cancel: &CancellationToken,
    mut connect: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            result = connect() => match result {
                Ok(connection) => {
                    if attempt > 1 {
                        info!(link, attempt, "Reconnected");
                    }
                    return Some(connection);
                }
                Err(e) => {
                    warn!(link, attempt, max_attempts = attempts, error = %e, "Connect attempt failed");
                }
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    warn!(link, "Giving up after {} attempts", attempts);
    None
}
