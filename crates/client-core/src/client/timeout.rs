//! Timeouts for negotiation steps
//!
//! Rendezvous round trips can hang when the remote side never answers. Steps
//! are bounded here and a timeout is reported as an error, never retried.

use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::error::{ConnectionError, ConnectionResult};

/// Run `future` with an optional time limit
///
/// `None` waits indefinitely.
pub async fn with_timeout<T, F>(
    operation_name: &str,
    timeout: Option<Duration>,
    future: F,
) -> ConnectionResult<T>
where
    F: Future<Output = ConnectionResult<T>>,
{
    let Some(timeout) = timeout else {
        return future.await;
    };

    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            let duration_ms = whole_millis(timeout);
            error!(operation = operation_name, timeout_ms = duration_ms, "Operation timed out");
            Err(ConnectionError::NegotiationTimeout {
                operation: operation_name.to_string(),
                duration_ms,
            })
        }
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
