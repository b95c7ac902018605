//! Deadline wrapper for remote calls
//!
//! Races an operation against a timer. On expiry the wrapped future is
//! dropped, so any in-flight request owned by it is cancelled and its
//! connection released.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Run `operation` with a hard deadline.
///
/// Returns the operation's own result when it finishes first, otherwise
/// `Error::Timeout(message)`.
pub async fn with_timeout<T, F>(operation: F, deadline: Duration, message: impl Into<String>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(message.into())),
    }
}
