//! Fail-open utilities for graceful degradation
//!
//! Use these for advisory work whose failure must not abort an agent run:
//! temp-file cleanup, loading optional event data, audit extras.
//!
//! DO NOT use fail-open for:
//! - Queue enqueue/dequeue (durability)
//! - Context saves (correctness)

use tracing::warn;

use crate::Result;

/// Run a synchronous operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// ```
/// use repogent_core::fail_open::fail_open;
///
/// let value = fail_open("parse_limit", || Ok(42));
/// assert_eq!(value, Some(42));
/// ```
pub fn fail_open<F, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match f() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
