use std::thread::sleep;

use tracing::warn;

use crate::BackoffPolicy;
use crate::Result;

/// Runs `task` up to `policy.max_retries` times on the calling thread,
/// sleeping with exponential backoff between failed attempts.
///
/// The closure receives the 0-based attempt number. Returns the first
/// success, or the error of the last attempt.
pub(crate) fn retry_with_backoff<T, F>(
    policy: &BackoffPolicy,
    label: &str,
    mut task: F,
) -> Result<T>
where
    F: FnMut(usize) -> Result<T>,
{
    let max_retries = policy.max_retries.max(1);
    let mut attempt = 0;
    loop {
        match task(attempt) {
            Ok(r) => return Ok(r),
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    warn!("{label} failed after {attempt} attempts: {e}");
                    return Err(e);
                }
                let delay = policy.delay_for(attempt - 1);
                warn!("{label} attempt {attempt} failed: {e}; retrying in {delay:?}");
                sleep(delay);
            }
        }
    }
}
