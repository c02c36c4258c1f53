// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transient-Fault Retry
//!
//! The exponential-backoff policy shared by anything that talks to Redis:
//! base 1s, cap 30s, give up and promote to fatal after 5 attempts.

use pipeline_domain::error::PipelineError;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;

/// Backoff delay before retry attempt `attempt` (0-indexed), doubling
/// from 1s and capping at 30s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let capped_exponent = attempt.min(5);
    let seconds = 1u64.checked_shl(capped_exponent).unwrap_or(30).min(30);
    Duration::from_secs(seconds)
}

/// Retries a redis operation up to [`MAX_ATTEMPTS`] times with
/// [`backoff_delay`] between attempts, promoting the last failure to a
/// `PipelineError::Internal` once attempts are exhausted.
pub async fn retry_redis<T, F>(op_name: &'static str, mut op: F) -> Result<T, PipelineError>
where
    F: AsyncFnMut() -> Result<T, redis::RedisError>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                tracing::warn!(op = op_name, attempt, error = %err, "transient redis fault, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(PipelineError::Internal(format!(
                    "redis {op_name} failed after {MAX_ATTEMPTS} attempts: {err}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_caps_at_thirty_seconds() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(9), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_redis_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_redis("test op", || async {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            if attempt < 2 {
                Err(redis::RedisError::from(std::io::Error::other("transient")))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_redis_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = retry_redis("test op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(redis::RedisError::from(std::io::Error::other("down")))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
