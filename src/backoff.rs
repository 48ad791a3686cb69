//! A single bounded exponential-backoff policy shared by the poller's transport
//! retries and the executor's network/5xx retries (SPEC_FULL.md §1b).

use backoff::ExponentialBackoff;
use std::time::Duration;

/// Build a bounded exponential backoff: starts at `initial`, doubles each
/// attempt, never exceeds `max_interval`, and gives up entirely after
/// `max_elapsed`.
pub fn bounded(initial: Duration, max_interval: Duration, max_elapsed: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: initial,
        max_interval,
        max_elapsed_time: Some(max_elapsed),
        ..ExponentialBackoff::default()
    }
}

/// Whether an HTTP status code should be retried: transport-level 5xx only.
/// 4xx responses are protocol-level and fatal to the caller.
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
}

/// Runs `op` under `policy`, classifying each error via `is_transient`: a
/// transient error is retried, a permanent one returns immediately. Shared by
/// the poller's transport retries and the executor's fetch/add/pin retries.
pub async fn retry_transient<T, E, F, Fut>(
    policy: ExponentialBackoff,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    backoff::future::retry(policy, || {
        let fut = op();
        async {
            fut.await.map_err(|e| {
                if is_transient(&e) {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_policy_respects_max_interval() {
        let policy = bounded(
            Duration::from_millis(100),
            Duration::from_secs(5),
            Duration::from_secs(30),
        );
        assert_eq!(policy.max_interval, Duration::from_secs(5));
        assert_eq!(policy.max_elapsed_time, Some(Duration::from_secs(30)));
    }

    #[test]
    fn retryable_status_classification() {
        assert!(is_retryable_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(reqwest::StatusCode::OK));
    }
}
