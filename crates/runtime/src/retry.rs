//! The retry policy (spec.md §4.7.5): a retry is applicable only to
//! `CrcMismatch`, and retries are immediate — no backoff, the serial link
//! is fast enough that delay would only aggravate buffering.

use scopehost_session::SessionError;
use scopehost_transport::TransportError;
use std::future::Future;

fn is_crc_mismatch(err: &SessionError) -> bool {
    matches!(err, SessionError::Transport(TransportError::CrcMismatch))
}

/// Runs `op` up to `attempts` times total (so `attempts - 1` retries),
/// retrying only on `CrcMismatch`. Any other error returns immediately.
pub async fn with_crc_retry<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_crc_mismatch(&err) && attempt + 1 < attempts => {
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("attempts >= 1 guarantees at least one iteration ran"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_crc_mismatch_up_to_the_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, SessionError> = with_crc_retry(3, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SessionError::Transport(TransportError::CrcMismatch))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_crc_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, SessionError> = with_crc_retry(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::Transport(TransportError::Timeout))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_the_budget_returns_the_last_crc_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, SessionError> = with_crc_retry(2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::Transport(TransportError::CrcMismatch))
        })
        .await;
        assert!(matches!(
            result.unwrap_err(),
            SessionError::Transport(TransportError::CrcMismatch)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
