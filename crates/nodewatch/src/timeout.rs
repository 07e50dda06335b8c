//! Timeout-bounded async calls.
//!
//! Every network call in the agent goes through [`bounded`], so a hung
//! peer can only ever cost its own timeout.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Outcome of a bounded call that did not succeed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Bounded<E> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Failed(E),
}

/// Race `future` against `limit`; whichever settles first wins.
pub async fn bounded<T, E, F>(limit: Duration, future: F) -> Result<T, Bounded<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Bounded::Failed(error)),
        Err(_) => Err(Bounded::TimedOut(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ()>(1)
        };

        let result = bounded(Duration::from_secs(5), slow).await;
        assert_eq!(result, Err(Bounded::TimedOut(Duration::from_secs(5))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_value_and_error() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, &str>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = bounded(Duration::from_secs(1), async { Err::<u8, _>("refused") }).await;
        assert_eq!(err, Err(Bounded::Failed("refused")));
    }
}
