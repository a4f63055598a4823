//! Per-call timeouts for store operations.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Await `fut`, failing with [`Error::Timeout`] once `timeout` elapses.
///
/// `None` waits indefinitely. Callers re-tag the error with the store that
/// timed out, so a timeout takes the same critical/non-critical path as any
/// other failure of that store.
pub(crate) async fn bounded<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}

/// [`bounded`] for a vector store call; any failure becomes a vector store
/// error for `operation`.
pub(crate) async fn vector_op<T, F>(timeout: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    bounded(timeout, fut)
        .await
        .map_err(|e| e.into_vector(operation))
}

/// [`bounded`] for a graph store call.
pub(crate) async fn graph_op<T, F>(timeout: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    bounded(timeout, fut)
        .await
        .map_err(|e| e.into_graph(operation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Error>(1)
        };
        let err = bounded(Some(Duration::from_millis(250)), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { duration_ms: 250 }));
    }

    #[tokio::test]
    async fn test_passes_through() {
        let value = bounded(None, async { Ok::<_, Error>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = bounded(Some(Duration::from_secs(1)), async {
            Err::<(), _>(Error::Internal("boom".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ops_retag_timeouts() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Error>(())
        };
        let err = graph_op(Some(Duration::from_millis(10)), "merge_anchor", slow)
            .await
            .unwrap_err();
        assert!(err.is_graph_store());

        let err = vector_op(None, "insert", async {
            Err::<(), _>(Error::NotFound("x".to_string()))
        })
        .await
        .unwrap_err();
        assert!(err.is_vector_store());
        assert!(err.to_string().contains("during insert"));
    }
}
