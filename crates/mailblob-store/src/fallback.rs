use std::future::Future;

use tracing::{debug, warn};

use crate::error::StoreResult;

/// Run `primary`; if it fails for any reason, log and run `secondary`.
///
/// `secondary` is only started once `primary` has resolved. When both fail
/// the caller gets the secondary's error.
pub(crate) async fn read_with_fallback<T, P, S, F>(
    primary_name: &'static str,
    secondary_name: &'static str,
    primary: P,
    secondary: S,
) -> StoreResult<T>
where
    P: Future<Output = StoreResult<T>>,
    S: FnOnce() -> F,
    F: Future<Output = StoreResult<T>>,
{
    match primary.await {
        Ok(value) => Ok(value),
        Err(err) if err.is_not_found() => {
            debug!(from = primary_name, to = secondary_name, "blob not found, falling back");
            secondary().await
        }
        Err(err) => {
            warn!(from = primary_name, to = secondary_name, error = %err, "read failed, falling back");
            secondary().await
        }
    }
}

/// Combine the outcomes of an operation issued to two delegates: the first
/// fault wins, otherwise success.
pub(crate) fn both(first: StoreResult<()>, second: StoreResult<()>) -> StoreResult<()> {
    first.and(second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use mailblob_types::{BlobId, BucketName};

    fn not_found() -> StoreError {
        StoreError::not_found(&BucketName::default(), BlobId::random())
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let result = read_with_fallback("a", "b", async { Ok(1) }, || async {
            panic!("secondary must not run")
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn not_found_and_faults_fall_back() {
        let result = read_with_fallback("a", "b", async { Err(not_found()) }, || async { Ok(2) }).await;
        assert_eq!(result.unwrap(), 2);

        let result = read_with_fallback(
            "a",
            "b",
            async { Err(StoreError::Backend("down".into())) },
            || async { Ok(3) },
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn secondary_error_is_reported() {
        let result: StoreResult<()> = read_with_fallback(
            "a",
            "b",
            async { Err(StoreError::Backend("primary".into())) },
            || async { Err(not_found()) },
        )
        .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn both_keeps_first_fault() {
        assert!(both(Ok(()), Ok(())).is_ok());
        let err = both(Err(StoreError::Backend("x".into())), Err(not_found())).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(both(Ok(()), Err(not_found())).is_err());
    }
}
