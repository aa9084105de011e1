//! Backend-first lookups with an on-chain fallback.

use std::future::Future;

use crate::error::Result;
use crate::types::LookupSource;

/// A value together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: LookupSource,
}

/// Await `backend`; if it fails, run `chain` instead.
///
/// The chain strategy is only constructed when needed. When both fail the
/// chain error is returned and the backend error is logged.
pub async fn resolve<T, B, C, CF>(what: &str, backend: B, chain: C) -> Result<Resolved<T>>
where
    B: Future<Output = Result<T>>,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<T>>,
{
    match backend.await {
        Ok(value) => Ok(Resolved {
            value,
            source: LookupSource::Backend,
        }),
        Err(backend_error) => {
            tracing::debug!("Backend lookup of {} failed, trying chain: {}", what, backend_error);
            match chain().await {
                Ok(value) => Ok(Resolved {
                    value,
                    source: LookupSource::Chain,
                }),
                Err(chain_error) => {
                    tracing::warn!(
                        "Lookup of {} failed on backend ({}) and chain ({})",
                        what,
                        backend_error,
                        chain_error
                    );
                    Err(chain_error)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdkError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_backend_wins_without_touching_chain() {
        let calls = AtomicUsize::new(0);
        let chain_calls = &calls;
        let resolved = resolve("gas price", async { Ok(7u64) }, || async move {
            chain_calls.fetch_add(1, Ordering::SeqCst);
            Ok(9u64)
        })
        .await
        .unwrap();

        assert_eq!(resolved, Resolved { value: 7, source: LookupSource::Backend });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_used_when_backend_fails() {
        let resolved = resolve(
            "gas price",
            async { Err(SdkError::RequestFailed("down".into())) },
            || async { Ok(9u64) },
        )
        .await
        .unwrap();

        assert_eq!(resolved.source, LookupSource::Chain);
        assert_eq!(resolved.value, 9);
    }

    #[tokio::test]
    async fn test_chain_error_returned_when_both_fail() {
        let err = resolve::<u64, _, _, _>(
            "contract info",
            async { Err(SdkError::RequestFailed("down".into())) },
            || async { Err(SdkError::Provider("no rpc".into())) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SdkError::Provider(msg) if msg == "no rpc"));
    }
}
