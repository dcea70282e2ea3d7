//! Single-flight coordination of access-token refreshes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use super::tokens::TokenStore;
use crate::error::{ApiError, Result};

/// At most one refresh runs at a time, process-wide.
///
/// Callers record [`TokenStore::generation`] before sending a request. When
/// that request needs a new token they enter the gate; the async mutex is
/// FIFO-fair, so queued callers resume in arrival order. A caller that finds
/// the generation moved on while it waited reuses the stored token instead of
/// refreshing again. A failed refresh clears the store before the gate is
/// released, so every queued caller then fails with `SessionExpired`.
#[derive(Debug, Default)]
pub struct RefreshGate {
    lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refresh<F, Fut>(&self, tokens: &TokenStore, observed: u64, refresh: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let _guard = self.lock.lock().await;

        if tokens.generation() != observed {
            if let Some(access) = tokens.access() {
                tracing::debug!("token already refreshed by another request");
                return Ok(access);
            }
        }

        let refresh_token = tokens.refresh().ok_or(ApiError::SessionExpired)?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        match refresh(refresh_token).await {
            Ok(access) => Ok(access),
            Err(e) => {
                tracing::warn!("token refresh failed: {e}");
                tokens.clear();
                Err(e)
            }
        }
    }

    /// Number of refresh calls actually issued.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::models::auth::TokenPair;

    fn pair(access: &str) -> TokenPair {
        TokenPair {
            access_token: access.into(),
            refresh_token: format!("refresh-for-{access}"),
            token_type: "bearer".into(),
            expires_in: 900,
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let tokens = Arc::new(TokenStore::in_memory());
        tokens.save(&pair("old"));
        let gate = Arc::new(RefreshGate::new());
        let observed = tokens.generation();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let tokens = tokens.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                let store = tokens.clone();
                gate.refresh(&tokens, observed, |_refresh| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    store.save(&pair("new"));
                    Ok("new".to_string())
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "new");
        }
        assert_eq!(gate.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_tokens_and_rejects_waiters() {
        let tokens = Arc::new(TokenStore::in_memory());
        tokens.save(&pair("old"));
        let gate = Arc::new(RefreshGate::new());
        let observed = tokens.generation();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let tokens = tokens.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.refresh(&tokens, observed, |_refresh| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(ApiError::Build("refresh rejected".into()))
                })
                .await
            }));
        }

        let mut build_errors = 0;
        let mut expired = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Err(ApiError::Build(_)) => build_errors += 1,
                Err(ApiError::SessionExpired) => expired += 1,
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!((build_errors, expired), (1, 2));
        assert_eq!(gate.refresh_count(), 1);
        assert!(!tokens.is_authenticated());
    }

    #[tokio::test]
    async fn test_no_refresh_token_is_session_expired() {
        let tokens = TokenStore::in_memory();
        let gate = RefreshGate::new();
        let result = gate
            .refresh(&tokens, tokens.generation(), |_| async { Ok("unused".to_string()) })
            .await;
        assert!(matches!(result, Err(ApiError::SessionExpired)));
        assert_eq!(gate.refresh_count(), 0);
    }
}
