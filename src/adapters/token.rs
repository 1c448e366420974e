use crate::domain::ports::Clock;
use crate::utils::error::AuthError;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 到期前 5 分鐘視為失效
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: Instant,
}

/// 單一槽位的 bearer token 快取，由呼叫端持有並注入
pub struct TokenCache {
    slot: Mutex<Option<AuthToken>>,
    clock: Arc<dyn Clock>,
    margin: Duration,
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
            margin: TOKEN_SAFETY_MARGIN,
        }
    }

    /// 快取仍新鮮時直接回傳，否則執行交換並存入；檢查與更新在同一把鎖內完成
    pub async fn get_or_refresh<F, Fut>(&self, exchange: F) -> Result<String, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), AuthError>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref() {
            let remaining = token.expires_at.saturating_duration_since(self.clock.now());
            if remaining > self.margin {
                return Ok(token.value.clone());
            }
            tracing::debug!("Cached token expires in {}s, refreshing", remaining.as_secs());
        }

        let (value, expires_in) = exchange().await?;
        let expires_at = self.clock.now() + expires_in.saturating_sub(self.margin);
        tracing::info!(
            "🔑 Obtained reference marketplace token (valid for {}s)",
            expires_in.as_secs()
        );

        *slot = Some(AuthToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }

    pub async fn current(&self) -> Option<AuthToken> {
        self.slot.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_token_reused_until_margin_then_refreshed() {
        let clock = Arc::new(ManualClock::new());
        let cache = TokenCache::new(clock.clone());
        let exchanges = AtomicUsize::new(0);
        let counter = &exchanges;

        let exchange = move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, AuthError>((format!("token-{n}"), Duration::from_secs(7200)))
        };

        assert_eq!(cache.get_or_refresh(exchange).await.unwrap(), "token-1");
        clock.advance(Duration::from_secs(3600));
        assert_eq!(cache.get_or_refresh(exchange).await.unwrap(), "token-1");

        // expires_at = 7200 - 300 = 6900；剩餘必須大於 300 才沿用
        clock.advance(Duration::from_secs(3000));
        assert_eq!(cache.get_or_refresh(exchange).await.unwrap(), "token-2");
        assert_eq!(exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_exchange_leaves_slot_empty() {
        let cache = TokenCache::new(Arc::new(ManualClock::new()));
        let err = cache
            .get_or_refresh(|| async {
                Err(AuthError::Rejected {
                    status: 401,
                    detail: "invalid_client".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Rejected { status: 401, .. }));
        assert!(cache.current().await.is_none());
    }
}
