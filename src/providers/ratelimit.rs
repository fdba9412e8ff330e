//! Process-wide rate-limit bookkeeping.
//!
//! One record per provider: when it becomes usable again and how many
//! consecutive rate-limit responses it has produced. All concurrent tile
//! fetches consult the same registry, so a single 429 parks the provider for
//! every in-flight tile, not just the one that saw it.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// First cooldown after a rate-limit response.
pub const BASE_COOLDOWN: Duration = Duration::from_secs(60);
/// Exponential backoff ceiling for repeat offenders.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
struct Cooldown {
    next_available_at: Instant,
    consecutive: u32,
}

#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    state: Mutex<HashMap<String, Cooldown>>,
}

impl RateLimitRegistry {
    pub fn new() -> RateLimitRegistry {
        Default::default()
    }

    /// True while the provider's cooldown window is open.
    pub async fn is_limited(&self, provider_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .get(provider_id)
            .map(|c| Instant::now() < c.next_available_at)
            .unwrap_or(false)
    }

    /// Record a rate-limit response. The cooldown doubles per consecutive
    /// hit (60s, 120s, ... capped at an hour); a server-supplied Retry-After
    /// wins when it is longer. Returns the cooldown that was applied.
    pub async fn mark_rate_limited(
        &self,
        provider_id: &str,
        retry_after: Option<Duration>,
    ) -> Duration {
        let mut state = self.state.lock().await;
        let consecutive = state
            .get(provider_id)
            .map(|c| c.consecutive + 1)
            .unwrap_or(1);
        let exponential = BASE_COOLDOWN
            .checked_mul(1 << (consecutive - 1).min(6))
            .unwrap_or(MAX_COOLDOWN)
            .min(MAX_COOLDOWN);
        let cooldown = match retry_after {
            Some(ra) if ra > exponential => ra.min(MAX_COOLDOWN),
            _ => exponential,
        };
        state.insert(
            provider_id.to_string(),
            Cooldown {
                next_available_at: Instant::now() + cooldown,
                consecutive,
            },
        );
        log::warn!(
            "provider {} rate-limited, cooling down for {}s (hit #{})",
            provider_id,
            cooldown.as_secs(),
            consecutive
        );
        cooldown
    }

    /// Any successful response clears the provider's record entirely.
    pub async fn clear(&self, provider_id: &str) {
        self.state.lock().await.remove(provider_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_provider_is_not_limited() {
        let registry = RateLimitRegistry::new();
        assert!(!registry.is_limited("opentopography").await);
    }

    #[tokio::test]
    async fn test_mark_opens_window() {
        let registry = RateLimitRegistry::new();
        let cooldown = registry.mark_rate_limited("opentopography", None).await;
        assert_eq!(cooldown, BASE_COOLDOWN);
        assert!(registry.is_limited("opentopography").await);
        assert!(!registry.is_limited("copernicus-aws").await);
    }

    #[tokio::test]
    async fn test_consecutive_hits_back_off_exponentially() {
        let registry = RateLimitRegistry::new();
        assert_eq!(
            registry.mark_rate_limited("p", None).await,
            Duration::from_secs(60)
        );
        assert_eq!(
            registry.mark_rate_limited("p", None).await,
            Duration::from_secs(120)
        );
        assert_eq!(
            registry.mark_rate_limited("p", None).await,
            Duration::from_secs(240)
        );
        // Never past the one hour ceiling.
        for _ in 0..10 {
            registry.mark_rate_limited("p", None).await;
        }
        assert_eq!(registry.mark_rate_limited("p", None).await, MAX_COOLDOWN);
    }

    #[tokio::test]
    async fn test_retry_after_wins_when_longer() {
        let registry = RateLimitRegistry::new();
        let cooldown = registry
            .mark_rate_limited("p", Some(Duration::from_secs(900)))
            .await;
        assert_eq!(cooldown, Duration::from_secs(900));
        // A shorter Retry-After never undercuts the exponential schedule.
        let cooldown = registry
            .mark_rate_limited("p", Some(Duration::from_secs(1)))
            .await;
        assert_eq!(cooldown, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_success_clears_the_record() {
        let registry = RateLimitRegistry::new();
        registry.mark_rate_limited("p", None).await;
        registry.clear("p").await;
        assert!(!registry.is_limited("p").await);
        // Backoff restarts from the base after a clear.
        assert_eq!(registry.mark_rate_limited("p", None).await, BASE_COOLDOWN);
    }
}
