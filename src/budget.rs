//! Bounded execution combinator
//!
//! Both the prefetch phase and the outer workflow call race against a time
//! budget and must resolve to a declared fallback instead of raising.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `fut` for at most `budget`; on expiry return `fallback` instead.
/// `label` only feeds the timeout log line.
pub async fn run_bounded<F, T>(label: &str, budget: Duration, fut: F, fallback: T) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(value) => value,
        Err(_) => {
            warn!(phase = label, budget_ms = budget.as_millis() as u64, "Budget expired, using fallback");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_budget() {
        let result = run_bounded("fast", Duration::from_millis(100), async { 42 }, 0).await;
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_falls_back_on_expiry() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            42
        };
        let result = run_bounded("slow", Duration::from_millis(10), slow, 7).await;
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_fallback_can_be_none() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some(1)
        };
        let result = run_bounded("slow", Duration::from_millis(10), slow, None).await;
        assert!(result.is_none());
    }
}
