// src/provider/budget.rs — Shared inference quota across concurrent runs
//
// Wraps any ModelProvider so every `chat()` call holds one permit of a
// semaphore shared by all runs. The permit is released when the call returns.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{ChatRequest, ChatResponse, ModelInfo, ModelProvider};
use crate::infra::errors::LabError;

/// Cloneable handle to the inference semaphore.
#[derive(Debug, Clone)]
pub struct InferenceBudget {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl InferenceBudget {
    pub fn new(max_concurrent_calls: usize) -> Self {
        let capacity = max_concurrent_calls.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, LabError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LabError::InferenceBudgetClosed)
    }

    /// Refuse all further acquisitions. Calls already in flight finish normally.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

pub struct BudgetedProvider {
    inner: Arc<dyn ModelProvider>,
    budget: InferenceBudget,
}

impl BudgetedProvider {
    pub fn new(inner: Arc<dyn ModelProvider>, budget: InferenceBudget) -> Self {
        Self { inner, budget }
    }
}

#[async_trait]
impl ModelProvider for BudgetedProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn models(&self) -> Vec<ModelInfo> {
        self.inner.models()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LabError> {
        let _permit = self.budget.acquire().await?;
        tracing::debug!(
            provider = self.inner.id(),
            available = self.budget.available(),
            "Inference permit acquired"
        );
        self.inner.chat(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StopReason, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the peak number of concurrent `chat` calls.
    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ModelProvider for SlowProvider {
        fn id(&self) -> &str {
            "slow"
        }
        fn name(&self) -> &str {
            "Slow"
        }
        fn models(&self) -> Vec<ModelInfo> {
            vec![]
        }
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, LabError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: String::new(),
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    #[tokio::test]
    async fn test_budget_limits_concurrency() {
        let inner = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let budget = InferenceBudget::new(2);
        let provider = Arc::new(BudgetedProvider::new(inner.clone(), budget.clone()));

        let calls = (0..6).map(|_| {
            let p = provider.clone();
            async move { p.chat(ChatRequest::default()).await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(inner.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(budget.available(), 2);
    }

    #[tokio::test]
    async fn test_closed_budget_rejects_calls() {
        let inner = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let budget = InferenceBudget::new(1);
        let provider = BudgetedProvider::new(inner, budget.clone());
        budget.close();
        let err = provider.chat(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, LabError::InferenceBudgetClosed));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(InferenceBudget::new(0).capacity(), 1);
    }
}
