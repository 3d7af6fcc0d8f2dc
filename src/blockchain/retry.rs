//! Retry middleware wrapped around every provider call.

use crate::blockchain::provider::ProviderError;
use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry of transient failures. `max_times: None` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_times: Option<usize>,
}

impl RetryPolicy {
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_times: None,
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        let builder = ConstantBuilder::default().with_delay(self.delay);
        match self.max_times {
            Some(times) => builder.with_max_times(times),
            None => builder.without_max_times(),
        }
    }
}

/// Runs `operation`, retrying it while it fails with a transient error.
/// Malformed and unexpected failures are returned on the first occurrence.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    name: &str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    operation
        .retry(policy.backoff())
        .when(ProviderError::is_transient)
        .notify(|err, delay| {
            warn!(operation = name, "Connection error: {}. Trying again in {:?}", err, delay);
        })
        .await
}
