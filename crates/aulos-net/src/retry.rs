use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::{
    error::NetError,
    traits::Net,
    types::{Headers, RangeSpec, RetryPolicy},
};

/// Bounded retry policy: exhausts `max_retries` attempts for retryable
/// errors, gives up immediately otherwise.
pub struct DefaultRetryPolicy {
    policy: RetryPolicy,
}

impl DefaultRetryPolicy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn should_retry(&self, error: &NetError, attempt: u32) -> bool {
        attempt < self.policy.max_retries && error.is_retryable()
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.policy.delay_for_attempt(attempt)
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_retries
    }
}

/// Retry decorator for [`Net`] implementations.
pub struct RetryNet<N> {
    inner: N,
    retry: DefaultRetryPolicy,
}

impl<N: Net> RetryNet<N> {
    pub fn new(inner: N, retry: DefaultRetryPolicy) -> Self {
        Self { inner, retry }
    }

    async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, NetError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, NetError>>,
    {
        let mut last_error: Option<NetError> = None;

        for attempt in 0..=self.retry.max_attempts() {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.retry.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    debug!(attempt, error = %error, "net: retrying after error");
                    last_error = Some(error);

                    if attempt < self.retry.max_attempts() {
                        sleep(self.retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        Err(NetError::RetryExhausted {
            max_retries: self.retry.max_attempts(),
            source: Box::new(last_error.unwrap_or(NetError::Timeout)),
        })
    }
}

#[async_trait]
impl<N: Net> Net for RetryNet<N> {
    async fn get_bytes(
        &self,
        url: Url,
        headers: Option<Headers>,
        timeout: Option<Duration>,
    ) -> Result<Bytes, NetError> {
        self.run(|| self.inner.get_bytes(url.clone(), headers.clone(), timeout))
            .await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
        timeout: Option<Duration>,
    ) -> Result<Bytes, NetError> {
        self.run(|| self.inner.get_range(url.clone(), range, headers.clone(), timeout))
            .await
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        self.run(|| self.inner.head(url.clone(), headers.clone()))
            .await
    }
}
