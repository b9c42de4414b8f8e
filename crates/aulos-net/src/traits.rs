use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{
    error::NetError,
    retry::{DefaultRetryPolicy, RetryNet},
    types::{Headers, RangeSpec, RetryPolicy},
};

/// The "download a resource" capability the engine programs against.
///
/// Playlist refreshes and fragment downloads both go through this seam so
/// tests can substitute a mock transport.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// Get all bytes from a URL.
    async fn get_bytes(
        &self,
        url: Url,
        headers: Option<Headers>,
        timeout: Option<Duration>,
    ) -> Result<Bytes, NetError>;

    /// Get a byte range from a URL.
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
        timeout: Option<Duration>,
    ) -> Result<Bytes, NetError>;

    /// HEAD request, returning response headers.
    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError>;
}

pub trait NetExt: Net + Sized {
    /// Add a bounded-retry layer.
    fn with_retry(self, policy: RetryPolicy) -> RetryNet<Self> {
        RetryNet::new(self, DefaultRetryPolicy::new(policy))
    }
}

impl<T: Net> NetExt for T {}
