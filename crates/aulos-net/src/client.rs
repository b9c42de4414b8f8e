use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::Net,
    types::{Headers, NetOptions, RangeSpec},
};

/// reqwest-backed [`Net`] implementation.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    opts: NetOptions,
}

impl HttpClient {
    pub fn new(opts: NetOptions) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(opts.pool_max_idle_per_host)
            .build()
            .unwrap_or_default();

        Self { client, opts }
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<&Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    async fn execute(
        &self,
        req: reqwest::RequestBuilder,
        url: &Url,
        timeout: Option<Duration>,
    ) -> NetResult<reqwest::Response> {
        let req = req.timeout(timeout.unwrap_or(self.opts.request_timeout));
        let resp = req.send().await.map_err(|e| NetError::from_reqwest(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url.as_str()));
        }

        Ok(resp)
    }

    /// Collect a response body, flagging truncated transfers as
    /// `PartialFile` so the caller can treat them like server errors.
    async fn collect_body(resp: reqwest::Response, url: &Url) -> NetResult<Bytes> {
        let expected = resp.content_length();
        let bytes = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout
            } else {
                NetError::Http(e.to_string())
            }
        })?;

        if let Some(expected) = expected {
            if (bytes.len() as u64) < expected {
                return Err(NetError::PartialFile {
                    expected,
                    got: bytes.len() as u64,
                    url: url.to_string(),
                });
            }
        }

        Ok(bytes)
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(
        &self,
        url: Url,
        headers: Option<Headers>,
        timeout: Option<Duration>,
    ) -> NetResult<Bytes> {
        trace!(url = %url, "net: GET");
        let req = Self::apply_headers(self.client.get(url.clone()), headers.as_ref());
        let resp = self.execute(req, &url, timeout).await?;
        let bytes = Self::collect_body(resp, &url).await?;
        debug!(url = %url, bytes = bytes.len(), "net: GET complete");
        Ok(bytes)
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
        timeout: Option<Duration>,
    ) -> NetResult<Bytes> {
        trace!(url = %url, range = %range.to_header_value(), "net: GET range");
        let req = Self::apply_headers(self.client.get(url.clone()), headers.as_ref())
            .header("Range", range.to_header_value());
        let resp = self.execute(req, &url, timeout).await?;
        let bytes = Self::collect_body(resp, &url).await?;

        // A server ignoring the Range header returns the whole resource;
        // the caller asked for an exact window, so over-long bodies are
        // trimmed and short ones are a partial-file failure.
        if (bytes.len() as u64) < range.len {
            return Err(NetError::PartialFile {
                expected: range.len,
                got: bytes.len() as u64,
                url: url.to_string(),
            });
        }

        Ok(bytes.slice(..range.len as usize))
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> NetResult<Headers> {
        let req = Self::apply_headers(self.client.head(url.clone()), headers.as_ref());
        let resp = self.execute(req, &url, None).await?;

        let mut out = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(value) = value.to_str() {
                out.insert(name.as_str(), value);
            }
        }
        Ok(out)
    }
}
