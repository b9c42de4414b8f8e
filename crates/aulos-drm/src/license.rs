use async_trait::async_trait;
use bytes::Bytes;
use aulos_net::{Headers, NetError, NetResult};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::{DrmError, DrmOptions, DrmResult, LicenseChallenge};

/// Raw license-server response. Non-2xx statuses are part of the
/// protocol (412 triggers a token refresh), so the transport does not
/// convert them to errors.
#[derive(Debug, Clone)]
pub struct LicenseResponse {
    pub status: u16,
    pub body: Bytes,
}

impl LicenseResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// License exchange seam. The production implementation speaks HTTP;
/// platform secure-clients plug in here with the same
/// retry/success/failure contract.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = LicenseTransportMock))]
#[async_trait]
pub trait LicenseTransport: Send + Sync {
    async fn post(&self, url: Url, headers: Headers, body: Bytes) -> NetResult<LicenseResponse>;
}

/// Session-token source (local auth service).
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = TokenSourceMock))]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn session_token(&self) -> NetResult<String>;
}

#[async_trait]
impl LicenseTransport for Box<dyn LicenseTransport> {
    async fn post(&self, url: Url, headers: Headers, body: Bytes) -> NetResult<LicenseResponse> {
        (**self).post(url, headers, body).await
    }
}

/// reqwest-backed [`LicenseTransport`].
pub struct HttpLicenseTransport {
    client: reqwest::Client,
}

impl HttpLicenseTransport {
    pub fn new(proxy: Option<&str>) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            if let Ok(proxy) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(proxy);
            } else {
                warn!(proxy, "invalid license proxy, continuing without");
            }
        }

        Self {
            client: builder.build().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LicenseTransport for HttpLicenseTransport {
    async fn post(&self, url: Url, headers: Headers, body: Bytes) -> NetResult<LicenseResponse> {
        let mut req = self.client.post(url);
        for (k, v) in headers.iter() {
            req = req.header(k, v);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| NetError::from_reqwest(&e))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| NetError::Http(e.to_string()))?;

        Ok(LicenseResponse { status, body })
    }
}

/// License acquisition with bounded retry.
///
/// Policy per attempt sequence:
/// - 5xx, timeout, connect failure: retry up to `license_attempts` with
///   `license_retry_delay` between attempts,
/// - 412: exactly one token refresh and re-request (does not consume a
///   retry attempt),
/// - 401/403: authorization failure, never retried,
/// - anything else non-2xx: rejected, never retried.
pub struct LicenseClient<T> {
    transport: T,
    opts: DrmOptions,
}

impl<T: LicenseTransport> LicenseClient<T> {
    pub fn new(transport: T, opts: DrmOptions) -> Self {
        Self { transport, opts }
    }

    pub fn options(&self) -> &DrmOptions {
        &self.opts
    }

    async fn fetch_token(&self, source: &dyn TokenSource) -> DrmResult<String> {
        let mut last_error = None;

        for attempt in 0..self.opts.auth_token_attempts {
            match source.session_token().await {
                Ok(token) => return Ok(token),
                Err(error) => {
                    debug!(attempt, error = %error, "auth token fetch failed");
                    last_error = Some(error);
                }
            }
        }

        Err(DrmError::Authorization(format!(
            "session token unavailable: {}",
            last_error.map_or_else(|| "no attempts".to_string(), |e| e.to_string())
        )))
    }

    /// Run the license exchange for a generated challenge.
    pub async fn acquire(
        &self,
        url: Url,
        challenge: &LicenseChallenge,
        token_source: Option<&dyn TokenSource>,
        cached_token: Option<String>,
    ) -> DrmResult<Bytes> {
        let mut token = match cached_token {
            Some(token) => Some(token),
            None => match token_source {
                Some(source) => Some(self.fetch_token(source).await?),
                None => None,
            },
        };

        let mut token_refreshed = false;
        let mut attempt: u32 = 0;

        loop {
            let mut headers = self.opts.request_headers.clone();
            headers.insert("Content-Type", challenge.content_type);
            if let Some(ref token) = token {
                headers.insert("Authorization", format!("Bearer {token}"));
            }

            let outcome = self
                .transport
                .post(url.clone(), headers, challenge.body.clone())
                .await;

            match outcome {
                Ok(resp) if resp.is_success() => return Ok(resp.body),

                Ok(resp) if resp.status == 412 => {
                    // License exchange rejected: one token refresh, then
                    // re-request. A second 412 is final.
                    let Some(source) = token_source else {
                        return Err(DrmError::LicenseRejected { status: 412 });
                    };
                    if token_refreshed {
                        return Err(DrmError::LicenseRejected { status: 412 });
                    }
                    debug!(url = %url, "license 412, refreshing session token");
                    token = Some(self.fetch_token(source).await?);
                    token_refreshed = true;
                }

                Ok(resp) if resp.status == 401 || resp.status == 403 => {
                    return Err(DrmError::Authorization(format!(
                        "license server returned HTTP {}",
                        resp.status
                    )));
                }

                Ok(resp) if resp.status >= 500 => {
                    attempt += 1;
                    if attempt >= self.opts.license_attempts {
                        return Err(DrmError::LicenseRejected {
                            status: resp.status,
                        });
                    }
                    debug!(status = resp.status, attempt, "license 5xx, retrying");
                    sleep(self.opts.license_retry_delay).await;
                }

                Ok(resp) => {
                    return Err(DrmError::LicenseRejected {
                        status: resp.status,
                    });
                }

                Err(error) if error.is_timeout() || error.is_connect() => {
                    attempt += 1;
                    if attempt >= self.opts.license_attempts {
                        return Err(DrmError::Transport(error));
                    }
                    debug!(error = %error, attempt, "license transport failure, retrying");
                    sleep(self.opts.license_retry_delay).await;
                }

                Err(error) => return Err(DrmError::Transport(error)),
            }
        }
    }
}
