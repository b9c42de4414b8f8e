use std::{collections::HashMap, time::Duration};

use aulos_net::Headers;
use url::Url;

use crate::DrmSystem;

/// DRM session manager configuration.
#[derive(Clone, Debug)]
pub struct DrmOptions {
    /// Number of concurrent decrypt-session slots.
    pub pool_size: usize,
    /// License-server endpoint per DRM system.
    pub license_servers: HashMap<DrmSystem, Url>,
    /// Custom headers sent with every license request.
    pub request_headers: Headers,
    /// Optional HTTP(S) proxy for license traffic.
    pub proxy: Option<String>,
    /// Attempts per license request (5xx / timeout / connect failures).
    pub license_attempts: u32,
    /// Sleep between license attempts.
    pub license_retry_delay: Duration,
    /// Attempts against the local auth service for a session token.
    pub auth_token_attempts: u32,
    /// Upper bound on a decrypt call waiting for a pending session.
    pub decrypt_wait: Duration,
}

impl Default for DrmOptions {
    fn default() -> Self {
        Self {
            pool_size: 2,
            license_servers: HashMap::new(),
            request_headers: Headers::new(),
            proxy: None,
            license_attempts: 2,
            license_retry_delay: Duration::from_millis(500),
            auth_token_attempts: 2,
            decrypt_wait: Duration::from_secs(12),
        }
    }
}

impl DrmOptions {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_license_server(mut self, system: DrmSystem, url: Url) -> Self {
        self.license_servers.insert(system, url);
        self
    }

    pub fn with_request_headers(mut self, headers: Headers) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_decrypt_wait(mut self, wait: Duration) -> Self {
        self.decrypt_wait = wait;
        self
    }

    pub fn with_license_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.license_attempts = attempts.max(1);
        self.license_retry_delay = delay;
        self
    }
}
