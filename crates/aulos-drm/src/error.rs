use aulos_net::NetError;
use thiserror::Error;

/// DRM errors. Each variant has a fixed retry eligibility so callers can
/// decide between retune and hard failure without string matching.
#[derive(Debug, Error, Clone)]
pub enum DrmError {
    #[error("challenge generation failed: {0}")]
    ChallengeGeneration(String),

    #[error("license authorization failed: {0}")]
    Authorization(String),

    #[error("HDCP compliance failure")]
    Hdcp,

    #[error("device not provisioned")]
    NotProvisioned,

    #[error("corrupt key metadata: {0}")]
    CorruptMetadata(String),

    #[error("key acquisition timed out")]
    KeyAcquisitionTimeout,

    #[error("empty session id from DRM system")]
    EmptySessionId,

    #[error("license server rejected exchange (HTTP {status})")]
    LicenseRejected { status: u16 },

    #[error("license transport error: {0}")]
    Transport(#[from] NetError),

    #[error("session previously failed for key {key}")]
    SessionFailed { key: String },

    #[error("no non-primary session slot available for eviction")]
    PoolExhausted,

    #[error("unsupported DRM system id")]
    UnsupportedSystem,

    #[error("no license server configured for {0}")]
    MissingLicenseServer(String),

    #[error("decrypt failed: {0}")]
    Decrypt(String),

    #[error("cancelled")]
    Cancelled,
}

impl DrmError {
    /// Whether the caller's higher-level retune logic may retry.
    ///
    /// Authorization, HDCP, provisioning and corrupt-metadata failures
    /// are never retried automatically; network timeouts are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::KeyAcquisitionTimeout => true,
            Self::Transport(net) => net.is_retryable(),
            Self::Authorization(_)
            | Self::Hdcp
            | Self::NotProvisioned
            | Self::CorruptMetadata(_)
            | Self::ChallengeGeneration(_)
            | Self::EmptySessionId
            | Self::LicenseRejected { .. }
            | Self::SessionFailed { .. }
            | Self::PoolExhausted
            | Self::UnsupportedSystem
            | Self::MissingLicenseServer(_)
            | Self::Decrypt(_)
            | Self::Cancelled => false,
        }
    }
}

pub type DrmResult<T> = Result<T, DrmError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DrmError::KeyAcquisitionTimeout, true)]
    #[case(DrmError::Transport(NetError::Timeout), true)]
    #[case(DrmError::Transport(NetError::http_status(404, "u")), false)]
    #[case(DrmError::Authorization("expired".into()), false)]
    #[case(DrmError::Hdcp, false)]
    #[case(DrmError::NotProvisioned, false)]
    #[case(DrmError::CorruptMetadata("bad pssh".into()), false)]
    fn retry_eligibility(#[case] error: DrmError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }
}
