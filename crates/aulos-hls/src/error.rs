use aulos_core::TrackType;
use aulos_drm::DrmError;
use aulos_net::NetError;
use thiserror::Error;

/// Errors of the HLS pipeline.
#[derive(Debug, Error)]
pub enum HlsError {
    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("DRM error: {0}")]
    Drm(#[from] DrmError),

    /// Malformed playlist, zero profiles, zero duration. Fatal for the
    /// current tune attempt; no automatic retry at this layer.
    #[error("manifest content error: {0}")]
    Manifest(String),

    /// Tracks could not be aligned by sequence number or start time.
    #[error("track sync failed: {0}")]
    TrackSync(String),

    /// Consecutive fragment failures crossed the configured threshold.
    #[error("consecutive download failures on {track} track")]
    DownloadThreshold { track: TrackType },

    /// Fragment cache put timed out while the cache stayed full.
    #[error("fragment cache full")]
    CacheFull,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("profile {0} not found in master playlist")]
    ProfileNotFound(usize),

    #[error("cancelled")]
    Cancelled,
}

impl HlsError {
    /// Whether this error ends the tune attempt (as opposed to being
    /// recovered locally via retry/rampdown).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Manifest(_) | Self::TrackSync(_) | Self::DownloadThreshold { .. }
        )
    }
}

pub type HlsResult<T> = Result<T, HlsError>;
