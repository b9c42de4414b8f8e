use aulos_abr::SwitchReason;
use aulos_core::TrackType;

/// Reason a tune attempt failed. All of these are fatal for the current
/// attempt; the caller decides whether to retune.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TuneFailure {
    /// Malformed or unusable manifest content.
    Manifest(String),
    /// Master playlist carried no video profiles.
    ZeroProfiles,
    /// Indexed playlist had zero total duration.
    ZeroDuration,
    /// Tracks could not be aligned by sequence number or start time.
    TrackSync(String),
}

/// Events emitted during playback.
///
/// Every error-ish event carries enough context (HTTP code or DRM
/// sub-code, track, URL) for telemetry.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    /// Tune attempt failed; no automatic retry at this layer.
    TuneFailed { reason: TuneFailure },
    /// Profile changed (either direction).
    BitrateChanged {
        from_bps: u64,
        to_bps: u64,
        profile: usize,
        reason: SwitchReason,
    },
    /// A fragment download failed (pre-escalation).
    FragmentDownloadFailed {
        track: TrackType,
        url: String,
        status: Option<u16>,
    },
    /// Consecutive download failures crossed the fatal threshold.
    DownloadThresholdExceeded { track: TrackType },
    /// A discontinuity boundary was propagated downstream.
    Discontinuity { position_secs: f64 },
    /// A lone discontinuity waiter was force-released and the session
    /// should be retuned.
    RetuneRequired { track: TrackType },
    /// No PTS progress while caches are empty; distinct from hard failure.
    Stalled { track: TrackType, position_secs: f64 },
    /// Sink rejected fragments past the configured threshold.
    PtsError { track: TrackType, discarded: u32 },
    /// DRM failure with explicit retry eligibility.
    DrmFailed { retryable: bool, detail: String },
    /// Minimum seconds of media cached (or cache filled first).
    InitialCachingComplete { cached_secs: f64 },
    /// Playlist re-indexed after a refresh.
    PlaylistRefreshed { track: TrackType, fragments: usize },
    /// A track reached end of stream.
    EndOfStream { track: TrackType },
}
