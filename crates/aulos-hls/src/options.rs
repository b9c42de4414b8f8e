use std::time::Duration;

use crate::discontinuity::StallPolicy;

/// Pipeline configuration.
///
/// The discontinuity tolerance and refresh-wait bounds are empirically
/// tuned, stream-dependent values; they are knobs here rather than
/// constants.
#[derive(Clone, Debug)]
pub struct HlsOptions {
    /// Fragment cache capacity per track, in fragments.
    pub cache_fragments: usize,
    /// Seconds of media to cache before signaling initial caching
    /// complete (the signal also fires if the cache fills up first).
    pub initial_cache_secs: f64,
    /// Float tolerance when matching a fragment to a target position.
    pub position_epsilon: f64,
    /// Window for pairing discontinuities across tracks by
    /// program-date-time.
    pub discontinuity_tolerance_secs: f64,
    /// Playlist-refresh cycles a fetcher waits for peer playlist data at
    /// a discontinuity, DVR content.
    pub refresh_wait_limit_dvr: u32,
    /// Same bound for pure live content.
    pub refresh_wait_limit_live: u32,
    /// Lower clamp on the live playlist refresh interval.
    pub refresh_floor: Duration,
    /// Upper clamp on the live playlist refresh interval.
    pub refresh_ceiling: Duration,
    /// Same-profile retries for timeout/connect fragment failures.
    pub fragment_retry_count: u32,
    /// Consecutive fragment failures before the track goes fatal.
    pub download_failure_threshold: u32,
    /// Sink-rejected fragments tolerated before a PTS-error abort.
    pub discard_threshold: u32,
    /// Extra lead the subtitle track may hold over audio.
    pub subtitle_lead_secs: f64,
    /// Trick-play fragment pacing (fragments per second of wall time).
    pub trickplay_fps: f64,
    /// No PTS progress for this long with empty caches reports a stall.
    pub stall_timeout: Duration,
    /// What to do with a lone discontinuity waiter after the stall
    /// window.
    pub stall_policy: StallPolicy,
    /// Discontinuity-barrier stall window.
    pub discontinuity_stall_window: Duration,
    /// Fragment download timeout when the buffer is comfortable.
    pub fragment_timeout: Duration,
    /// Fragment download timeout when the buffer is shrinking.
    pub fragment_timeout_tight: Duration,
    /// Cache-put wait while the session is still preparing (short, to
    /// avoid deadlock against initial-buffering gates).
    pub put_timeout_preparing: Duration,
    /// Cache-put wait during steady playback.
    pub put_timeout: Duration,
    /// Window for randomized deferred key acquisition deadlines.
    pub deferred_key_window: Duration,
    /// Key-metadata entries allowed to request immediately before new
    /// entries get staggered.
    pub immediate_key_limit: usize,
    pub enable_audio: bool,
    pub enable_subtitle: bool,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            cache_fragments: 4,
            initial_cache_secs: 2.0,
            position_epsilon: 0.1,
            discontinuity_tolerance_secs: 30.0,
            refresh_wait_limit_dvr: 5,
            refresh_wait_limit_live: 1,
            refresh_floor: Duration::from_millis(500),
            refresh_ceiling: Duration::from_secs(6),
            fragment_retry_count: 2,
            download_failure_threshold: 10,
            discard_threshold: 10,
            subtitle_lead_secs: 5.0,
            trickplay_fps: 4.0,
            stall_timeout: Duration::from_secs(10),
            stall_policy: StallPolicy::Drop,
            discontinuity_stall_window: Duration::from_secs(10),
            fragment_timeout: Duration::from_secs(10),
            fragment_timeout_tight: Duration::from_secs(5),
            put_timeout_preparing: Duration::from_millis(500),
            put_timeout: Duration::from_secs(5),
            deferred_key_window: Duration::from_secs(30),
            immediate_key_limit: 2,
            enable_audio: true,
            enable_subtitle: false,
        }
    }
}

impl HlsOptions {
    pub fn with_cache_fragments(mut self, fragments: usize) -> Self {
        self.cache_fragments = fragments.max(1);
        self
    }

    pub fn with_initial_cache_secs(mut self, secs: f64) -> Self {
        self.initial_cache_secs = secs.max(0.0);
        self
    }

    pub fn with_discontinuity_tolerance(mut self, secs: f64) -> Self {
        self.discontinuity_tolerance_secs = secs;
        self
    }

    pub fn with_stall_policy(mut self, policy: StallPolicy) -> Self {
        self.stall_policy = policy;
        self
    }

    pub fn with_download_failure_threshold(mut self, threshold: u32) -> Self {
        self.download_failure_threshold = threshold;
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.enable_audio = enabled;
        self
    }

    pub fn with_subtitle(mut self, enabled: bool) -> Self {
        self.enable_subtitle = enabled;
        self
    }
}
