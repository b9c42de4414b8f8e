use std::time::Duration;

/// One encoded profile from the master playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileInfo {
    /// Index of this profile in the master playlist.
    pub index: usize,
    /// Advertised bandwidth in bits per second.
    pub bandwidth_bps: u64,
}

/// Why a switch decision was (or was not) made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// Initial profile pick at tune time.
    Initial,
    /// Throughput estimate supports a higher profile.
    BandwidthUp,
    /// Throughput estimate demands a lower profile.
    BandwidthDown,
    /// Buffer held above the high threshold for a full streak.
    BufferHighStreak,
    /// Buffer held below the low threshold with no usable estimate.
    BufferLowStreak,
    /// Direct rampdown after an HTTP failure class (404/5xx/partial).
    DownloadFailure,
    /// Direct rampdown after repeated timeouts.
    RepeatedTimeouts,
    /// The consecutive-rampdown limit blocked a rampdown.
    RampdownLimited,
    /// Rampup signal ignored by the post-tune consistency counter.
    SuppressedByConsistency,
    /// One-step dip retained to avoid thrash on a marginal estimate.
    MarginalDipRetained,
    /// Nothing to do.
    Steady,
}

/// Outcome of one selector consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchDecision {
    /// Position in the sorted ladder after the decision.
    pub ladder_position: usize,
    /// Master-playlist index of the selected profile.
    pub profile_index: usize,
    pub bandwidth_bps: u64,
    pub reason: SwitchReason,
    pub changed: bool,
}

/// Selector tuning knobs.
#[derive(Debug, Clone)]
pub struct AbrOptions {
    /// Ladder position to start from; `None` starts at the lowest.
    pub initial_position: Option<usize>,
    /// Cap on consecutive rampdowns; `None` means unlimited.
    pub rampdown_limit: Option<u32>,
    /// Number of rampup signals ignored right after tune.
    pub consistency_ignore_count: u32,
    /// Below this many buffered seconds the buffer counts as low.
    pub buffer_low_secs: f64,
    /// Below this many buffered seconds the buffer is critical and
    /// marginal-dip retention no longer applies.
    pub buffer_critical_secs: f64,
    /// At or above this many buffered seconds the buffer counts as high.
    pub buffer_high_secs: f64,
    /// Windows of sustained high buffer before a speculative rampup.
    pub high_streak_windows: u32,
    /// Windows of sustained low buffer (no estimate) before a forced
    /// rampdown.
    pub low_streak_windows: u32,
    /// Throughput estimates are divided by this before comparison.
    pub safety_factor: f64,
    /// Samples older than this no longer contribute to the estimate.
    pub sample_window: Duration,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            initial_position: None,
            rampdown_limit: None,
            consistency_ignore_count: 2,
            buffer_low_secs: 10.0,
            buffer_critical_secs: 5.0,
            buffer_high_secs: 15.0,
            high_streak_windows: 3,
            low_streak_windows: 3,
            safety_factor: 1.2,
            sample_window: Duration::from_secs(10),
        }
    }
}
