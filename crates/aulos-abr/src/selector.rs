use tracing::debug;

use crate::{
    estimator::{Estimator, ThroughputEstimator, ThroughputSample},
    types::{AbrOptions, ProfileInfo, SwitchDecision, SwitchReason},
};

/// Profile selector: owns the ladder and all switching state.
///
/// The ladder is kept sorted by bandwidth ascending; `position` indexes
/// into it. The consecutive-rampdown counter resets on rampup and on a
/// successful fragment at the current profile, and caps further
/// rampdowns once it reaches `rampdown_limit`.
pub struct ProfileSelector<E: Estimator = ThroughputEstimator> {
    opts: AbrOptions,
    ladder: Vec<ProfileInfo>,
    position: usize,
    estimator: E,
    consecutive_rampdowns: u32,
    rampup_signals_seen: u32,
    high_streak: u32,
    low_streak: u32,
}

impl ProfileSelector<ThroughputEstimator> {
    pub fn new(profiles: Vec<ProfileInfo>, opts: AbrOptions) -> Self {
        let estimator = ThroughputEstimator::new(&opts);
        Self::with_estimator(profiles, opts, estimator)
    }
}

impl<E: Estimator> ProfileSelector<E> {
    pub fn with_estimator(profiles: Vec<ProfileInfo>, opts: AbrOptions, estimator: E) -> Self {
        let mut ladder = profiles;
        ladder.sort_by_key(|p| p.bandwidth_bps);

        let position = opts
            .initial_position
            .unwrap_or(0)
            .min(ladder.len().saturating_sub(1));

        Self {
            opts,
            ladder,
            position,
            estimator,
            consecutive_rampdowns: 0,
            rampup_signals_seen: 0,
            high_streak: 0,
            low_streak: 0,
        }
    }

    pub fn current(&self) -> &ProfileInfo {
        &self.ladder[self.position]
    }

    /// Current position in the sorted ladder.
    pub fn ladder_position(&self) -> usize {
        self.position
    }

    pub fn ladder(&self) -> &[ProfileInfo] {
        &self.ladder
    }

    pub fn is_lowest(&self) -> bool {
        self.position == 0
    }

    pub fn is_highest(&self) -> bool {
        self.position + 1 >= self.ladder.len()
    }

    pub fn push_throughput_sample(&mut self, sample: ThroughputSample) {
        self.estimator.push_sample(sample);
    }

    /// A fragment downloaded fine at the current profile: the rampdown
    /// run is over.
    pub fn note_fragment_success(&mut self) {
        self.consecutive_rampdowns = 0;
    }

    fn decision(&self, reason: SwitchReason, changed: bool) -> SwitchDecision {
        let profile = self.current();
        SwitchDecision {
            ladder_position: self.position,
            profile_index: profile.index,
            bandwidth_bps: profile.bandwidth_bps,
            reason,
            changed,
        }
    }

    fn rampdown_blocked(&self) -> bool {
        self.opts
            .rampdown_limit
            .is_some_and(|limit| self.consecutive_rampdowns >= limit)
    }

    /// Direct one-step rampdown, bypassing the steady-state heuristics.
    ///
    /// Called on HTTP 404/500/502/503/partial-file fragment failures and
    /// on repeated timeouts. Returns an unchanged decision once the
    /// lowest profile is selected or the rampdown limit is reached.
    pub fn ramp_down(&mut self, reason: SwitchReason) -> SwitchDecision {
        if self.is_lowest() {
            return self.decision(SwitchReason::Steady, false);
        }
        if self.rampdown_blocked() {
            debug!(
                position = self.position,
                consecutive = self.consecutive_rampdowns,
                "abr: rampdown blocked by limit"
            );
            return self.decision(SwitchReason::RampdownLimited, false);
        }

        self.position -= 1;
        self.consecutive_rampdowns += 1;
        debug!(
            position = self.position,
            bandwidth = self.current().bandwidth_bps,
            ?reason,
            "abr: ramped down"
        );
        self.decision(reason, true)
    }

    fn ramp_up_one(&mut self, reason: SwitchReason) -> SwitchDecision {
        self.position += 1;
        self.consecutive_rampdowns = 0;
        self.high_streak = 0;
        debug!(
            position = self.position,
            bandwidth = self.current().bandwidth_bps,
            ?reason,
            "abr: ramped up"
        );
        self.decision(reason, true)
    }

    /// Steady-state evaluation, run at each opportunity with the current
    /// buffered seconds.
    ///
    /// Order matters: rampdown paths are checked before rampup so that a
    /// window where both could fire resolves toward safety.
    pub fn evaluate(&mut self, buffered_secs: f64) -> SwitchDecision {
        let estimate = self.estimator.estimate_bps();

        // Streak bookkeeping happens every window regardless of outcome.
        if buffered_secs >= self.opts.buffer_high_secs {
            self.high_streak += 1;
            self.low_streak = 0;
        } else {
            self.high_streak = 0;
            if buffered_secs < self.opts.buffer_low_secs {
                self.low_streak += 1;
            } else {
                self.low_streak = 0;
            }
        }

        match estimate {
            Some(bps) => {
                self.low_streak = 0;
                let adjusted = bps as f64 / self.opts.safety_factor;
                self.evaluate_with_estimate(adjusted, buffered_secs)
            }
            None => {
                // No usable estimate (e.g. repeated timeouts): force a
                // rampdown after a sustained low-buffer streak.
                if self.low_streak >= self.opts.low_streak_windows && !self.is_lowest() {
                    self.low_streak = 0;
                    return self.ramp_down(SwitchReason::BufferLowStreak);
                }
                self.try_streak_rampup()
            }
        }
    }

    fn evaluate_with_estimate(&mut self, adjusted_bps: f64, buffered_secs: f64) -> SwitchDecision {
        // Best candidate not exceeding the adjusted throughput, else the
        // lowest rung.
        let candidate = self
            .ladder
            .iter()
            .enumerate()
            .filter(|(_, p)| (p.bandwidth_bps as f64) <= adjusted_bps)
            .map(|(i, _)| i)
            .next_back()
            .unwrap_or(0);

        if candidate < self.position {
            // One-step dips with a non-critical buffer are noise; hold.
            if candidate + 1 == self.position && buffered_secs > self.opts.buffer_critical_secs {
                return self.decision(SwitchReason::MarginalDipRetained, false);
            }
            if self.rampdown_blocked() {
                return self.decision(SwitchReason::RampdownLimited, false);
            }
            self.position = candidate;
            self.consecutive_rampdowns += 1;
            debug!(
                position = self.position,
                adjusted_bps, buffered_secs, "abr: bandwidth rampdown"
            );
            return self.decision(SwitchReason::BandwidthDown, true);
        }

        if candidate > self.position {
            if self.rampup_signals_seen < self.opts.consistency_ignore_count {
                self.rampup_signals_seen += 1;
                return self.decision(SwitchReason::SuppressedByConsistency, false);
            }
            self.position = candidate;
            self.consecutive_rampdowns = 0;
            self.high_streak = 0;
            debug!(position = self.position, adjusted_bps, "abr: bandwidth rampup");
            return self.decision(SwitchReason::BandwidthUp, true);
        }

        self.try_streak_rampup()
    }

    /// Speculative one-step rampup after a sustained high buffer,
    /// recovering from a transiently low (or absent) estimate.
    fn try_streak_rampup(&mut self) -> SwitchDecision {
        if self.high_streak >= self.opts.high_streak_windows && !self.is_highest() {
            if self.rampup_signals_seen < self.opts.consistency_ignore_count {
                self.rampup_signals_seen += 1;
                return self.decision(SwitchReason::SuppressedByConsistency, false);
            }
            return self.ramp_up_one(SwitchReason::BufferHighStreak);
        }
        self.decision(SwitchReason::Steady, false)
    }
}
