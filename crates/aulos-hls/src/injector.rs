//! Per-track fragment inject task.
//!
//! Drains the fragment cache into the sink, enforcing cross-track
//! pacing (audio may not outrun video by more than one video fragment;
//! subtitle may not outrun audio beyond a fixed lead allowance) and the
//! discontinuity barrier. Injected-duration progress is published over
//! watch channels, which is what the pacing of the downstream track
//! observes.

use std::{sync::Arc, time::Duration};

use aulos_core::TrackType;
use aulos_events::{EventBus, PlayerEvent};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    cache::FragmentCache,
    discontinuity::{BarrierOutcome, DiscontinuityCoordinator, StallPolicy},
    options::HlsOptions,
    sink::StreamSink,
};

/// Poll interval for sink back-pressure.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(50);

/// Slack applied to pacing comparisons.
const PACING_EPSILON: f64 = 0.001;

/// Published progress of one injector.
#[derive(Clone)]
pub struct InjectProgress {
    /// Cumulative injected duration in seconds.
    pub injected: watch::Receiver<f64>,
    /// Duration of the most recently injected fragment.
    pub last_fragment: watch::Receiver<f64>,
}

/// Pacing constraint against another track's progress.
pub struct PaceTarget {
    pub progress: InjectProgress,
    /// Extra lead allowed beyond the target's injected duration plus
    /// one fragment (zero for audio-vs-video, the configured lead for
    /// subtitle-vs-audio).
    pub lead_allowance: f64,
}

/// One track's inject loop.
pub struct TrackInjector {
    track: TrackType,
    cache: Arc<FragmentCache>,
    sink: Arc<dyn StreamSink>,
    coordinator: Option<Arc<DiscontinuityCoordinator>>,
    pace: Option<PaceTarget>,
    events: EventBus,
    opts: HlsOptions,
    cancel: CancellationToken,
    injected_tx: watch::Sender<f64>,
    last_fragment_tx: watch::Sender<f64>,
    injected: f64,
    discards: u32,
}

impl TrackInjector {
    pub fn new(
        track: TrackType,
        cache: Arc<FragmentCache>,
        sink: Arc<dyn StreamSink>,
        events: EventBus,
        opts: HlsOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (injected_tx, _) = watch::channel(0.0);
        let (last_fragment_tx, _) = watch::channel(0.0);
        Self {
            track,
            cache,
            sink,
            coordinator: None,
            pace: None,
            events,
            opts,
            cancel,
            injected_tx,
            last_fragment_tx,
            injected: 0.0,
            discards: 0,
        }
    }

    /// Discontinuity barrier (video/audio tracks only).
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: Arc<DiscontinuityCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Pace this track against another one's progress.
    #[must_use]
    pub fn with_pace_target(mut self, pace: PaceTarget) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Progress observers for tracks paced against this one.
    pub fn progress(&self) -> InjectProgress {
        InjectProgress {
            injected: self.injected_tx.subscribe(),
            last_fragment: self.last_fragment_tx.subscribe(),
        }
    }

    /// Run until the cache reports end of stream, a fatal PTS error, or
    /// cancellation.
    pub async fn run(mut self) {
        debug!(track = %self.track, "injector started");

        loop {
            let Some(fragment) = self.cache.get().await else {
                if !self.cancel.is_cancelled() {
                    self.events
                        .publish(PlayerEvent::EndOfStream { track: self.track });
                }
                break;
            };

            if !self.wait_for_sink().await {
                break;
            }
            if !self.wait_for_pacing(fragment.duration).await {
                break;
            }

            if fragment.discontinuity && !self.handle_discontinuity(fragment.position).await {
                break;
            }

            let accepted = self.sink.send(
                self.track,
                fragment.bytes.clone(),
                fragment.position,
                fragment.position,
                fragment.duration,
            );

            if accepted {
                self.discards = 0;
                self.injected += fragment.duration;
                let _ = self.injected_tx.send(self.injected);
                let _ = self.last_fragment_tx.send(fragment.duration);
                trace!(
                    track = %self.track,
                    position = fragment.position,
                    injected = self.injected,
                    "fragment injected"
                );
            } else {
                self.discards += 1;
                warn!(
                    track = %self.track,
                    position = fragment.position,
                    discards = self.discards,
                    "sink rejected fragment"
                );
                if self.discards >= self.opts.discard_threshold {
                    self.events.publish(PlayerEvent::PtsError {
                        track: self.track,
                        discarded: self.discards,
                    });
                    break;
                }
            }
        }

        debug!(track = %self.track, injected = self.injected, "injector stopped");
    }

    /// Wait for sink back-pressure to clear. Returns false on
    /// cancellation.
    async fn wait_for_sink(&self) -> bool {
        while !self.sink.is_cache_empty(self.track) {
            tokio::select! {
                () = tokio::time::sleep(BACKPRESSURE_POLL) => {}
                () = self.cancel.cancelled() => return false,
            }
        }
        true
    }

    /// Enforce the cross-track pacing constraint before injecting a
    /// fragment of `duration` seconds. Returns false on cancellation.
    async fn wait_for_pacing(&mut self, duration: f64) -> bool {
        let Some(pace) = &mut self.pace else {
            return true;
        };

        loop {
            let limit = *pace.progress.injected.borrow()
                + *pace.progress.last_fragment.borrow()
                + pace.lead_allowance
                + PACING_EPSILON;

            if self.injected + duration <= limit {
                return true;
            }

            trace!(
                track = %self.track,
                injected = self.injected,
                limit,
                "pacing: waiting for partner progress"
            );

            let mut progress = pace.progress.injected.clone();
            tokio::select! {
                changed = progress.changed() => {
                    if changed.is_err() {
                        // Partner injector is gone (EOS or teardown); no
                        // further pacing is possible or needed.
                        return true;
                    }
                }
                () = self.cancel.cancelled() => return false,
            }
        }
    }

    /// Resolve the discontinuity barrier and push the downstream signal
    /// exactly once per pairing. Returns false on cancellation.
    async fn handle_discontinuity(&self, position: f64) -> bool {
        let Some(coordinator) = &self.coordinator else {
            // Best-effort tracks (subtitle) skip the barrier entirely.
            return true;
        };

        match coordinator.arrive(self.track).await {
            BarrierOutcome::Signal => {
                if self.sink.discontinuity(self.track) {
                    self.events
                        .publish(PlayerEvent::Discontinuity { position_secs: position });
                }
                true
            }
            BarrierOutcome::Follow => true,
            BarrierOutcome::Stalled => {
                match self.opts.stall_policy {
                    StallPolicy::Retune => {
                        self.events
                            .publish(PlayerEvent::RetuneRequired { track: self.track });
                    }
                    StallPolicy::Drop => {
                        debug!(track = %self.track, "dropping stalled discontinuity");
                    }
                }
                true
            }
            BarrierOutcome::Cancelled => false,
        }
    }
}
