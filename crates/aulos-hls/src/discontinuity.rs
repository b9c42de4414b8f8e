//! Cross-track discontinuity barrier.
//!
//! Explicit state machine (`Free → WaitingOnOne → Both`) instead of ad
//! hoc mutex/condvar pairs, so the pairing logic is testable on its
//! own. Exactly one arriving track gets [`BarrierOutcome::Signal`] per
//! paired discontinuity; its partner gets [`BarrierOutcome::Follow`].

use std::time::Duration;

use aulos_core::TrackType;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What to do with a lone waiter once the stall window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallPolicy {
    /// Silently drop the discontinuity and continue.
    Drop,
    /// Release the waiter and ask the orchestrator to retune.
    Retune,
}

/// Outcome of a track arriving at the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// This track pushes the downstream discontinuity signal (exactly
    /// one per pairing).
    Signal,
    /// The partner already signals; continue without signaling.
    Follow,
    /// The partner never arrived within the stall window; the caller
    /// applies the configured [`StallPolicy`].
    Stalled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarrierState {
    Free,
    WaitingOnOne(TrackType),
    Both,
}

/// Barrier ensuring video and audio reach a matching discontinuity
/// before the downstream signal is issued once, not per track.
pub struct DiscontinuityCoordinator {
    state: Mutex<BarrierState>,
    notify: Notify,
    stall_window: Duration,
    /// Single physical track carrying both media: no real partner will
    /// ever arrive.
    muxed: bool,
    cancel: CancellationToken,
}

impl DiscontinuityCoordinator {
    pub fn new(stall_window: Duration, muxed: bool, cancel: CancellationToken) -> Self {
        Self {
            state: Mutex::new(BarrierState::Free),
            notify: Notify::new(),
            stall_window,
            muxed,
            cancel,
        }
    }

    /// Report that `track` reached a discontinuity boundary and wait for
    /// the pairing to resolve.
    pub async fn arrive(&self, track: TrackType) -> BarrierOutcome {
        if self.muxed {
            // Muxed stream: the discontinuity is broadcast for the
            // synthetic audio designation too, no partner required.
            return BarrierOutcome::Signal;
        }

        {
            let mut state = self.state.lock();
            match *state {
                BarrierState::Free => {
                    *state = BarrierState::WaitingOnOne(track);
                    debug!(track = %track, "discontinuity barrier: waiting for partner");
                }
                BarrierState::WaitingOnOne(waiting) if waiting != track => {
                    *state = BarrierState::Both;
                    drop(state);
                    self.notify.notify_waiters();
                    debug!(track = %track, "discontinuity barrier: pairing complete");
                    return BarrierOutcome::Follow;
                }
                BarrierState::WaitingOnOne(_) | BarrierState::Both => {
                    // Re-entry by the same track (or a late third call)
                    // must not deadlock the pipeline.
                    warn!(track = %track, "discontinuity barrier: unexpected re-entry");
                    return BarrierOutcome::Follow;
                }
            }
        }

        let deadline = tokio::time::Instant::now() + self.stall_window;

        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if *state == BarrierState::Both {
                    *state = BarrierState::Free;
                    return BarrierOutcome::Signal;
                }
            }

            tokio::select! {
                () = &mut notified => {}
                () = self.cancel.cancelled() => {
                    *self.state.lock() = BarrierState::Free;
                    return BarrierOutcome::Cancelled;
                }
                () = tokio::time::sleep_until(deadline) => {
                    warn!(track = %track, "discontinuity barrier: partner never arrived");
                    *self.state.lock() = BarrierState::Free;
                    return BarrierOutcome::Stalled;
                }
            }
        }
    }
}
