//! Bounded fragment cache between a track's fetcher and injector.
//!
//! Single producer, single consumer. `put` blocks while the cache is
//! full (with a lifecycle-derived timeout), `get` blocks while it is
//! empty unless end-of-stream is flagged, in which case it returns
//! `None` immediately so the consumer can detect EOS.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{HlsError, HlsResult};

/// One decrypted fragment waiting for injection.
///
/// Exclusively owned by the fetcher until handed off here, then by the
/// injector after `get`.
#[derive(Debug, Clone)]
pub struct CachedFragment {
    pub bytes: Bytes,
    /// Presentation position in seconds.
    pub position: f64,
    pub duration: f64,
    pub discontinuity: bool,
    /// Profile the fragment was fetched at.
    pub profile: usize,
}

struct CacheState {
    queue: VecDeque<CachedFragment>,
    eos: bool,
    /// Seconds of media currently held in the queue.
    cached_secs: f64,
    /// Seconds of media ever put, for buffer-health accounting.
    total_fetched_secs: f64,
}

/// Bounded per-track fragment buffer.
pub struct FragmentCache {
    capacity: usize,
    initial_cache_secs: f64,
    state: Mutex<CacheState>,
    not_full: Notify,
    not_empty: Notify,
    cancel: CancellationToken,
    caching_complete_tx: watch::Sender<bool>,
}

impl FragmentCache {
    pub fn new(capacity: usize, initial_cache_secs: f64, cancel: CancellationToken) -> Self {
        let (caching_complete_tx, _rx) = watch::channel(false);
        Self {
            capacity: capacity.max(1),
            initial_cache_secs,
            state: Mutex::new(CacheState {
                queue: VecDeque::new(),
                eos: false,
                cached_secs: 0.0,
                total_fetched_secs: 0.0,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            cancel,
            caching_complete_tx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupancy(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Seconds of media currently buffered.
    pub fn cached_secs(&self) -> f64 {
        self.state.lock().cached_secs
    }

    /// Seconds of media fetched over the cache's lifetime.
    pub fn total_fetched_secs(&self) -> f64 {
        self.state.lock().total_fetched_secs
    }

    /// Observer for the initial-caching-complete signal.
    pub fn caching_complete(&self) -> watch::Receiver<bool> {
        self.caching_complete_tx.subscribe()
    }

    /// Flag end of stream and wake a blocked consumer.
    pub fn set_eos(&self) {
        self.state.lock().eos = true;
        self.not_empty.notify_waiters();
        // A producer blocked on a full queue has nothing more to do
        // either.
        self.not_full.notify_waiters();
    }

    pub fn is_eos(&self) -> bool {
        self.state.lock().eos
    }

    /// Drop all cached fragments (profile switch / flush path).
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.cached_secs = 0.0;
        drop(state);
        self.not_full.notify_waiters();
    }

    /// Store a fragment, waiting up to `timeout` for a free slot.
    ///
    /// Returns `HlsError::CacheFull` on timeout so the caller can
    /// re-check abort conditions and retry; `HlsError::Cancelled` when
    /// the session is torn down.
    pub async fn put(&self, fragment: CachedFragment, timeout: Duration) -> HlsResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register for the wakeup before inspecting state so a
            // consumer's notify between check and await is not lost.
            let mut notified = std::pin::pin!(self.not_full.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.queue.len() < self.capacity {
                    state.cached_secs += fragment.duration;
                    state.total_fetched_secs += fragment.duration;
                    trace!(
                        occupancy = state.queue.len() + 1,
                        cached_secs = state.cached_secs,
                        "cache: fragment stored"
                    );
                    let full = state.queue.len() + 1 >= self.capacity;
                    let cached = state.cached_secs;
                    state.queue.push_back(fragment);
                    drop(state);

                    self.not_empty.notify_waiters();
                    self.maybe_signal_initial_caching(cached, full);
                    return Ok(());
                }
            }

            tokio::select! {
                () = &mut notified => {}
                () = self.cancel.cancelled() => return Err(HlsError::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Err(HlsError::CacheFull),
            }
        }
    }

    /// Take the next fragment.
    ///
    /// Blocks while the cache is empty; returns `None` once end of
    /// stream is flagged and the queue is drained, or on cancellation.
    pub async fn get(&self) -> Option<CachedFragment> {
        loop {
            let mut notified = std::pin::pin!(self.not_empty.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(fragment) = state.queue.pop_front() {
                    state.cached_secs = (state.cached_secs - fragment.duration).max(0.0);
                    drop(state);
                    self.not_full.notify_waiters();
                    return Some(fragment);
                }
                if state.eos {
                    return None;
                }
            }

            tokio::select! {
                () = &mut notified => {}
                () = self.cancel.cancelled() => return None,
            }
        }
    }

    /// Fire initial-caching-complete once the configured seconds are
    /// buffered, or the cache physically fills before reaching them
    /// (guards against a target buffer larger than the cache).
    fn maybe_signal_initial_caching(&self, cached_secs: f64, full: bool) {
        if *self.caching_complete_tx.borrow() {
            return;
        }
        if cached_secs >= self.initial_cache_secs || full {
            debug!(cached_secs, full, "cache: initial caching complete");
            let _ = self.caching_complete_tx.send(true);
        }
    }
}
