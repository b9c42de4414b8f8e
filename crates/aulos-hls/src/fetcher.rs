//! Per-track fragment fetch task.
//!
//! While downloads are enabled and the index yields a next fragment:
//! determine it (normal-rate position scan or iframe trick-play),
//! download it (byte-range aware), decrypt if encrypted, and store it
//! into the bounded fragment cache. Live playlist refresh scheduling
//! lives here too, paced by buffer headroom.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use aulos_abr::{ProfileSelector, SwitchDecision, SwitchReason, ThroughputSample};
use aulos_core::{TrackType, NORMAL_RATE};
use aulos_drm::{clearkey_init_data, DrmError, CLEARKEY_SYSTEM_ID};
use aulos_events::{EventBus, PlayerEvent};
use aulos_net::{Net, NetError, RangeSpec};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    cache::{CachedFragment, FragmentCache},
    fetch::{resolve_url, Downloader},
    index::{EncryptionMethod, PlaylistIndexer},
    options::HlsOptions,
    session::{DrmManager, LifecycleState},
    sink::StreamSink,
    HlsError, HlsResult,
};

/// Playlists whose window exceeds this are treated as DVR content for
/// discontinuity-pairing wait bounds.
const DVR_WINDOW_SECS: f64 = 60.0;

/// Backoff between retries of the same fragment.
const FAILURE_BACKOFF: Duration = Duration::from_millis(500);

/// Shared per-track playlist state: the index (per-track mutex) and a
/// refresh signal the partner track waits on during discontinuity
/// pairing.
pub struct TrackPlaylist {
    pub indexer: Mutex<PlaylistIndexer>,
    pub refresh_notify: Notify,
}

impl TrackPlaylist {
    pub fn new(indexer: PlaylistIndexer) -> Self {
        Self {
            indexer: Mutex::new(indexer),
            refresh_notify: Notify::new(),
        }
    }
}

/// IV for an AES-128 fragment: explicit from the key tag, else the
/// big-endian media sequence number in the low 8 bytes.
pub(crate) fn derive_iv(iv: Option<[u8; 16]>, sequence: u64) -> [u8; 16] {
    if let Some(iv) = iv {
        return iv;
    }
    let mut derived = [0u8; 16];
    derived[8..].copy_from_slice(&sequence.to_be_bytes());
    derived
}

/// Live refresh interval from buffer headroom: target-duration-scaled
/// while healthy, halved when the buffer dips below 2× target, clamped
/// to the floor when critically low, always capped at the ceiling.
pub(crate) fn refresh_interval(
    target_duration: f64,
    buffered_secs: f64,
    opts: &HlsOptions,
) -> Duration {
    let target = if target_duration > 0.0 {
        Duration::from_secs_f64(target_duration)
    } else {
        Duration::from_secs(2)
    };

    let interval = if buffered_secs > 2.0 * target_duration {
        target
    } else if buffered_secs > target_duration {
        target / 2
    } else {
        opts.refresh_floor
    };

    interval.clamp(opts.refresh_floor, opts.refresh_ceiling)
}

/// How a failed fragment download is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// 404/500/502/503/partial-file: immediate ABR rampdown, no
    /// file-level retry.
    RampDown,
    /// Timeout/connect: retry the same fragment at the same profile.
    Retry,
    /// Everything else: skip the fragment.
    Skip,
}

fn classify_failure(error: &HlsError) -> FailureKind {
    match error {
        HlsError::Net(net) => match net {
            NetError::HttpStatus { status, .. } if matches!(status, 404 | 500 | 502 | 503) => {
                FailureKind::RampDown
            }
            NetError::PartialFile { .. } => FailureKind::RampDown,
            NetError::Timeout | NetError::Connect(_) => FailureKind::Retry,
            _ => FailureKind::Skip,
        },
        _ => FailureKind::Skip,
    }
}

/// Everything needed to fetch one fragment, cloned out of the indexer
/// lock.
struct FragmentPlan {
    sequence: u64,
    uri: String,
    duration: f64,
    position: f64,
    byte_range: Option<RangeSpec>,
    program_date_time: Option<f64>,
    discontinuity: bool,
    key: Option<KeyPlan>,
}

struct KeyPlan {
    key_index: usize,
    method: EncryptionMethod,
    uri: Option<String>,
    iv: Option<[u8; 16]>,
}

enum Selection {
    Fragment(Box<FragmentPlan>),
    EndOfStream,
    NeedRefresh,
}

struct FetchState {
    position: f64,
    next_sequence: Option<u64>,
    consecutive_failures: u32,
    retries_this_fragment: u32,
    active_key_index: Option<usize>,
}

/// One track's fetch loop.
pub struct TrackFetcher<N> {
    track: TrackType,
    rate: f64,
    downloader: Downloader<N>,
    playlist_url: Url,
    playlist: Arc<TrackPlaylist>,
    peer: Option<Arc<TrackPlaylist>>,
    cache: Arc<FragmentCache>,
    drm: Option<Arc<DrmManager>>,
    abr: Option<Arc<Mutex<ProfileSelector>>>,
    profile_urls: Vec<Url>,
    sink: Option<Arc<dyn StreamSink>>,
    events: EventBus,
    opts: HlsOptions,
    cancel: CancellationToken,
    lifecycle: watch::Receiver<LifecycleState>,
    state: FetchState,
}

impl<N: Net> TrackFetcher<N> {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        track: TrackType,
        downloader: Downloader<N>,
        playlist_url: Url,
        playlist: Arc<TrackPlaylist>,
        cache: Arc<FragmentCache>,
        events: EventBus,
        opts: HlsOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (_tx, lifecycle) = watch::channel(LifecycleState::Playing);
        Self {
            track,
            rate: NORMAL_RATE,
            downloader,
            playlist_url,
            playlist,
            peer: None,
            cache,
            drm: None,
            abr: None,
            profile_urls: Vec::new(),
            sink: None,
            events,
            opts,
            cancel,
            lifecycle,
            state: FetchState {
                position: 0.0,
                next_sequence: None,
                consecutive_failures: 0,
                retries_this_fragment: 0,
                active_key_index: None,
            },
        }
    }

    /// Playback rate; anything but 1.0 switches to iframe trick-play
    /// selection.
    #[must_use]
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Starting position in seconds.
    #[must_use]
    pub fn with_start_position(mut self, position: f64) -> Self {
        self.state.position = position;
        self
    }

    /// Starting media sequence number (track alignment).
    #[must_use]
    pub fn with_start_sequence(mut self, sequence: u64) -> Self {
        self.state.next_sequence = Some(sequence);
        self
    }

    /// Partner track playlist for discontinuity pairing.
    #[must_use]
    pub fn with_peer(mut self, peer: Arc<TrackPlaylist>) -> Self {
        self.peer = Some(peer);
        self
    }

    #[must_use]
    pub fn with_drm(mut self, drm: Arc<DrmManager>) -> Self {
        self.drm = Some(drm);
        self
    }

    /// ABR selector plus the per-ladder-position media playlist URLs.
    #[must_use]
    pub fn with_abr(mut self, abr: Arc<Mutex<ProfileSelector>>, profile_urls: Vec<Url>) -> Self {
        self.abr = Some(abr);
        self.profile_urls = profile_urls;
        self
    }

    /// Sink for protection-event announcements.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: watch::Receiver<LifecycleState>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Run until end of stream, fatal failure, or cancellation.
    pub async fn run(mut self) {
        debug!(track = %self.track, rate = self.rate, "fetcher started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.select_next() {
                Selection::EndOfStream => {
                    debug!(track = %self.track, "fetcher reached end of stream");
                    self.cache.set_eos();
                    break;
                }
                Selection::NeedRefresh => {
                    if !self.refresh_cycle().await {
                        break;
                    }
                }
                Selection::Fragment(mut plan) => {
                    if plan.discontinuity && !self.confirm_discontinuity(&plan).await {
                        // Unpaired discontinuity: honoring it would stall
                        // the barrier, so it is dropped.
                        warn!(
                            track = %self.track,
                            sequence = plan.sequence,
                            "dropping unpaired discontinuity"
                        );
                        plan.discontinuity = false;
                    }

                    match self.fetch_one(&plan).await {
                        Ok(fragment) => {
                            if !self.store(fragment).await {
                                break;
                            }
                            self.advance(&plan);
                            self.consult_abr().await;
                        }
                        Err(error) => {
                            if !self.handle_failure(&plan, error).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        debug!(track = %self.track, "fetcher stopped");
    }

    // Selection

    fn select_next(&self) -> Selection {
        let guard = self.playlist.indexer.lock();
        let index = guard.index();

        if index.fragments.is_empty() {
            return if index.is_live() {
                Selection::NeedRefresh
            } else {
                Selection::EndOfStream
            };
        }

        let chosen = if self.rate == NORMAL_RATE {
            self.select_normal(index)
        } else {
            self.select_trick(index)
        };

        match chosen {
            Some(fragment_index) => {
                let fragment = &index.fragments[fragment_index];
                let key = fragment.key_index.and_then(|key_index| {
                    index.keys.get(key_index).map(|key| KeyPlan {
                        key_index,
                        method: key.method.clone(),
                        uri: key.uri.clone(),
                        iv: key.iv,
                    })
                });

                Selection::Fragment(Box::new(FragmentPlan {
                    sequence: fragment.sequence,
                    uri: index.fragment_uri(fragment).to_string(),
                    duration: fragment.duration,
                    position: fragment.position(),
                    byte_range: fragment.byte_range,
                    program_date_time: fragment.program_date_time,
                    discontinuity: fragment.discontinuity,
                    key,
                }))
            }
            None => {
                if self.rate != NORMAL_RATE {
                    // Trick-play boundary: rewound past the start or fast-
                    // forwarded past the last iframe fragment.
                    Selection::EndOfStream
                } else if index.is_live() {
                    Selection::NeedRefresh
                } else {
                    Selection::EndOfStream
                }
            }
        }
    }

    fn select_normal(&self, index: &crate::index::PlaylistIndex) -> Option<usize> {
        if let Some(sequence) = self.state.next_sequence {
            if let Some(found) = index.fragment_by_sequence(sequence) {
                return Some(found);
            }
            // Sequence rolled out of a sliding live window (or the index
            // was rebuilt for a new profile); fall back to position.
            trace!(
                track = %self.track,
                sequence,
                "sequence not in window, falling back to position scan"
            );
        }
        index.fragment_for_target(0, self.state.position, self.opts.position_epsilon)
    }

    fn select_trick(&self, index: &crate::index::PlaylistIndex) -> Option<usize> {
        if self.state.position < 0.0 || self.state.position >= index.total_duration {
            return None;
        }
        index.fragment_for_target(0, self.state.position, self.opts.position_epsilon)
    }

    fn advance(&mut self, plan: &FragmentPlan) {
        self.state.consecutive_failures = 0;
        self.state.retries_this_fragment = 0;

        if self.rate == NORMAL_RATE {
            self.state.position = plan.position + plan.duration;
            self.state.next_sequence = Some(plan.sequence + 1);
        } else {
            // Trick-play pacing: rate / fps seconds of content per
            // fetched fragment, negative while rewinding.
            self.state.position += self.rate / self.opts.trickplay_fps;
            self.state.next_sequence = None;
        }
    }

    // Download + decrypt

    async fn fetch_one(&mut self, plan: &FragmentPlan) -> HlsResult<CachedFragment> {
        let url = resolve_url(&self.playlist_url, &plan.uri)?;
        let timeout = self.download_timeout();

        let (bytes, elapsed) = self
            .downloader
            .fetch_fragment(&url, plan.byte_range, timeout)
            .await?;

        if let Some(abr) = &self.abr {
            abr.lock().push_throughput_sample(ThroughputSample {
                bytes: bytes.len() as u64,
                duration: elapsed,
                at: Instant::now(),
            });
        }

        let bytes = self.maybe_decrypt(plan, bytes).await?;

        Ok(CachedFragment {
            bytes,
            position: plan.position,
            duration: plan.duration,
            discontinuity: plan.discontinuity,
            profile: self.current_profile_index(),
        })
    }

    fn current_profile_index(&self) -> usize {
        self.abr
            .as_ref()
            .map(|abr| abr.lock().current().index)
            .unwrap_or(0)
    }

    /// Buffer-adaptive per-file timeout: generous while the buffer is
    /// comfortable, tightened when it is shrinking.
    fn download_timeout(&self) -> Duration {
        let target = {
            let guard = self.playlist.indexer.lock();
            guard.index().target_duration
        };
        if self.cache.cached_secs() >= 2.0 * target.max(1.0) {
            self.opts.fragment_timeout
        } else {
            self.opts.fragment_timeout_tight
        }
    }

    async fn maybe_decrypt(&mut self, plan: &FragmentPlan, bytes: Bytes) -> HlsResult<Bytes> {
        let Some(key) = &plan.key else {
            self.state.active_key_index = None;
            return Ok(bytes);
        };

        match key.method {
            EncryptionMethod::None => Ok(bytes),
            EncryptionMethod::Aes128 => self.decrypt_aes128(plan, key, bytes).await,
            EncryptionMethod::SampleAes | EncryptionMethod::Other(_) => {
                // Sample-level decryption happens downstream; pass the
                // payload through untouched.
                trace!(track = %self.track, "passing sample-encrypted fragment through");
                Ok(bytes)
            }
        }
    }

    async fn decrypt_aes128(
        &mut self,
        plan: &FragmentPlan,
        key: &KeyPlan,
        bytes: Bytes,
    ) -> HlsResult<Bytes> {
        let Some(drm) = self.drm.clone() else {
            return Err(HlsError::Drm(DrmError::MissingLicenseServer(
                "no DRM session manager attached".to_string(),
            )));
        };

        let key_uri = key.uri.as_ref().ok_or_else(|| {
            HlsError::Manifest("AES-128 key tag without URI".to_string())
        })?;
        let key_url = resolve_url(&self.playlist_url, key_uri)?;
        let init_data = clearkey_init_data(key_url.as_str());

        if self.state.active_key_index != Some(key.key_index) {
            // First fragment under this key: announce protection data
            // downstream and mark the metadata entry requested.
            if let Some(sink) = &self.sink {
                sink.queue_protection_event(
                    CLEARKEY_SYSTEM_ID,
                    Bytes::from(init_data.clone()),
                    self.track,
                );
            }
            self.playlist.indexer.lock().mark_key_requested(key.key_index);
        }

        let session = match drm.create_session(&init_data, None).await {
            Ok(session) => session,
            Err(error) => {
                self.events.publish(PlayerEvent::DrmFailed {
                    retryable: error.is_retryable(),
                    detail: error.to_string(),
                });
                return Err(HlsError::Drm(error));
            }
        };

        drm.set_primary(session.key(), true);
        self.state.active_key_index = Some(key.key_index);

        let iv = derive_iv(key.iv, plan.sequence);
        let decrypted = session.decrypt(&bytes, &iv).map_err(HlsError::Drm)?;
        Ok(Bytes::from(decrypted))
    }

    // Cache handoff

    async fn store(&self, fragment: CachedFragment) -> bool {
        let timeout = match *self.lifecycle.borrow() {
            LifecycleState::Preparing => self.opts.put_timeout_preparing,
            LifecycleState::Playing => self.opts.put_timeout,
        };

        loop {
            match self.cache.put(fragment.clone(), timeout).await {
                Ok(()) => return true,
                Err(HlsError::CacheFull) => {
                    // Re-check abort conditions, then keep waiting.
                    if self.cancel.is_cancelled() {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }
    }

    // Failure policy

    async fn handle_failure(&mut self, plan: &FragmentPlan, error: HlsError) -> bool {
        self.state.consecutive_failures += 1;

        warn!(
            track = %self.track,
            sequence = plan.sequence,
            consecutive = self.state.consecutive_failures,
            error = %error,
            "fragment fetch failed"
        );

        let status = match &error {
            HlsError::Net(net) => net.status_code(),
            _ => None,
        };
        self.events.publish(PlayerEvent::FragmentDownloadFailed {
            track: self.track,
            url: plan.uri.clone(),
            status,
        });

        if self.state.consecutive_failures > self.opts.download_failure_threshold {
            if self.track.failures_are_fatal() {
                self.events
                    .publish(PlayerEvent::DownloadThresholdExceeded { track: self.track });
                self.cache.set_eos();
                return false;
            }
            // Subtitle is best-effort: skip ahead and keep trying.
            self.state.consecutive_failures = 0;
            self.skip(plan);
            return true;
        }

        match classify_failure(&error) {
            FailureKind::RampDown => {
                self.state.retries_this_fragment = 0;
                if !self.try_ramp_down(SwitchReason::DownloadFailure).await {
                    // Already at the lowest profile (or no ABR): skip on
                    // subtitle, otherwise retry the same fragment after a
                    // short backoff.
                    if self.track == TrackType::Subtitle {
                        self.skip(plan);
                    }
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                }
            }
            FailureKind::Retry => {
                if self.state.retries_this_fragment < self.opts.fragment_retry_count {
                    self.state.retries_this_fragment += 1;
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                } else {
                    self.state.retries_this_fragment = 0;
                    if !self.try_ramp_down(SwitchReason::RepeatedTimeouts).await
                        && self.track == TrackType::Subtitle
                    {
                        self.skip(plan);
                    }
                }
            }
            FailureKind::Skip => {
                self.skip(plan);
            }
        }

        true
    }

    fn skip(&mut self, plan: &FragmentPlan) {
        self.state.position = plan.position + plan.duration;
        self.state.next_sequence = Some(plan.sequence + 1);
    }

    // ABR

    /// Direct rampdown path. Returns whether the profile changed.
    async fn try_ramp_down(&mut self, reason: SwitchReason) -> bool {
        let Some(abr) = self.abr.clone() else {
            return false;
        };

        let (from_bps, decision) = {
            let mut selector = abr.lock();
            let from_bps = selector.current().bandwidth_bps;
            (from_bps, selector.ramp_down(reason))
        };

        if decision.changed {
            self.apply_profile(from_bps, decision).await;
            true
        } else {
            false
        }
    }

    /// Steady-state ABR consultation after each stored fragment.
    async fn consult_abr(&mut self) {
        if self.rate != NORMAL_RATE {
            return;
        }
        let Some(abr) = self.abr.clone() else {
            return;
        };

        let (from_bps, decision) = {
            let mut selector = abr.lock();
            selector.note_fragment_success();
            let from_bps = selector.current().bandwidth_bps;
            (from_bps, selector.evaluate(self.cache.cached_secs()))
        };

        if decision.changed {
            self.apply_profile(from_bps, decision).await;
        }
    }

    /// Switch to a new profile: repoint the playlist URL, re-index, and
    /// announce the change exactly once.
    async fn apply_profile(&mut self, from_bps: u64, decision: SwitchDecision) {
        let Some(url) = self.profile_urls.get(decision.ladder_position).cloned() else {
            warn!(
                position = decision.ladder_position,
                "no playlist URL for profile, keeping current"
            );
            return;
        };

        debug!(
            track = %self.track,
            from_bps,
            to_bps = decision.bandwidth_bps,
            reason = ?decision.reason,
            "applying profile switch"
        );

        self.playlist_url = url;
        if let Err(error) = self.refresh_playlist().await {
            warn!(error = %error, "profile playlist fetch failed; will retry on next cycle");
        }

        self.events.publish(PlayerEvent::BitrateChanged {
            from_bps,
            to_bps: decision.bandwidth_bps,
            profile: decision.profile_index,
            reason: decision.reason,
        });
    }

    // Playlist refresh

    /// One live refresh cycle: sleep per buffer headroom, then refetch
    /// and re-index. Returns false only on cancellation.
    async fn refresh_cycle(&mut self) -> bool {
        let target = {
            let guard = self.playlist.indexer.lock();
            guard.index().target_duration
        };
        let interval = refresh_interval(target, self.cache.cached_secs(), &self.opts);

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = self.cancel.cancelled() => return false,
        }

        if let Err(error) = self.refresh_playlist().await {
            warn!(track = %self.track, error = %error, "playlist refresh failed");
        }
        true
    }

    async fn refresh_playlist(&self) -> HlsResult<()> {
        let is_live = {
            let guard = self.playlist.indexer.lock();
            let index = guard.index();
            index.fragments.is_empty() || index.is_live()
        };

        let body = self
            .downloader
            .fetch_playlist(&self.playlist_url, is_live, self.track)
            .await?;

        let fragments = {
            let mut guard = self.playlist.indexer.lock();
            guard.index_playlist(body)?;
            guard.index().fragments.len()
        };

        self.playlist.refresh_notify.notify_waiters();
        self.events.publish(PlayerEvent::PlaylistRefreshed {
            track: self.track,
            fragments,
        });
        Ok(())
    }

    // Discontinuity pairing

    /// Check the partner track has a discontinuity around the same
    /// program-date-time before honoring this one. Blocks (bounded by
    /// playlist-refresh cycles) when the partner has no playlist data
    /// yet at the live edge.
    async fn confirm_discontinuity(&self, plan: &FragmentPlan) -> bool {
        if self.rate != NORMAL_RATE {
            return true;
        }
        let Some(peer) = &self.peer else {
            return true;
        };
        let Some(pdt) = plan.program_date_time else {
            // Without a program-date-time there is nothing to compare;
            // honor the tag.
            return true;
        };

        let (is_live, window_secs, target) = {
            let guard = self.playlist.indexer.lock();
            let index = guard.index();
            (index.is_live(), index.total_duration, index.target_duration)
        };

        let wait_limit = if !is_live {
            0
        } else if window_secs >= DVR_WINDOW_SECS {
            self.opts.refresh_wait_limit_dvr
        } else {
            self.opts.refresh_wait_limit_live
        };

        for cycle in 0..=wait_limit {
            match self.peer_discontinuity_state(peer, pdt) {
                Some(paired) => return paired,
                None => {
                    if cycle == wait_limit {
                        break;
                    }
                    trace!(
                        track = %self.track,
                        cycle,
                        "waiting for peer playlist before discontinuity"
                    );
                    let wait = Duration::from_secs_f64(target.max(1.0));
                    let notified = peer.refresh_notify.notified();
                    tokio::select! {
                        () = notified => {}
                        () = tokio::time::sleep(wait) => {}
                        () = self.cancel.cancelled() => return false,
                    }
                }
            }
        }

        // Peer never produced usable data; treat as unpaired rather
        // than stalling playback.
        false
    }

    /// `Some(true)` when the peer has a matching marker, `Some(false)`
    /// when it demonstrably does not, `None` when its playlist cannot
    /// answer yet.
    fn peer_discontinuity_state(&self, peer: &TrackPlaylist, pdt: f64) -> Option<bool> {
        let guard = peer.indexer.lock();
        let index = guard.index();

        if index.fragments.is_empty() {
            return None;
        }
        if index.has_discontinuity_around(pdt, self.opts.discontinuity_tolerance_secs) {
            return Some(true);
        }

        // The peer can only rule the pairing out once its timeline
        // reaches the discontinuity region.
        let last_pdt = index
            .fragments
            .iter()
            .rev()
            .find_map(|f| f.program_date_time);
        match last_pdt {
            Some(last) if last + self.opts.discontinuity_tolerance_secs >= pdt => Some(false),
            Some(_) => None,
            // Peer carries no program-date-time at all; pairing cannot
            // be verified, tolerate the discontinuity.
            None => Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use aulos_core::PlaylistType;

    use super::*;
    use crate::index::IndexerOptions;

    #[test]
    fn derive_iv_prefers_explicit() {
        let explicit = [7u8; 16];
        assert_eq!(derive_iv(Some(explicit), 42), explicit);
    }

    #[test]
    fn derive_iv_uses_sequence() {
        let iv = derive_iv(None, 0x0102);
        assert_eq!(&iv[..8], &[0u8; 8]);
        assert_eq!(iv[14], 0x01);
        assert_eq!(iv[15], 0x02);
    }

    #[test]
    fn refresh_interval_scales_with_buffer() {
        let opts = HlsOptions::default();

        // Healthy: full target duration.
        assert_eq!(
            refresh_interval(4.0, 10.0, &opts),
            Duration::from_secs_f64(4.0)
        );
        // Between 1x and 2x target: halved.
        assert_eq!(
            refresh_interval(4.0, 6.0, &opts),
            Duration::from_secs_f64(2.0)
        );
        // Critical: clamped to the floor.
        assert_eq!(refresh_interval(4.0, 1.0, &opts), opts.refresh_floor);
        // Large target durations are capped at the ceiling.
        assert_eq!(refresh_interval(30.0, 100.0, &opts), opts.refresh_ceiling);
    }

    #[test]
    fn failure_classification() {
        let rampdown = HlsError::Net(NetError::http_status(503, "u"));
        assert_eq!(classify_failure(&rampdown), FailureKind::RampDown);

        let rampdown = HlsError::Net(NetError::http_status(404, "u"));
        assert_eq!(classify_failure(&rampdown), FailureKind::RampDown);

        let partial = HlsError::Net(NetError::PartialFile {
            expected: 10,
            got: 1,
            url: "u".into(),
        });
        assert_eq!(classify_failure(&partial), FailureKind::RampDown);

        let retry = HlsError::Net(NetError::Timeout);
        assert_eq!(classify_failure(&retry), FailureKind::Retry);

        let skip = HlsError::Manifest("x".into());
        assert_eq!(classify_failure(&skip), FailureKind::Skip);
    }

    #[test]
    fn peer_state_requires_timeline_coverage() {
        let opts = HlsOptions::default();
        let indexer = PlaylistIndexer::new(TrackType::Audio, IndexerOptions::default());
        let peer = TrackPlaylist::new(indexer);

        // Peer with PDT-less fragments tolerates the discontinuity.
        peer.indexer
            .lock()
            .index_playlist(bytes::Bytes::from(
                "#EXTM3U\n#EXTINF:4,\na.ts\n#EXT-X-ENDLIST\n",
            ))
            .unwrap();

        let net = aulos_net::HttpClient::new(aulos_net::NetOptions::default());
        let downloader = Downloader::new(net, Arc::new(crate::playlist_cache::MemoryPlaylistCache::new()));
        let fetcher = TrackFetcher::new(
            TrackType::Video,
            downloader,
            Url::parse("http://a/v.m3u8").unwrap(),
            Arc::new(TrackPlaylist::new(PlaylistIndexer::new(
                TrackType::Video,
                IndexerOptions::default(),
            ))),
            Arc::new(FragmentCache::new(4, 2.0, CancellationToken::new())),
            EventBus::default(),
            opts,
            CancellationToken::new(),
        );

        assert_eq!(fetcher.peer_discontinuity_state(&peer, 1000.0), Some(true));
    }

    #[test]
    fn select_trick_bounds() {
        let mut indexer = PlaylistIndexer::new(TrackType::Video, IndexerOptions::default());
        indexer
            .index_playlist(bytes::Bytes::from(
                "#EXTM3U\n#EXTINF:6,\na.ts\n#EXTINF:6,\nb.ts\n#EXT-X-ENDLIST\n",
            ))
            .unwrap();
        assert_eq!(indexer.index().effective_type(), PlaylistType::Vod);

        let net = aulos_net::HttpClient::new(aulos_net::NetOptions::default());
        let downloader = Downloader::new(net, Arc::new(crate::playlist_cache::MemoryPlaylistCache::new()));
        let mut fetcher = TrackFetcher::new(
            TrackType::Video,
            downloader,
            Url::parse("http://a/iframe.m3u8").unwrap(),
            Arc::new(TrackPlaylist::new(indexer)),
            Arc::new(FragmentCache::new(4, 2.0, CancellationToken::new())),
            EventBus::default(),
            HlsOptions::default(),
            CancellationToken::new(),
        )
        .with_rate(8.0);

        // In range selects the covering fragment.
        fetcher.state.position = 7.0;
        assert!(matches!(fetcher.select_next(), Selection::Fragment(_)));

        // Past either boundary is end of stream.
        fetcher.state.position = 12.5;
        assert!(matches!(fetcher.select_next(), Selection::EndOfStream));
        fetcher.state.position = -0.5;
        assert!(matches!(fetcher.select_next(), Selection::EndOfStream));
    }
}
