//! Player session: owns the DRM session manager, the ABR selector, the
//! event bus, and the per-track fetch/inject tasks.

use std::sync::Arc;

use aulos_abr::{AbrOptions, ProfileSelector};
use aulos_core::{TrackType, NORMAL_RATE};
use aulos_drm::{DrmSessionManager, LicenseTransport};
use aulos_events::{EventBus, PlayerEvent, TuneFailure};
use aulos_net::Net;
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    cache::FragmentCache,
    discontinuity::DiscontinuityCoordinator,
    fetch::{resolve_url, Downloader},
    fetcher::{TrackFetcher, TrackPlaylist},
    index::{IndexerOptions, PlaylistIndex, PlaylistIndexer},
    injector::{InjectProgress, PaceTarget, TrackInjector},
    master::MasterPlaylist,
    options::HlsOptions,
    playlist_cache::{MemoryPlaylistCache, PlaylistCache},
    sink::StreamSink,
    HlsError, HlsResult,
};

/// DRM manager type used by the session (transport boxed so the session
/// is not generic over it).
pub type DrmManager = DrmSessionManager<Box<dyn LicenseTransport>>;

/// Session lifecycle, observed by fetchers for cache-put timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Tuned, still building the initial buffer.
    Preparing,
    Playing,
}

/// One playback session over one master playlist.
pub struct PlayerSession<N> {
    net: N,
    sink: Arc<dyn StreamSink>,
    drm: Arc<DrmManager>,
    abr_opts: AbrOptions,
    opts: HlsOptions,
    events: EventBus,
    playlist_cache: Arc<dyn PlaylistCache>,
    cancel: CancellationToken,
    lifecycle_tx: watch::Sender<LifecycleState>,
    tasks: Vec<JoinHandle<()>>,
}

impl<N> PlayerSession<N>
where
    N: Net + Clone + 'static,
{
    pub fn new(
        net: N,
        sink: Arc<dyn StreamSink>,
        drm: DrmManager,
        abr_opts: AbrOptions,
        opts: HlsOptions,
    ) -> Self {
        let (lifecycle_tx, _) = watch::channel(LifecycleState::Preparing);
        Self {
            net,
            sink,
            drm: Arc::new(drm),
            abr_opts,
            opts,
            events: EventBus::default(),
            playlist_cache: Arc::new(MemoryPlaylistCache::new()),
            cancel: CancellationToken::new(),
            lifecycle_tx,
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_playlist_cache(mut self, cache: Arc<dyn PlaylistCache>) -> Self {
        self.playlist_cache = cache;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn drm(&self) -> &Arc<DrmManager> {
        &self.drm
    }

    /// Tune to a master playlist and start the pipelines.
    pub async fn tune(&mut self, master_url: Url, rate: f64) -> HlsResult<()> {
        let downloader =
            Downloader::new(self.net.clone(), self.playlist_cache.clone());

        let body = downloader
            .fetch_playlist(&master_url, false, TrackType::Video)
            .await
            .map_err(|e| self.tune_failed(TuneFailure::Manifest(e.to_string()), e))?;
        let master = MasterPlaylist::parse(&body)
            .map_err(|e| self.tune_failed(TuneFailure::Manifest(e.to_string()), e))?;

        if master.variants.is_empty() {
            let error = HlsError::Manifest("master playlist has zero video profiles".to_string());
            return Err(self.tune_failed(TuneFailure::ZeroProfiles, error));
        }

        if rate == NORMAL_RATE {
            self.tune_normal(master_url, master, downloader).await
        } else {
            self.tune_trick_play(master_url, master, downloader, rate)
                .await
        }
    }

    /// Stop all tasks. Unblocks every wait (cache full/empty, pacing,
    /// discontinuity, refresh sleeps); DRM key waits are released via
    /// their own token so blocked decrypts end promptly too.
    pub async fn stop(&mut self) {
        debug!("session stopping");
        self.cancel.cancel();
        self.drm.key_wait_cancel().cancel();

        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.sink.pause(true);
        debug!("session stopped");
    }

    fn tune_failed(&self, reason: TuneFailure, error: HlsError) -> HlsError {
        warn!(?reason, error = %error, "tune failed");
        self.events.publish(PlayerEvent::TuneFailed { reason });
        error
    }

    fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            deferred_key_window: self.opts.deferred_key_window,
            immediate_key_limit: self.opts.immediate_key_limit,
        }
    }

    async fn load_track_playlist(
        &self,
        downloader: &Downloader<N>,
        track: TrackType,
        url: &Url,
    ) -> HlsResult<Arc<TrackPlaylist>> {
        let body = downloader.fetch_playlist(url, true, track).await?;
        let mut indexer = PlaylistIndexer::new(track, self.indexer_options());
        indexer.index_playlist(body)?;

        let playlist = Arc::new(TrackPlaylist::new(indexer));
        // Now that liveness is known, VOD playlists can be re-inserted
        // into the cache on the next natural fetch; no special handling
        // needed here.
        Ok(playlist)
    }

    async fn tune_normal(
        &mut self,
        master_url: Url,
        master: MasterPlaylist,
        downloader: Downloader<N>,
    ) -> HlsResult<()> {
        let selector = ProfileSelector::new(master.profiles(), self.abr_opts.clone());

        // Ladder-ordered media playlist URLs for profile switching.
        let profile_urls = selector
            .ladder()
            .iter()
            .map(|p| resolve_url(&master_url, &master.variants[p.index].uri))
            .collect::<HlsResult<Vec<Url>>>()?;
        let video_url = profile_urls[selector.ladder_position()].clone();
        let variant = &master.variants[selector.current().index];

        let video_playlist = self
            .load_track_playlist(&downloader, TrackType::Video, &video_url)
            .await
            .map_err(|e| self.tune_failed(TuneFailure::Manifest(e.to_string()), e))?;

        {
            let guard = video_playlist.indexer.lock();
            let index = guard.index();
            if !index.is_live() && index.total_duration <= 0.0 {
                drop(guard);
                let error = HlsError::Manifest("playlist has zero duration".to_string());
                return Err(self.tune_failed(TuneFailure::ZeroDuration, error));
            }
        }

        // Alternate audio rendition, when present and enabled.
        let audio_url = if self.opts.enable_audio {
            master
                .rendition_for(variant, TrackType::Audio)
                .and_then(|r| r.uri.as_deref())
                .map(|uri| resolve_url(&master_url, uri))
                .transpose()?
        } else {
            None
        };

        let audio_playlist = match &audio_url {
            Some(url) => Some(
                self.load_track_playlist(&downloader, TrackType::Audio, url)
                    .await
                    .map_err(|e| self.tune_failed(TuneFailure::Manifest(e.to_string()), e))?,
            ),
            None => None,
        };

        // Cross-track start alignment.
        let (video_start, audio_start) = match &audio_playlist {
            Some(audio) => {
                let video_guard = video_playlist.indexer.lock();
                let audio_guard = audio.indexer.lock();
                align_tracks(
                    video_guard.index(),
                    audio_guard.index(),
                    self.opts.discontinuity_tolerance_secs,
                )
                .map_err(|e| {
                    self.tune_failed(TuneFailure::TrackSync(e.to_string()), HlsError::TrackSync(e))
                })?
            }
            None => {
                let guard = video_playlist.indexer.lock();
                let start = guard.index().media_sequence;
                (start, 0)
            }
        };

        // Subtitle rendition is best-effort end to end: a failure here
        // only disables the track.
        let subtitle_playlist = if self.opts.enable_subtitle {
            match master
                .rendition_for(variant, TrackType::Subtitle)
                .and_then(|r| r.uri.as_deref())
                .map(|uri| resolve_url(&master_url, uri))
                .transpose()?
            {
                Some(url) => {
                    match self
                        .load_track_playlist(&downloader, TrackType::Subtitle, &url)
                        .await
                    {
                        Ok(playlist) => Some((playlist, url)),
                        Err(error) => {
                            warn!(error = %error, "subtitle playlist unavailable, disabling track");
                            None
                        }
                    }
                }
                None => None,
            }
        } else {
            None
        };

        info!(
            profiles = master.variants.len(),
            audio = audio_playlist.is_some(),
            subtitle = subtitle_playlist.is_some(),
            video_start,
            audio_start,
            "tuned"
        );

        // Shared machinery.
        let abr = Arc::new(Mutex::new(selector));
        let muxed = audio_playlist.is_none();
        let coordinator = Arc::new(DiscontinuityCoordinator::new(
            self.opts.discontinuity_stall_window,
            muxed,
            self.cancel.clone(),
        ));

        // Video pipeline.
        let video_cache = Arc::new(FragmentCache::new(
            self.opts.cache_fragments,
            self.opts.initial_cache_secs,
            self.cancel.clone(),
        ));

        let mut video_fetcher = TrackFetcher::new(
            TrackType::Video,
            downloader.clone(),
            video_url,
            video_playlist.clone(),
            video_cache.clone(),
            self.events.clone(),
            self.opts.clone(),
            self.cancel.clone(),
        )
        .with_abr(abr.clone(), profile_urls)
        .with_drm(self.drm.clone())
        .with_sink(self.sink.clone())
        .with_lifecycle(self.lifecycle_tx.subscribe())
        .with_start_sequence(video_start);
        if let Some(audio) = &audio_playlist {
            video_fetcher = video_fetcher.with_peer(audio.clone());
        }

        let video_injector = TrackInjector::new(
            TrackType::Video,
            video_cache.clone(),
            self.sink.clone(),
            self.events.clone(),
            self.opts.clone(),
            self.cancel.clone(),
        )
        .with_coordinator(coordinator.clone());
        let video_progress = video_injector.progress();

        self.tasks.push(tokio::spawn(video_fetcher.run()));
        self.tasks.push(tokio::spawn(video_injector.run()));

        // Audio pipeline.
        let mut audio_progress: Option<InjectProgress> = None;
        if let (Some(audio), Some(url)) = (&audio_playlist, &audio_url) {
            let audio_cache = Arc::new(FragmentCache::new(
                self.opts.cache_fragments,
                self.opts.initial_cache_secs,
                self.cancel.clone(),
            ));

            let audio_fetcher = TrackFetcher::new(
                TrackType::Audio,
                downloader.clone(),
                url.clone(),
                audio.clone(),
                audio_cache.clone(),
                self.events.clone(),
                self.opts.clone(),
                self.cancel.clone(),
            )
            .with_drm(self.drm.clone())
            .with_sink(self.sink.clone())
            .with_lifecycle(self.lifecycle_tx.subscribe())
            .with_peer(video_playlist.clone())
            .with_start_sequence(audio_start);

            let audio_injector = TrackInjector::new(
                TrackType::Audio,
                audio_cache.clone(),
                self.sink.clone(),
                self.events.clone(),
                self.opts.clone(),
                self.cancel.clone(),
            )
            .with_coordinator(coordinator.clone())
            .with_pace_target(PaceTarget {
                progress: video_progress.clone(),
                lead_allowance: 0.0,
            });
            audio_progress = Some(audio_injector.progress());

            self.tasks.push(tokio::spawn(audio_fetcher.run()));
            self.tasks.push(tokio::spawn(audio_injector.run()));
        }

        // Subtitle pipeline: paced against audio (or video when there is
        // no separate audio track), no discontinuity barrier.
        if let Some((playlist, url)) = subtitle_playlist {
            let subtitle_cache = Arc::new(FragmentCache::new(
                self.opts.cache_fragments,
                self.opts.initial_cache_secs,
                self.cancel.clone(),
            ));

            let subtitle_fetcher = TrackFetcher::new(
                TrackType::Subtitle,
                downloader.clone(),
                url,
                playlist,
                subtitle_cache.clone(),
                self.events.clone(),
                self.opts.clone(),
                self.cancel.clone(),
            )
            .with_lifecycle(self.lifecycle_tx.subscribe());

            let pace_progress = audio_progress.clone().unwrap_or_else(|| video_progress.clone());
            let subtitle_injector = TrackInjector::new(
                TrackType::Subtitle,
                subtitle_cache,
                self.sink.clone(),
                self.events.clone(),
                self.opts.clone(),
                self.cancel.clone(),
            )
            .with_pace_target(PaceTarget {
                progress: pace_progress,
                lead_allowance: self.opts.subtitle_lead_secs,
            });

            self.tasks.push(tokio::spawn(subtitle_fetcher.run()));
            self.tasks.push(tokio::spawn(subtitle_injector.run()));
        }

        // Initial-caching watcher: flips the lifecycle to Playing and
        // publishes the event once the video cache reports readiness.
        self.tasks.push(tokio::spawn(initial_caching_watcher(
            video_cache.clone(),
            self.events.clone(),
            self.lifecycle_tx.clone(),
            self.cancel.clone(),
        )));

        // Buffer-health monitor (normal rate only).
        let mut monitored = vec![(TrackType::Video, video_cache.clone(), video_progress.clone())];
        if let Some(progress) = audio_progress {
            // The audio cache is monitored through its progress only;
            // stall detection keys off video cache occupancy.
            monitored.push((TrackType::Audio, video_cache, progress));
        }
        self.tasks.push(tokio::spawn(stall_monitor(
            monitored,
            self.events.clone(),
            self.opts.clone(),
            self.cancel.clone(),
        )));

        self.sink.flush(0.0, NORMAL_RATE);
        Ok(())
    }

    /// Trick-play tune: iframe track only, no audio/subtitle, no ABR.
    async fn tune_trick_play(
        &mut self,
        master_url: Url,
        master: MasterPlaylist,
        downloader: Downloader<N>,
        rate: f64,
    ) -> HlsResult<()> {
        let Some(iframe) = master.iframe_variants.first() else {
            let error = HlsError::Manifest("no iframe track for trick-play".to_string());
            return Err(self.tune_failed(TuneFailure::Manifest(error.to_string()), error));
        };

        let iframe_url = resolve_url(&master_url, &iframe.uri)?;
        let playlist = self
            .load_track_playlist(&downloader, TrackType::IFrame, &iframe_url)
            .await
            .map_err(|e| self.tune_failed(TuneFailure::Manifest(e.to_string()), e))?;

        let cache = Arc::new(FragmentCache::new(
            self.opts.cache_fragments,
            self.opts.initial_cache_secs,
            self.cancel.clone(),
        ));

        let fetcher = TrackFetcher::new(
            TrackType::Video,
            downloader,
            iframe_url,
            playlist,
            cache.clone(),
            self.events.clone(),
            self.opts.clone(),
            self.cancel.clone(),
        )
        .with_rate(rate)
        .with_drm(self.drm.clone())
        .with_sink(self.sink.clone())
        .with_lifecycle(self.lifecycle_tx.subscribe());

        let injector = TrackInjector::new(
            TrackType::Video,
            cache,
            self.sink.clone(),
            self.events.clone(),
            self.opts.clone(),
            self.cancel.clone(),
        );

        info!(rate, "tuned for trick-play");
        self.tasks.push(tokio::spawn(fetcher.run()));
        self.tasks.push(tokio::spawn(injector.run()));

        self.sink.flush(0.0, rate);
        Ok(())
    }
}

/// Align video and audio start positions.
///
/// Prefers the media-sequence intersection; falls back to
/// program-date-time matching within `tolerance`. Returns
/// `(video_start_sequence, audio_start_sequence)` or an explanation of
/// why alignment is impossible (fatal for the tune).
fn align_tracks(
    video: &PlaylistIndex,
    audio: &PlaylistIndex,
    tolerance: f64,
) -> Result<(u64, u64), String> {
    if video.fragments.is_empty() || audio.fragments.is_empty() {
        return Err("empty track playlist".to_string());
    }

    let video_end = video.media_sequence + video.fragments.len() as u64 - 1;
    let audio_end = audio.media_sequence + audio.fragments.len() as u64 - 1;
    let start = video.media_sequence.max(audio.media_sequence);

    if start <= video_end && start <= audio_end {
        return Ok((start, start));
    }

    // Sequence spaces are disjoint; try program-date-time.
    let video_pdt = video.fragments.first().and_then(|f| f.program_date_time);
    if let Some(video_pdt) = video_pdt {
        let matched = audio
            .fragments
            .iter()
            .find(|f| f.program_date_time.is_some_and(|p| (p - video_pdt).abs() <= tolerance));
        if let Some(fragment) = matched {
            return Ok((video.media_sequence, fragment.sequence));
        }
    }

    Err(format!(
        "no common sequence range (video {}..={video_end}, audio {}..={audio_end}) and no matching program-date-time",
        video.media_sequence, audio.media_sequence
    ))
}

/// Publishes `InitialCachingComplete` and flips the lifecycle once the
/// video cache has buffered the configured minimum (or filled up).
async fn initial_caching_watcher(
    cache: Arc<FragmentCache>,
    events: EventBus,
    lifecycle: watch::Sender<LifecycleState>,
    cancel: CancellationToken,
) {
    let mut ready = cache.caching_complete();
    loop {
        if *ready.borrow_and_update() {
            break;
        }
        tokio::select! {
            changed = ready.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            () = cancel.cancelled() => return,
        }
    }

    let cached_secs = cache.cached_secs();
    debug!(cached_secs, "initial caching complete");
    let _ = lifecycle.send(LifecycleState::Playing);
    events.publish(PlayerEvent::InitialCachingComplete { cached_secs });
}

/// Stall detector: no injection progress while the cache sits empty for
/// longer than the stall timeout is reported as a stall (distinct from
/// hard failure — the caller decides retune vs. wait).
async fn stall_monitor(
    tracks: Vec<(TrackType, Arc<FragmentCache>, InjectProgress)>,
    events: EventBus,
    opts: HlsOptions,
    cancel: CancellationToken,
) {
    const POLL: std::time::Duration = std::time::Duration::from_secs(1);

    let mut last_progress: Vec<f64> = tracks.iter().map(|_| -1.0).collect();
    let mut stalled_for: Vec<std::time::Duration> = tracks.iter().map(|_| std::time::Duration::ZERO).collect();

    loop {
        tokio::select! {
            () = tokio::time::sleep(POLL) => {}
            () = cancel.cancelled() => return,
        }

        for (i, (track, cache, progress)) in tracks.iter().enumerate() {
            let injected = *progress.injected.borrow();
            let empty = cache.occupancy() == 0;

            if injected == last_progress[i] && empty && !cache.is_eos() {
                stalled_for[i] += POLL;
                if stalled_for[i] >= opts.stall_timeout {
                    warn!(track = %track, position = injected, "playback stalled");
                    events.publish(PlayerEvent::Stalled {
                        track: *track,
                        position_secs: injected,
                    });
                    stalled_for[i] = std::time::Duration::ZERO;
                }
            } else {
                stalled_for[i] = std::time::Duration::ZERO;
            }
            last_progress[i] = injected;
        }
    }
}

#[cfg(test)]
mod tests {
    use aulos_core::TrackType;
    use bytes::Bytes;

    use super::*;
    use crate::index::{IndexerOptions, PlaylistIndexer};

    fn index_of(track: TrackType, body: &str) -> PlaylistIndex {
        let mut indexer = PlaylistIndexer::new(track, IndexerOptions::default());
        indexer.index_playlist(Bytes::from(body.to_string())).unwrap();
        indexer.index().clone()
    }

    #[test]
    fn align_by_sequence_intersection() {
        let video = index_of(
            TrackType::Video,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:100\n#EXTINF:4,\na.ts\n#EXTINF:4,\nb.ts\n#EXTINF:4,\nc.ts\n",
        );
        let audio = index_of(
            TrackType::Audio,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:101\n#EXTINF:4,\na.aac\n#EXTINF:4,\nb.aac\n",
        );

        let (v, a) = align_tracks(&video, &audio, 30.0).unwrap();
        assert_eq!(v, 101);
        assert_eq!(a, 101);
    }

    #[test]
    fn align_by_program_date_time_when_sequences_disjoint() {
        let video = index_of(
            TrackType::Video,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:10\n\
             #EXT-X-PROGRAM-DATE-TIME:2021-01-01T00:00:00Z\n#EXTINF:4,\na.ts\n",
        );
        let audio = index_of(
            TrackType::Audio,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:9000\n\
             #EXT-X-PROGRAM-DATE-TIME:2021-01-01T00:00:02Z\n#EXTINF:4,\na.aac\n",
        );

        let (v, a) = align_tracks(&video, &audio, 30.0).unwrap();
        assert_eq!(v, 10);
        assert_eq!(a, 9000);
    }

    #[test]
    fn alignment_failure_is_reported() {
        let video = index_of(
            TrackType::Video,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:10\n#EXTINF:4,\na.ts\n",
        );
        let audio = index_of(
            TrackType::Audio,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:9000\n#EXTINF:4,\na.aac\n",
        );

        assert!(align_tracks(&video, &audio, 30.0).is_err());
    }
}
