//! End-to-end pipeline tests: tune → fetch → (decrypt) → inject against
//! a local origin server and a recording sink.

mod fixture;

use std::{sync::Arc, time::Duration};

use aulos_abr::{AbrOptions, SwitchReason};
use aulos_core::TrackType;
use aulos_drm::{DrmOptions, DrmSessionManager, HttpLicenseTransport, LicenseTransport};
use aulos_events::PlayerEvent;
use aulos_hls::{HlsOptions, PlayerSession};
use aulos_net::{HttpClient, NetOptions};
use axum::{http::StatusCode, Router};
use fixture::{
    encrypt_payload, serve_bytes, serve_bytes_post, serve_status, serve_text, vod_media_playlist,
    RecordingSink, TestServer,
};
use tokio::sync::broadcast;

const TEST_TIMEOUT: Duration = Duration::from_secs(15);

fn drm_manager() -> DrmSessionManager<Box<dyn LicenseTransport>> {
    let transport: Box<dyn LicenseTransport> = Box::new(HttpLicenseTransport::new(None));
    DrmSessionManager::new(transport, DrmOptions::default())
}

fn session(
    sink: Arc<RecordingSink>,
    abr: AbrOptions,
    opts: HlsOptions,
) -> PlayerSession<HttpClient> {
    let net = HttpClient::new(NetOptions::default());
    PlayerSession::new(net, sink, drm_manager(), abr, opts)
}

/// Wait for a matching event or panic on timeout.
async fn wait_for_event<F>(rx: &mut broadcast::Receiver<PlayerEvent>, mut matches: F) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn clear_vod_router() -> Router {
    let media = vod_media_playlist(&[("seg_0.ts", 6.0), ("seg_1.ts", 6.0), ("seg_2.ts", 6.0)]);
    let master = "#EXTM3U\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=1280000,CODECS=\"avc1.42c01e\"\n\
                  media.m3u8\n"
        .to_string();

    Router::new()
        .route("/master.m3u8", serve_text(master))
        .route("/media.m3u8", serve_text(media))
        .route("/seg_0.ts", serve_bytes(b"FRAGMENT-0".to_vec()))
        .route("/seg_1.ts", serve_bytes(b"FRAGMENT-1".to_vec()))
        .route("/seg_2.ts", serve_bytes(b"FRAGMENT-2".to_vec()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clear_vod_plays_to_end_of_stream() {
    let server = TestServer::start(clear_vod_router()).await;
    let sink = Arc::new(RecordingSink::new());

    let mut player = session(sink.clone(), AbrOptions::default(), HlsOptions::default());
    let mut events = player.events().subscribe();

    player
        .tune(server.url("/master.m3u8"), 1.0)
        .await
        .expect("tune failed");

    wait_for_event(&mut events, |e| {
        matches!(
            e,
            PlayerEvent::EndOfStream {
                track: TrackType::Video
            }
        )
    })
    .await;
    player.stop().await;

    let sent = sink.sent_for(TrackType::Video);
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].data.as_ref(), b"FRAGMENT-0");
    assert_eq!(sent[2].data.as_ref(), b"FRAGMENT-2");

    // Fragments injected strictly in ascending playlist order.
    for pair in sent.windows(2) {
        assert!(pair[0].pts < pair[1].pts);
    }

    // Each segment downloaded exactly once.
    assert_eq!(server.request_count("/seg_0.ts"), 1);
    assert_eq!(server.request_count("/seg_1.ts"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initial_caching_complete_fires_before_eos() {
    let server = TestServer::start(clear_vod_router()).await;
    let sink = Arc::new(RecordingSink::new());

    let mut player = session(sink, AbrOptions::default(), HlsOptions::default());
    let mut events = player.events().subscribe();

    player.tune(server.url("/master.m3u8"), 1.0).await.unwrap();

    let event = wait_for_event(&mut events, |e| {
        matches!(e, PlayerEvent::InitialCachingComplete { .. })
    })
    .await;
    if let PlayerEvent::InitialCachingComplete { cached_secs } = event {
        assert!(cached_secs >= 2.0);
    }

    player.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encrypted_vod_is_decrypted_with_one_key_request() {
    let key = [0x42u8; 16];
    let iv = [0x01u8; 16];

    let seg0 = encrypt_payload(b"SECRET-FRAGMENT-0", &key, &iv);
    let seg1 = encrypt_payload(b"SECRET-FRAGMENT-1", &key, &iv);

    let media = "#EXTM3U\n\
                 #EXT-X-VERSION:6\n\
                 #EXT-X-TARGETDURATION:6\n\
                 #EXT-X-MEDIA-SEQUENCE:0\n\
                 #EXT-X-PLAYLIST-TYPE:VOD\n\
                 #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x01010101010101010101010101010101\n\
                 #EXTINF:6,\nseg_0.ts\n\
                 #EXTINF:6,\nseg_1.ts\n\
                 #EXT-X-ENDLIST\n"
        .to_string();
    let master = "#EXTM3U\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=1280000\n\
                  media.m3u8\n"
        .to_string();

    let app = Router::new()
        .route("/master.m3u8", serve_text(master))
        .route("/media.m3u8", serve_text(media))
        .route("/seg_0.ts", serve_bytes(seg0))
        .route("/seg_1.ts", serve_bytes(seg1))
        // License exchange POSTs to the key URL and receives the content
        // key in the response body.
        .route("/key.bin", serve_bytes_post(key.to_vec()));

    let server = TestServer::start(app).await;
    let sink = Arc::new(RecordingSink::new());

    let mut player = session(sink.clone(), AbrOptions::default(), HlsOptions::default());
    let mut events = player.events().subscribe();

    player.tune(server.url("/master.m3u8"), 1.0).await.unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, PlayerEvent::EndOfStream { .. })
    })
    .await;
    player.stop().await;

    let sent = sink.sent_for(TrackType::Video);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].data.as_ref(), b"SECRET-FRAGMENT-0");
    assert_eq!(sent[1].data.as_ref(), b"SECRET-FRAGMENT-1");

    // Session dedup: one license request for two encrypted fragments.
    assert_eq!(server.request_count("/key.bin"), 1);

    // Protection data announced downstream before encrypted content.
    assert!(!sink.protection_events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_503_triggers_single_rampdown_event() {
    let lo_media = vod_media_playlist(&[("lo_0.ts", 6.0), ("lo_1.ts", 6.0)]);
    let hi_media = vod_media_playlist(&[("hi_0.ts", 6.0), ("hi_1.ts", 6.0)]);
    let master = "#EXTM3U\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=500000\n\
                  lo.m3u8\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=2000000\n\
                  hi.m3u8\n"
        .to_string();

    let app = Router::new()
        .route("/master.m3u8", serve_text(master))
        .route("/lo.m3u8", serve_text(lo_media))
        .route("/hi.m3u8", serve_text(hi_media))
        .route("/lo_0.ts", serve_bytes(b"LO-0".to_vec()))
        .route("/lo_1.ts", serve_bytes(b"LO-1".to_vec()))
        // The high profile's segments are persistently unavailable.
        .route("/hi_0.ts", serve_status(StatusCode::SERVICE_UNAVAILABLE))
        .route("/hi_1.ts", serve_status(StatusCode::SERVICE_UNAVAILABLE));

    let server = TestServer::start(app).await;
    let sink = Arc::new(RecordingSink::new());

    // Start at the top profile so the 503 forces a rampdown; suppress
    // any later bandwidth-driven rampup.
    let abr = AbrOptions {
        initial_position: Some(1),
        consistency_ignore_count: u32::MAX,
        ..AbrOptions::default()
    };
    let mut player = session(sink.clone(), abr, HlsOptions::default());
    let mut events = player.events().subscribe();

    player.tune(server.url("/master.m3u8"), 1.0).await.unwrap();

    let event = wait_for_event(&mut events, |e| {
        matches!(e, PlayerEvent::BitrateChanged { .. })
    })
    .await;
    let PlayerEvent::BitrateChanged {
        from_bps,
        to_bps,
        reason,
        ..
    } = event
    else {
        unreachable!();
    };

    // Rampdown, strictly decreasing bitrate, with the failure reason.
    assert_eq!(from_bps, 2_000_000);
    assert_eq!(to_bps, 500_000);
    assert_eq!(reason, SwitchReason::DownloadFailure);

    // Count further bitrate changes while draining to end of stream.
    let mut extra_changes = 0;
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match events.recv().await.expect("event bus closed") {
                PlayerEvent::BitrateChanged { .. } => extra_changes += 1,
                PlayerEvent::EndOfStream { .. } => break,
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for end of stream");
    player.stop().await;

    assert_eq!(extra_changes, 0, "rampdown event must fire exactly once");

    // Playback completed from the low profile.
    let sent = sink.sent_for(TrackType::Video);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].data.as_ref(), b"LO-0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn master_without_variants_fails_tune() {
    let app = Router::new().route("/master.m3u8", serve_text("#EXTM3U\n".to_string()));
    let server = TestServer::start(app).await;
    let sink = Arc::new(RecordingSink::new());

    let mut player = session(sink, AbrOptions::default(), HlsOptions::default());
    let mut events = player.events().subscribe();

    let result = player.tune(server.url("/master.m3u8"), 1.0).await;
    assert!(result.is_err());

    let event = wait_for_event(&mut events, |e| matches!(e, PlayerEvent::TuneFailed { .. })).await;
    assert!(matches!(
        event,
        PlayerEvent::TuneFailed {
            reason: aulos_events::TuneFailure::ZeroProfiles
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paired_discontinuity_reaches_sink_once() {
    // Video and audio playlists with a matching discontinuity; the sink
    // must see exactly one discontinuity signal.
    let video_media = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n\
                       #EXT-X-PLAYLIST-TYPE:VOD\n\
                       #EXTINF:6,\nv_0.ts\n\
                       #EXT-X-DISCONTINUITY\n\
                       #EXTINF:6,\nv_1.ts\n\
                       #EXT-X-ENDLIST\n"
        .to_string();
    let audio_media = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n\
                       #EXT-X-PLAYLIST-TYPE:VOD\n\
                       #EXTINF:6,\na_0.aac\n\
                       #EXT-X-DISCONTINUITY\n\
                       #EXTINF:6,\na_1.aac\n\
                       #EXT-X-ENDLIST\n"
        .to_string();
    let master = "#EXTM3U\n\
                  #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"en\",DEFAULT=YES,URI=\"audio.m3u8\"\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=1280000,AUDIO=\"aud\"\n\
                  video.m3u8\n"
        .to_string();

    let app = Router::new()
        .route("/master.m3u8", serve_text(master))
        .route("/video.m3u8", serve_text(video_media))
        .route("/audio.m3u8", serve_text(audio_media))
        .route("/v_0.ts", serve_bytes(b"V0".to_vec()))
        .route("/v_1.ts", serve_bytes(b"V1".to_vec()))
        .route("/a_0.aac", serve_bytes(b"A0".to_vec()))
        .route("/a_1.aac", serve_bytes(b"A1".to_vec()));

    let server = TestServer::start(app).await;
    let sink = Arc::new(RecordingSink::new());

    let mut player = session(sink.clone(), AbrOptions::default(), HlsOptions::default());
    let mut events = player.events().subscribe();

    player.tune(server.url("/master.m3u8"), 1.0).await.unwrap();

    // Both tracks reach end of stream (events arrive in either order).
    let mut video_done = false;
    let mut audio_done = false;
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !(video_done && audio_done) {
            match events.recv().await.expect("event bus closed") {
                PlayerEvent::EndOfStream {
                    track: TrackType::Video,
                } => video_done = true,
                PlayerEvent::EndOfStream {
                    track: TrackType::Audio,
                } => audio_done = true,
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for both tracks");
    player.stop().await;

    assert_eq!(sink.sent_for(TrackType::Video).len(), 2);
    assert_eq!(sink.sent_for(TrackType::Audio).len(), 2);
    assert_eq!(
        sink.discontinuities().len(),
        1,
        "paired discontinuity must be signaled downstream exactly once"
    );
}
