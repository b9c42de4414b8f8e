//! Shared test fixtures: an axum-backed origin server with per-path
//! request counters and a recording sink.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use aulos_core::TrackType;
use aulos_hls::StreamSink;
use axum::{
    http::StatusCode,
    routing::{get, post, MethodRouter},
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use url::Url;

/// GET route serving a fixed text body.
pub fn serve_text(body: String) -> MethodRouter {
    get(move || {
        let body = body.clone();
        async move { body }
    })
}

/// GET route serving fixed bytes.
pub fn serve_bytes(body: Vec<u8>) -> MethodRouter {
    get(move || {
        let body = body.clone();
        async move { body }
    })
}

/// POST route serving fixed bytes (license/key endpoints).
pub fn serve_bytes_post(body: Vec<u8>) -> MethodRouter {
    post(move || {
        let body = body.clone();
        async move { body }
    })
}

/// GET route answering with a bare status code.
pub fn serve_status(status: StatusCode) -> MethodRouter {
    get(move || async move { status })
}

pub struct TestServer {
    base_url: String,
    request_counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    /// Serve `app` on an ephemeral port, counting requests per path.
    pub async fn start(app: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}", addr.port());

        let request_counts = Arc::new(Mutex::new(HashMap::new()));
        let counts = request_counts.clone();

        let app = app.layer(axum::middleware::from_fn(
            move |req: axum::extract::Request, next: axum::middleware::Next| {
            let counts = counts.clone();
            async move {
                let path = req.uri().path().to_string();
                if let Ok(mut counts) = counts.lock() {
                    *counts.entry(path).or_insert(0) += 1;
                }
                next.run(req).await
            }
            },
        ));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            request_counts,
        }
    }

    pub fn url(&self, path: &str) -> Url {
        format!("{}{}", self.base_url, path).parse().unwrap()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.request_counts
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

/// Sink that records everything pushed into it and never back-pressures.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentFragment>>,
    discontinuities: Mutex<Vec<TrackType>>,
    protection_events: Mutex<Vec<[u8; 16]>>,
}

#[derive(Debug, Clone)]
pub struct SentFragment {
    pub track: TrackType,
    pub data: Bytes,
    pub pts: f64,
    pub duration: f64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentFragment> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_for(&self, track: TrackType) -> Vec<SentFragment> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.track == track)
            .cloned()
            .collect()
    }

    pub fn discontinuities(&self) -> Vec<TrackType> {
        self.discontinuities.lock().unwrap().clone()
    }

    pub fn protection_events(&self) -> Vec<[u8; 16]> {
        self.protection_events.lock().unwrap().clone()
    }
}

impl StreamSink for RecordingSink {
    fn send(&self, track: TrackType, data: Bytes, pts: f64, _dts: f64, duration: f64) -> bool {
        self.sent.lock().unwrap().push(SentFragment {
            track,
            data,
            pts,
            duration,
        });
        true
    }

    fn discontinuity(&self, track: TrackType) -> bool {
        self.discontinuities.lock().unwrap().push(track);
        true
    }

    fn flush(&self, _position: f64, _rate: f64) {}

    fn pause(&self, _paused: bool) {}

    fn is_cache_empty(&self, _track: TrackType) -> bool {
        true
    }

    fn queue_protection_event(&self, system_id: [u8; 16], _init_data: Bytes, _track: TrackType) {
        self.protection_events.lock().unwrap().push(system_id);
    }
}

/// AES-128-CBC + PKCS7 encrypt, for building encrypted fixtures.
pub fn encrypt_payload(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    use aes::Aes128;
    use cbc::{
        cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit},
        Encryptor,
    };

    let padded_len = plaintext.len() + (16 - plaintext.len() % 16);
    let mut buf = vec![0u8; padded_len];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    Encryptor::<Aes128>::new(key.into(), iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .expect("encrypt_padded_mut failed")
        .to_vec()
}

pub fn vod_media_playlist(segments: &[(&str, f64)]) -> String {
    let mut body = String::from("#EXTM3U\n#EXT-X-VERSION:6\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n");
    for (uri, duration) in segments {
        body.push_str(&format!("#EXTINF:{duration},\n{uri}\n"));
    }
    body.push_str("#EXT-X-ENDLIST\n");
    body
}
