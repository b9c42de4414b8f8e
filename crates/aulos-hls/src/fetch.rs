//! Playlist and fragment download plumbing over the [`Net`] seam.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use aulos_core::TrackType;
use aulos_net::{Headers, Net, RangeSpec};
use bytes::Bytes;
use tracing::{debug, trace};
use url::Url;

use crate::{playlist_cache::PlaylistCache, HlsError, HlsResult};

/// Resolve a possibly-relative URI against a base URL.
pub fn resolve_url(base: &Url, target: &str) -> HlsResult<Url> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Url::parse(target)
            .map_err(|e| HlsError::InvalidUrl(format!("invalid absolute URL {target}: {e}")));
    }
    base.join(target)
        .map_err(|e| HlsError::InvalidUrl(format!("failed to resolve {target}: {e}")))
}

/// Shared downloader for playlists and fragments.
#[derive(Clone)]
pub struct Downloader<N> {
    net: N,
    headers: Option<Headers>,
    playlist_cache: Arc<dyn PlaylistCache>,
}

impl<N: Net> Downloader<N> {
    pub fn new(net: N, playlist_cache: Arc<dyn PlaylistCache>) -> Self {
        Self {
            net,
            headers: None,
            playlist_cache,
        }
    }

    /// Set additional HTTP headers for all requests.
    #[must_use]
    pub fn with_headers(mut self, headers: Option<Headers>) -> Self {
        self.headers = headers;
        self
    }

    /// Fetch a playlist, consulting the playlist cache for non-live
    /// content.
    pub async fn fetch_playlist(
        &self,
        url: &Url,
        is_live: bool,
        track: TrackType,
    ) -> HlsResult<Bytes> {
        if !is_live {
            if let Some((body, _effective)) = self.playlist_cache.retrieve(url) {
                return Ok(body);
            }
        }

        trace!(url = %url, track = %track, "fetching playlist");
        let body = self
            .net
            .get_bytes(url.clone(), self.headers.clone(), None)
            .await?;

        self.playlist_cache.insert(url, &body, url, is_live, track);
        Ok(body)
    }

    /// Download one fragment (optionally a byte range), returning the
    /// bytes and elapsed wall time for throughput accounting.
    pub async fn fetch_fragment(
        &self,
        url: &Url,
        range: Option<RangeSpec>,
        timeout: Duration,
    ) -> HlsResult<(Bytes, Duration)> {
        let started = Instant::now();

        let bytes = match range {
            Some(range) => {
                self.net
                    .get_range(url.clone(), range, self.headers.clone(), Some(timeout))
                    .await?
            }
            None => {
                self.net
                    .get_bytes(url.clone(), self.headers.clone(), Some(timeout))
                    .await?
            }
        };

        let elapsed = started.elapsed();
        debug!(
            url = %url,
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "fragment downloaded"
        );
        Ok((bytes, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use aulos_net::mock::NetMock;
    use unimock::{matching, MockFn, Unimock};

    use super::*;
    use crate::playlist_cache::MemoryPlaylistCache;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn resolves_relative_and_absolute() {
        let base = url("http://cdn.example/path/master.m3u8");
        assert_eq!(
            resolve_url(&base, "v0/playlist.m3u8").unwrap().as_str(),
            "http://cdn.example/path/v0/playlist.m3u8"
        );
        assert_eq!(
            resolve_url(&base, "https://other.example/k").unwrap().as_str(),
            "https://other.example/k"
        );
    }

    #[tokio::test]
    async fn vod_playlist_fetched_once_then_cached() {
        let body = Bytes::from_static(b"#EXTM3U\n#EXT-X-ENDLIST\n");
        let mock = Unimock::new(
            NetMock::get_bytes
                .some_call(matching!(_, _, _))
                .returns(Ok(body.clone())),
        );
        let downloader = Downloader::new(mock, Arc::new(MemoryPlaylistCache::new()));
        let u = url("http://a/v.m3u8");

        let first = downloader
            .fetch_playlist(&u, false, TrackType::Video)
            .await
            .unwrap();
        // Second fetch must come from the cache (mock would panic on a
        // second network call).
        let second = downloader
            .fetch_playlist(&u, false, TrackType::Video)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn live_playlist_always_hits_network() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .each_call(matching!(_, _, _))
                .returns(Ok(Bytes::from_static(b"#EXTM3U\n"))),
        );
        let downloader = Downloader::new(mock, Arc::new(MemoryPlaylistCache::new()));
        let u = url("http://a/live.m3u8");

        downloader
            .fetch_playlist(&u, true, TrackType::Video)
            .await
            .unwrap();
        downloader
            .fetch_playlist(&u, true, TrackType::Video)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fragment_range_request_goes_through_get_range() {
        let mock = Unimock::new(
            NetMock::get_range
                .some_call(matching!(_, _, _, _))
                .returns(Ok(Bytes::from_static(b"0123456789"))),
        );
        let downloader = Downloader::new(mock, Arc::new(MemoryPlaylistCache::new()));

        let (bytes, _elapsed) = downloader
            .fetch_fragment(
                &url("http://a/all.ts"),
                Some(RangeSpec::new(100, 10)),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(bytes.len(), 10);
    }
}
