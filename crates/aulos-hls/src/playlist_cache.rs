//! External playlist cache contract plus a trivial in-memory default.

use std::collections::HashMap;

use aulos_core::TrackType;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;
use url::Url;

/// Playlist LRU contract (the cache itself is an external collaborator;
/// only its interface is fixed here).
pub trait PlaylistCache: Send + Sync {
    /// Returns the cached body and effective URL, if present.
    fn retrieve(&self, url: &Url) -> Option<(Bytes, Url)>;

    /// Store a playlist body. Live playlists are not cached.
    fn insert(&self, url: &Url, body: &Bytes, effective_url: &Url, is_live: bool, track: TrackType);
}

/// Unbounded in-memory implementation, good enough for tests and VOD
/// defaults.
#[derive(Default)]
pub struct MemoryPlaylistCache {
    entries: Mutex<HashMap<String, (Bytes, Url)>>,
}

impl MemoryPlaylistCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PlaylistCache for MemoryPlaylistCache {
    fn retrieve(&self, url: &Url) -> Option<(Bytes, Url)> {
        let entries = self.entries.lock();
        let (body, effective) = entries.get(url.as_str())?;
        trace!(url = %url, bytes = body.len(), "playlist cache hit");
        Some((body.clone(), effective.clone()))
    }

    fn insert(
        &self,
        url: &Url,
        body: &Bytes,
        effective_url: &Url,
        is_live: bool,
        _track: TrackType,
    ) {
        if is_live {
            return;
        }
        self.entries
            .lock()
            .insert(url.as_str().to_string(), (body.clone(), effective_url.clone()));
    }
}

/// Cache that never stores anything; used when refreshes must always
/// hit the network.
#[derive(Default)]
pub struct NoPlaylistCache;

impl PlaylistCache for NoPlaylistCache {
    fn retrieve(&self, _url: &Url) -> Option<(Bytes, Url)> {
        None
    }

    fn insert(&self, _url: &Url, _body: &Bytes, _effective: &Url, _is_live: bool, _track: TrackType) {}
}
