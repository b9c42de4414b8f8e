//! Playlist indexing: one linear scan over raw playlist text producing
//! an ordered fragment index plus side tables.
//!
//! The raw playlist body is retained as the arena; fragment descriptors
//! store `(offset, len)` spans into it instead of copying URIs, so a
//! refresh swaps the whole arena atomically and nothing dangles.

use std::time::{Duration, Instant};

use aulos_core::{PlaylistType, TrackType};
use aulos_drm::KeyDigest;
use aulos_net::RangeSpec;
use bytes::Bytes;
use rand::Rng;
use tracing::{debug, warn};

use crate::{
    tags::{parse_line, PlaylistLine, Tag},
    HlsError, HlsResult,
};

pub use crate::tags::EncryptionMethod;

/// One fragment from the index. Immutable once indexed; the whole array
/// is rebuilt on each playlist refresh.
#[derive(Debug, Clone)]
pub struct FragmentDescriptor {
    /// Media sequence number, strictly increasing within one playlist.
    pub sequence: u64,
    uri_offset: usize,
    uri_len: usize,
    /// Duration in seconds.
    pub duration: f64,
    /// Cumulative completion time from playlist start, monotonically
    /// non-decreasing.
    pub completion: f64,
    /// Index into the key-metadata table, `None` when clear.
    pub key_index: Option<usize>,
    pub byte_range: Option<RangeSpec>,
    /// Absolute program-date-time in epoch seconds, when tagged.
    pub program_date_time: Option<f64>,
    /// This fragment starts a new timeline.
    pub discontinuity: bool,
}

impl FragmentDescriptor {
    /// Start position of this fragment on the playlist timeline.
    pub fn position(&self) -> f64 {
        self.completion - self.duration
    }
}

/// Discontinuity position, recorded at the fragment *following* the tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscontinuityMarker {
    pub fragment_index: usize,
    pub position_secs: f64,
    pub program_date_time: Option<f64>,
}

/// One `#EXT-X-KEY` worth of metadata.
///
/// Entries persist across playlist refreshes while the same content
/// digest reappears, preserving the requested flag and any deferred
/// deadline.
#[derive(Debug, Clone)]
pub struct KeyMetadata {
    pub method: EncryptionMethod,
    /// Key URI as written in the playlist (possibly relative).
    pub uri: Option<String>,
    pub iv: Option<[u8; 16]>,
    /// Raw attribute text of the tag — the opaque key-request blob.
    pub blob: Bytes,
    /// Content identity of the blob.
    pub digest: KeyDigest,
    /// Do not request the key before this instant (request-storm
    /// avoidance); `None` means immediate.
    pub deferred_until: Option<Instant>,
    /// A license request has been issued for this entry.
    pub requested: bool,
}

/// The indexed playlist: fragment array plus side tables.
#[derive(Debug, Clone, Default)]
pub struct PlaylistIndex {
    arena: Bytes,
    pub fragments: Vec<FragmentDescriptor>,
    pub discontinuities: Vec<DiscontinuityMarker>,
    pub keys: Vec<KeyMetadata>,
    pub playlist_type: Option<PlaylistType>,
    pub media_sequence: u64,
    pub target_duration: f64,
    pub total_duration: f64,
    pub end_list: bool,
    /// Init segment URI (`#EXT-X-MAP`), fMP4 only.
    pub init_uri: Option<String>,
}

impl PlaylistIndex {
    /// Effective playlist type: explicit tag, else inferred from the
    /// end marker. An end marker always forces VOD.
    pub fn effective_type(&self) -> PlaylistType {
        if self.end_list {
            return PlaylistType::Vod;
        }
        self.playlist_type.unwrap_or(PlaylistType::Live)
    }

    pub fn is_live(&self) -> bool {
        self.effective_type().is_live()
    }

    /// URI text of a fragment, borrowed from the arena.
    pub fn fragment_uri(&self, fragment: &FragmentDescriptor) -> &str {
        // Spans are produced by the indexer from valid UTF-8 line
        // boundaries of the same arena.
        std::str::from_utf8(&self.arena[fragment.uri_offset..fragment.uri_offset + fragment.uri_len])
            .unwrap_or("")
    }

    /// Whether this fragment's payload is encrypted.
    pub fn fragment_encrypted(&self, fragment: &FragmentDescriptor) -> bool {
        fragment
            .key_index
            .and_then(|i| self.keys.get(i))
            .is_some_and(|k| !matches!(k.method, EncryptionMethod::None))
    }

    /// First fragment (at or after `start_hint`) covering `target`
    /// seconds, tolerant of float rounding.
    pub fn fragment_for_target(
        &self,
        start_hint: usize,
        target: f64,
        epsilon: f64,
    ) -> Option<usize> {
        for (offset, fragment) in self.fragments.iter().enumerate().skip(start_hint) {
            let position = fragment.position();
            if position + fragment.duration > target || (target - position) < epsilon {
                return Some(offset);
            }
        }
        None
    }

    /// Index of the fragment with this media sequence number.
    pub fn fragment_by_sequence(&self, sequence: u64) -> Option<usize> {
        if sequence < self.media_sequence {
            return None;
        }
        let offset = (sequence - self.media_sequence) as usize;
        (offset < self.fragments.len()).then_some(offset)
    }

    /// Whether any discontinuity marker has a program-date-time within
    /// `tolerance` seconds of `pdt`.
    pub fn has_discontinuity_around(&self, pdt: f64, tolerance: f64) -> bool {
        self.discontinuities
            .iter()
            .any(|m| m.program_date_time.is_some_and(|p| (p - pdt).abs() <= tolerance))
    }
}

/// Indexer options; see `HlsOptions` for the session-level knobs these
/// mirror.
#[derive(Clone, Debug)]
pub struct IndexerOptions {
    pub deferred_key_window: Duration,
    pub immediate_key_limit: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            deferred_key_window: Duration::from_secs(30),
            immediate_key_limit: 2,
        }
    }
}

/// Per-track playlist indexer.
pub struct PlaylistIndexer {
    track: TrackType,
    opts: IndexerOptions,
    index: PlaylistIndex,
    warned_missing_sequence: bool,
}

impl PlaylistIndexer {
    pub fn new(track: TrackType, opts: IndexerOptions) -> Self {
        Self {
            track,
            opts,
            index: PlaylistIndex::default(),
            warned_missing_sequence: false,
        }
    }

    pub fn index(&self) -> &PlaylistIndex {
        &self.index
    }

    /// Drop the current index and side tables.
    pub fn flush(&mut self) {
        self.index = PlaylistIndex::default();
    }

    /// Index a playlist body, replacing the previous index wholesale.
    ///
    /// Key-metadata entries whose digest reappears are carried over from
    /// the previous index with their requested flag and deferred
    /// deadline intact.
    pub fn index_playlist(&mut self, body: Bytes) -> HlsResult<()> {
        let text = std::str::from_utf8(&body)
            .map_err(|e| HlsError::Manifest(format!("playlist is not UTF-8: {e}")))?;

        let mut next = PlaylistIndex {
            arena: body.clone(),
            ..PlaylistIndex::default()
        };

        let mut saw_magic = false;
        let mut saw_sequence_tag = false;
        let mut pending_duration: Option<f64> = None;
        let mut pending_discontinuity = false;
        let mut pending_pdt: Option<f64> = None;
        let mut pending_range: Option<RangeSpec> = None;
        let mut last_range_end: u64 = 0;
        let mut current_key: Option<usize> = None;
        let mut cumulative = 0.0f64;
        let mut offset = 0usize;

        for raw_line in text.split_inclusive('\n') {
            let line_offset = offset;
            offset += raw_line.len();
            let line = raw_line.trim_end_matches('\n');

            let Some(parsed) = parse_line(line) else {
                continue;
            };

            if !saw_magic {
                // The first meaningful line must be the magic marker.
                match parsed {
                    PlaylistLine::Tag(Tag::ExtM3u) => {
                        saw_magic = true;
                        continue;
                    }
                    _ => {
                        return Err(HlsError::Manifest(
                            "playlist does not start with #EXTM3U".to_string(),
                        ));
                    }
                }
            }

            match parsed {
                PlaylistLine::Tag(Tag::ExtM3u) | PlaylistLine::Tag(Tag::Version(_)) => {}

                PlaylistLine::Tag(Tag::Inf { duration }) => {
                    pending_duration = Some(duration);
                }

                PlaylistLine::Tag(Tag::Discontinuity) => {
                    pending_discontinuity = true;
                }

                PlaylistLine::Tag(Tag::MediaSequence(sequence)) => {
                    saw_sequence_tag = true;
                    next.media_sequence = sequence;
                }

                PlaylistLine::Tag(Tag::TargetDuration(duration)) => {
                    next.target_duration = duration;
                }

                PlaylistLine::Tag(Tag::PlaylistType(ptype)) => {
                    next.playlist_type = Some(ptype);
                }

                PlaylistLine::Tag(Tag::EndList) => {
                    next.end_list = true;
                    // End marker forces VOD regardless of prior inference.
                    next.playlist_type = Some(PlaylistType::Vod);
                }

                PlaylistLine::Tag(Tag::ByteRange { len, offset: explicit }) => {
                    let start = explicit.unwrap_or(last_range_end);
                    last_range_end = start + len;
                    pending_range = Some(RangeSpec::new(start, len));
                }

                PlaylistLine::Tag(Tag::ProgramDateTime(epoch)) => {
                    pending_pdt = Some(epoch);
                }

                PlaylistLine::Tag(Tag::Map { uri }) => {
                    next.init_uri = Some(uri.to_string());
                }

                PlaylistLine::Tag(Tag::Key { method, uri, iv, raw }) => {
                    current_key = match method {
                        EncryptionMethod::None => None,
                        method => Some(self.intern_key(&mut next, method, uri, iv, raw)),
                    };
                }

                PlaylistLine::Tag(Tag::Unknown(tag)) => {
                    tracing::trace!(track = %self.track, tag, "ignoring unknown playlist tag");
                }

                PlaylistLine::Uri(uri) => {
                    let Some(duration) = pending_duration.take() else {
                        // URI without #EXTINF: not a media fragment line.
                        continue;
                    };

                    // Span of the URI text inside the (trimmed) line.
                    let trim_start = line.len() - line.trim_start().len();
                    let uri_offset = line_offset + trim_start;
                    let uri_len = uri.trim_end_matches('\r').len();

                    cumulative += duration;
                    let sequence = next.media_sequence + next.fragments.len() as u64;

                    if pending_discontinuity {
                        next.discontinuities.push(DiscontinuityMarker {
                            fragment_index: next.fragments.len(),
                            position_secs: cumulative - duration,
                            program_date_time: pending_pdt,
                        });
                    }

                    next.fragments.push(FragmentDescriptor {
                        sequence,
                        uri_offset,
                        uri_len,
                        duration,
                        completion: cumulative,
                        key_index: current_key,
                        byte_range: pending_range.take(),
                        program_date_time: pending_pdt.take(),
                        discontinuity: pending_discontinuity,
                    });
                    pending_discontinuity = false;
                }
            }
        }

        if !saw_magic {
            return Err(HlsError::Manifest("empty playlist".to_string()));
        }

        if !saw_sequence_tag && !next.fragments.is_empty() && !self.warned_missing_sequence {
            // Tolerated for Sling-like sources; sequence numbers start
            // at zero.
            warn!(
                track = %self.track,
                "playlist missing #EXT-X-MEDIA-SEQUENCE, defaulting to 0"
            );
            self.warned_missing_sequence = true;
        }

        next.total_duration = cumulative;

        debug!(
            track = %self.track,
            fragments = next.fragments.len(),
            discontinuities = next.discontinuities.len(),
            keys = next.keys.len(),
            total_duration = next.total_duration,
            playlist_type = ?next.effective_type(),
            "playlist indexed"
        );

        self.index = next;
        Ok(())
    }

    /// Dedup a key tag into the metadata table, carrying persistent
    /// state over from the previous index by content digest.
    fn intern_key(
        &self,
        next: &mut PlaylistIndex,
        method: EncryptionMethod,
        uri: Option<&str>,
        iv: Option<[u8; 16]>,
        raw: &str,
    ) -> usize {
        let blob = Bytes::copy_from_slice(raw.as_bytes());
        let digest = KeyDigest::from_blob(&blob);

        if let Some(existing) = next.keys.iter().position(|k| k.digest == digest) {
            return existing;
        }

        // Carry over the entry from the previous index if the same
        // digest was already known there.
        if let Some(previous) = self.index.keys.iter().find(|k| k.digest == digest) {
            next.keys.push(previous.clone());
            return next.keys.len() - 1;
        }

        // New entry. Once enough entries already map to immediate
        // key-changes, stagger further requests over a randomized
        // window to avoid license-request storms.
        let immediate_count = next
            .keys
            .iter()
            .filter(|k| k.deferred_until.is_none())
            .count();
        let deferred_until = if immediate_count > self.opts.immediate_key_limit {
            let window_ms = self.opts.deferred_key_window.as_millis().max(1) as u64;
            let jitter = rand::thread_rng().gen_range(0..window_ms);
            Some(Instant::now() + Duration::from_millis(jitter))
        } else {
            None
        };

        if deferred_until.is_some() {
            debug!(track = %self.track, key = %digest, "deferring key acquisition");
        }

        next.keys.push(KeyMetadata {
            method,
            uri: uri.map(str::to_string),
            iv,
            blob,
            digest,
            deferred_until,
            requested: false,
        });
        next.keys.len() - 1
    }

    /// Mark a key-metadata entry as requested.
    pub fn mark_key_requested(&mut self, key_index: usize) {
        if let Some(key) = self.index.keys.get_mut(key_index) {
            key.requested = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexer() -> PlaylistIndexer {
        PlaylistIndexer::new(TrackType::Video, IndexerOptions::default())
    }

    fn vod_playlist(fragments: usize, duration: f64) -> String {
        let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n");
        for i in 0..fragments {
            body.push_str(&format!("#EXTINF:{duration},\nsegment_{i}.ts\n"));
        }
        body.push_str("#EXT-X-ENDLIST\n");
        body
    }

    #[test]
    fn monotonic_index_invariant() {
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(vod_playlist(20, 6.0))).unwrap();

        let index = idx.index();
        for pair in index.fragments.windows(2) {
            assert!(pair[0].completion <= pair[1].completion);
            assert!(pair[0].sequence < pair[1].sequence);
        }
    }

    #[test]
    fn vod_inferred_from_endlist_without_type_tag() {
        // 10 fragments of 6s, ENDLIST present, no PLAYLIST-TYPE.
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(vod_playlist(10, 6.0))).unwrap();

        let index = idx.index();
        assert_eq!(index.effective_type(), PlaylistType::Vod);
        assert!(!index.is_live());
        assert!((index.total_duration - 60.0).abs() < 1e-9);
        assert_eq!(index.fragments.len(), 10);
    }

    #[test]
    fn endlist_forces_vod_over_event_type() {
        let body = "#EXTM3U\n#EXT-X-PLAYLIST-TYPE:EVENT\n#EXTINF:4,\na.ts\n#EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();
        assert_eq!(idx.index().effective_type(), PlaylistType::Vod);
    }

    #[test]
    fn missing_endlist_and_type_means_live() {
        let body = "#EXTM3U\n#EXTINF:4,\na.ts\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();
        assert!(idx.index().is_live());
    }

    #[test]
    fn missing_magic_marker_is_fatal() {
        let mut idx = indexer();
        let result = idx.index_playlist(Bytes::from("#EXT-X-TARGETDURATION:6\n"));
        assert!(matches!(result, Err(HlsError::Manifest(_))));
    }

    #[test]
    fn missing_media_sequence_defaults_to_zero() {
        let body = "#EXTM3U\n#EXTINF:4,\na.ts\n#EXTINF:4,\nb.ts\n#EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        assert_eq!(index.media_sequence, 0);
        assert_eq!(index.fragments[0].sequence, 0);
        assert_eq!(index.fragments[1].sequence, 1);
    }

    #[test]
    fn key_tag_runs_mark_fragments_encrypted() {
        let body = "#EXTM3U\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n\
                    #EXTINF:4,\nenc_0.ts\n\
                    #EXTINF:4,\nenc_1.ts\n\
                    #EXTINF:4,\nenc_2.ts\n\
                    #EXT-X-KEY:METHOD=NONE\n\
                    #EXTINF:4,\nclear_0.ts\n\
                    #EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        assert_eq!(index.fragments.len(), 4);
        for fragment in &index.fragments[..3] {
            assert!(fragment.key_index.is_some());
            assert!(index.fragment_encrypted(fragment));
        }
        assert!(index.fragments[3].key_index.is_none());
        assert!(!index.fragment_encrypted(&index.fragments[3]));
        assert_eq!(index.keys.len(), 1);
        assert_eq!(index.keys[0].uri.as_deref(), Some("k1"));
    }

    #[test]
    fn repeated_key_tags_dedup_by_digest() {
        let body = "#EXTM3U\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n\
                    #EXTINF:4,\na.ts\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n\
                    #EXTINF:4,\nb.ts\n\
                    #EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        assert_eq!(index.keys.len(), 1);
        assert_eq!(index.fragments[0].key_index, Some(0));
        assert_eq!(index.fragments[1].key_index, Some(0));
    }

    #[test]
    fn key_state_persists_across_refresh_by_digest() {
        let body = "#EXTM3U\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n\
                    #EXTINF:4,\na.ts\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();
        idx.mark_key_requested(0);

        // Refresh with the same key tag: requested flag carries over.
        let refreshed = "#EXTM3U\n\
                         #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n\
                         #EXTINF:4,\na.ts\n\
                         #EXTINF:4,\nb.ts\n";
        idx.index_playlist(Bytes::from(refreshed)).unwrap();
        assert!(idx.index().keys[0].requested);
    }

    #[test]
    fn discontinuity_marker_lands_on_next_fragment() {
        let body = "#EXTM3U\n\
                    #EXTINF:4,\na.ts\n\
                    #EXT-X-DISCONTINUITY\n\
                    #EXTINF:4,\nb.ts\n\
                    #EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        assert_eq!(index.discontinuities.len(), 1);
        let marker = index.discontinuities[0];
        assert_eq!(marker.fragment_index, 1);
        assert!((marker.position_secs - 4.0).abs() < 1e-9);
        assert!(!index.fragments[0].discontinuity);
        assert!(index.fragments[1].discontinuity);
    }

    #[test]
    fn byte_range_offsets_auto_continue() {
        let body = "#EXTM3U\n\
                    #EXT-X-BYTERANGE:1000@0\n\
                    #EXTINF:4,\nall.ts\n\
                    #EXT-X-BYTERANGE:2000\n\
                    #EXTINF:4,\nall.ts\n\
                    #EXT-X-BYTERANGE:500\n\
                    #EXTINF:4,\nall.ts\n\
                    #EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let ranges: Vec<RangeSpec> = idx
            .index()
            .fragments
            .iter()
            .map(|f| f.byte_range.unwrap())
            .collect();
        assert_eq!(ranges[0], RangeSpec::new(0, 1000));
        assert_eq!(ranges[1], RangeSpec::new(1000, 2000));
        assert_eq!(ranges[2], RangeSpec::new(3000, 500));
    }

    #[test]
    fn fragment_uris_are_arena_spans() {
        let body = vod_playlist(3, 4.0);
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        assert_eq!(index.fragment_uri(&index.fragments[0]), "segment_0.ts");
        assert_eq!(index.fragment_uri(&index.fragments[2]), "segment_2.ts");
    }

    #[test]
    fn flush_then_reindex_is_idempotent() {
        let body = vod_playlist(10, 6.0);
        let mut idx = indexer();

        idx.flush();
        idx.index_playlist(Bytes::from(body.clone())).unwrap();
        let first = (idx.index().fragments.len(), idx.index().total_duration);

        idx.flush();
        idx.index_playlist(Bytes::from(body)).unwrap();
        let second = (idx.index().fragments.len(), idx.index().total_duration);

        assert_eq!(first, second);
    }

    #[test]
    fn fragment_for_target_covers_position() {
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(vod_playlist(10, 6.0))).unwrap();
        let index = idx.index();

        assert_eq!(index.fragment_for_target(0, 0.0, 0.1), Some(0));
        assert_eq!(index.fragment_for_target(0, 5.9, 0.1), Some(0));
        assert_eq!(index.fragment_for_target(0, 6.05, 0.1), Some(1));
        assert_eq!(index.fragment_for_target(0, 31.0, 0.1), Some(5));
        // Past the end.
        assert_eq!(index.fragment_for_target(0, 61.0, 0.1), None);
        // Start hint skips earlier fragments.
        assert_eq!(index.fragment_for_target(3, 0.0, 0.1), Some(3));
    }

    #[test]
    fn fragment_by_sequence_respects_media_sequence() {
        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:100\n\
                    #EXTINF:4,\na.ts\n#EXTINF:4,\nb.ts\n#EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        assert_eq!(index.fragment_by_sequence(100), Some(0));
        assert_eq!(index.fragment_by_sequence(101), Some(1));
        assert_eq!(index.fragment_by_sequence(99), None);
        assert_eq!(index.fragment_by_sequence(102), None);
    }

    #[test]
    fn pdt_discontinuity_pairing_window() {
        let body = "#EXTM3U\n\
                    #EXTINF:4,\na.ts\n\
                    #EXT-X-DISCONTINUITY\n\
                    #EXT-X-PROGRAM-DATE-TIME:2021-01-01T00:10:00Z\n\
                    #EXTINF:4,\nb.ts\n\
                    #EXT-X-ENDLIST\n";
        let mut idx = indexer();
        idx.index_playlist(Bytes::from(body)).unwrap();

        let index = idx.index();
        let pdt = crate::tags::parse_program_date_time("2021-01-01T00:10:10Z").unwrap();
        assert!(index.has_discontinuity_around(pdt, 30.0));
        assert!(!index.has_discontinuity_around(pdt + 3600.0, 30.0));
    }

    #[test]
    fn deferred_deadline_assigned_past_immediate_limit() {
        let opts = IndexerOptions {
            immediate_key_limit: 1,
            deferred_key_window: Duration::from_secs(30),
        };
        let mut idx = PlaylistIndexer::new(TrackType::Video, opts);

        let body = "#EXTM3U\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n#EXTINF:4,\na.ts\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k2\"\n#EXTINF:4,\nb.ts\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"k3\"\n#EXTINF:4,\nc.ts\n\
                    #EXT-X-ENDLIST\n";
        idx.index_playlist(Bytes::from(body)).unwrap();

        let keys = &idx.index().keys;
        assert_eq!(keys.len(), 3);
        // First two are immediate; beyond the limit entries are staggered.
        assert!(keys[0].deferred_until.is_none());
        assert!(keys[1].deferred_until.is_none());
        assert!(keys[2].deferred_until.is_some());
    }
}
