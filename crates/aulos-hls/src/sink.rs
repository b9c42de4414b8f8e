//! External sink consumed by the injectors.

use aulos_core::TrackType;
use bytes::Bytes;

/// Downstream elementary-stream sink (the playback pipeline).
///
/// Construction of the actual pipeline is out of scope; the injector
/// only needs these calls.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = StreamSinkMock))]
pub trait StreamSink: Send + Sync {
    /// Push one fragment. Returns false when the sink rejected it
    /// (e.g. a PTS error) — the fragment is discarded, not retried.
    fn send(&self, track: TrackType, data: Bytes, pts: f64, dts: f64, duration: f64) -> bool;

    /// Signal a timeline discontinuity. Returns true when the sink
    /// accepted it and the injector state machine should proceed.
    fn discontinuity(&self, track: TrackType) -> bool;

    /// Reset the sink to a new position/rate.
    fn flush(&self, position: f64, rate: f64);

    fn pause(&self, paused: bool);

    /// Back-pressure probe: true when the sink wants more data on this
    /// track.
    fn is_cache_empty(&self, track: TrackType) -> bool;

    /// Announce protection init data ahead of encrypted content.
    fn queue_protection_event(&self, system_id: [u8; 16], init_data: Bytes, track: TrackType);
}
