#![forbid(unsafe_code)]

//! HLS playlist state machine and multi-track fragment pipeline.
//!
//! The flow, leaf to root:
//! - [`PlaylistIndexer`] turns raw playlist text into an arena-backed
//!   fragment index with discontinuity and key-metadata side tables,
//! - [`TrackFetcher`] walks the index, downloads and decrypts fragments,
//!   and feeds the bounded [`FragmentCache`],
//! - [`TrackInjector`] drains the cache into the external [`StreamSink`],
//!   enforcing cross-track pacing and the discontinuity barrier,
//! - [`PlayerSession`] owns the whole arrangement, one instance per
//!   playback session.

pub mod cache;
pub mod discontinuity;
pub mod error;
pub mod fetch;
pub mod fetcher;
pub mod index;
pub mod injector;
pub mod master;
pub mod options;
pub mod playlist_cache;
pub mod session;
pub mod sink;
pub mod tags;

pub use cache::{CachedFragment, FragmentCache};
pub use discontinuity::{BarrierOutcome, DiscontinuityCoordinator, StallPolicy};
pub use error::{HlsError, HlsResult};
pub use fetch::Downloader;
pub use fetcher::TrackFetcher;
pub use index::{
    DiscontinuityMarker, EncryptionMethod, FragmentDescriptor, KeyMetadata, PlaylistIndex,
    PlaylistIndexer,
};
pub use injector::TrackInjector;
pub use master::{MasterPlaylist, MediaRendition, VariantStream};
pub use options::HlsOptions;
pub use playlist_cache::{MemoryPlaylistCache, PlaylistCache};
pub use session::{DrmManager, PlayerSession};
pub use sink::StreamSink;

/// Mock API for the [`StreamSink`] trait, available to dependent
/// crates' tests via the `mock` feature.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    pub use crate::sink::StreamSinkMock;
}
