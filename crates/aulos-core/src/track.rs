use std::fmt;

/// Normal playback rate. Anything else is trick-play.
pub const NORMAL_RATE: f64 = 1.0;

/// Media track kind handled by the pipeline.
///
/// Each enabled track gets its own fetch/inject pair. `IFrame` is only
/// consulted during trick-play and never has an injector of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
    IFrame,
}

impl TrackType {
    /// Short lowercase name, used in log fields and cache keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::IFrame => "iframe",
        }
    }

    /// The partner track for discontinuity pairing, if any.
    ///
    /// Video pairs with audio and vice versa; subtitle is best-effort and
    /// never blocks a pairing, iframe tracks are trick-play only.
    #[must_use]
    pub fn discontinuity_partner(self) -> Option<TrackType> {
        match self {
            Self::Video => Some(Self::Audio),
            Self::Audio => Some(Self::Video),
            Self::Subtitle | Self::IFrame => None,
        }
    }

    /// Whether download failures on this track may escalate to a fatal
    /// playback error. Subtitle is best-effort.
    #[must_use]
    pub fn failures_are_fatal(self) -> bool {
        !matches!(self, Self::Subtitle)
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playlist presentation type.
///
/// Inferred from `#EXT-X-PLAYLIST-TYPE` when present; an `#EXT-X-ENDLIST`
/// marker forces `Vod` regardless of prior inference so live-edge logic
/// stays disabled for finished streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Live,
    Event,
}

impl PlaylistType {
    /// Whether the playlist needs periodic refresh.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live | Self::Event)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(TrackType::Video, Some(TrackType::Audio))]
    #[case(TrackType::Audio, Some(TrackType::Video))]
    #[case(TrackType::Subtitle, None)]
    #[case(TrackType::IFrame, None)]
    fn discontinuity_partner(#[case] track: TrackType, #[case] partner: Option<TrackType>) {
        assert_eq!(track.discontinuity_partner(), partner);
    }

    #[test]
    fn subtitle_failures_never_fatal() {
        assert!(TrackType::Video.failures_are_fatal());
        assert!(TrackType::Audio.failures_are_fatal());
        assert!(!TrackType::Subtitle.failures_are_fatal());
    }

    #[test]
    fn live_and_event_refresh() {
        assert!(PlaylistType::Live.is_live());
        assert!(PlaylistType::Event.is_live());
        assert!(!PlaylistType::Vod.is_live());
    }
}
