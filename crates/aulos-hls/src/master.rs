//! Master playlist parsing: variant streams, iframe streams and
//! alternate renditions.

use aulos_abr::ProfileInfo;
use aulos_core::TrackType;

use crate::{
    tags::{attr_value, parse_line, PlaylistLine, Tag},
    HlsError, HlsResult,
};

/// One `#EXT-X-STREAM-INF` (or iframe) entry.
#[derive(Debug, Clone)]
pub struct VariantStream {
    /// Index among the (non-iframe) variants.
    pub index: usize,
    pub uri: String,
    pub bandwidth: u64,
    pub codecs: Option<String>,
    pub audio_group: Option<String>,
    pub subtitle_group: Option<String>,
}

/// One `#EXT-X-MEDIA` alternate rendition.
#[derive(Debug, Clone)]
pub struct MediaRendition {
    pub track: TrackType,
    pub group_id: String,
    pub name: String,
    pub uri: Option<String>,
    pub default: bool,
}

/// Parsed master playlist.
#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    pub variants: Vec<VariantStream>,
    pub iframe_variants: Vec<VariantStream>,
    pub renditions: Vec<MediaRendition>,
}

impl MasterPlaylist {
    pub fn parse(body: &[u8]) -> HlsResult<MasterPlaylist> {
        let text = std::str::from_utf8(body)
            .map_err(|e| HlsError::Manifest(format!("master playlist is not UTF-8: {e}")))?;

        let mut master = MasterPlaylist::default();
        let mut saw_magic = false;
        let mut pending_stream: Option<(u64, Option<String>, Option<String>, Option<String>)> =
            None;

        for line in text.lines() {
            let Some(parsed) = parse_line(line) else {
                continue;
            };

            match parsed {
                PlaylistLine::Tag(Tag::ExtM3u) => {
                    saw_magic = true;
                }
                PlaylistLine::Tag(Tag::Unknown(tag)) => {
                    if let Some(attrs) = tag.strip_prefix("#EXT-X-STREAM-INF:") {
                        let bandwidth = attr_value(attrs, "BANDWIDTH")
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(0);
                        pending_stream = Some((
                            bandwidth,
                            attr_value(attrs, "CODECS").map(str::to_string),
                            attr_value(attrs, "AUDIO").map(str::to_string),
                            attr_value(attrs, "SUBTITLES").map(str::to_string),
                        ));
                    } else if let Some(attrs) = tag.strip_prefix("#EXT-X-I-FRAME-STREAM-INF:") {
                        if let Some(uri) = attr_value(attrs, "URI") {
                            let bandwidth = attr_value(attrs, "BANDWIDTH")
                                .and_then(|v| v.parse::<u64>().ok())
                                .unwrap_or(0);
                            master.iframe_variants.push(VariantStream {
                                index: master.iframe_variants.len(),
                                uri: uri.to_string(),
                                bandwidth,
                                codecs: attr_value(attrs, "CODECS").map(str::to_string),
                                audio_group: None,
                                subtitle_group: None,
                            });
                        }
                    } else if let Some(attrs) = tag.strip_prefix("#EXT-X-MEDIA:") {
                        let track = match attr_value(attrs, "TYPE") {
                            Some("AUDIO") => Some(TrackType::Audio),
                            Some("SUBTITLES") => Some(TrackType::Subtitle),
                            _ => None,
                        };
                        if let (Some(track), Some(group_id)) = (track, attr_value(attrs, "GROUP-ID"))
                        {
                            master.renditions.push(MediaRendition {
                                track,
                                group_id: group_id.to_string(),
                                name: attr_value(attrs, "NAME").unwrap_or("").to_string(),
                                uri: attr_value(attrs, "URI").map(str::to_string),
                                default: attr_value(attrs, "DEFAULT") == Some("YES"),
                            });
                        }
                    }
                }
                PlaylistLine::Uri(uri) => {
                    if let Some((bandwidth, codecs, audio_group, subtitle_group)) =
                        pending_stream.take()
                    {
                        master.variants.push(VariantStream {
                            index: master.variants.len(),
                            uri: uri.to_string(),
                            bandwidth,
                            codecs,
                            audio_group,
                            subtitle_group,
                        });
                    }
                }
                _ => {}
            }
        }

        if !saw_magic {
            return Err(HlsError::Manifest(
                "master playlist does not start with #EXTM3U".to_string(),
            ));
        }

        Ok(master)
    }

    /// Profile ladder for the ABR selector.
    pub fn profiles(&self) -> Vec<ProfileInfo> {
        self.variants
            .iter()
            .map(|v| ProfileInfo {
                index: v.index,
                bandwidth_bps: v.bandwidth,
            })
            .collect()
    }

    /// Default (or first) rendition of a track kind referenced by the
    /// given variant's group.
    pub fn rendition_for(&self, variant: &VariantStream, track: TrackType) -> Option<&MediaRendition> {
        let group = match track {
            TrackType::Audio => variant.audio_group.as_deref(),
            TrackType::Subtitle => variant.subtitle_group.as_deref(),
            _ => None,
        }?;

        let in_group = || self.renditions.iter().filter(move |r| r.track == track && r.group_id == group);
        in_group().find(|r| r.default).or_else(|| in_group().next())
    }
}
