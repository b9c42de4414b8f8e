//! Line-level HLS playlist tag scanning.
//!
//! One playlist line maps to one [`PlaylistLine`]. Unknown tags are
//! passed through as [`Tag::Unknown`] and ignored by the indexer
//! (forward-compatibility policy).

use aulos_core::PlaylistType;

/// Encryption method from `#EXT-X-KEY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionMethod {
    None,
    Aes128,
    SampleAes,
    Other(String),
}

/// One parsed playlist line.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistLine<'a> {
    Tag(Tag<'a>),
    /// A non-tag, non-comment line: a fragment (or playlist) URI.
    Uri(&'a str),
}

/// Recognized playlist tags.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag<'a> {
    ExtM3u,
    Version(u32),
    Inf {
        duration: f64,
    },
    Key {
        method: EncryptionMethod,
        uri: Option<&'a str>,
        iv: Option<[u8; 16]>,
        /// Raw attribute text, retained as the key-metadata blob.
        raw: &'a str,
    },
    Discontinuity,
    MediaSequence(u64),
    TargetDuration(f64),
    PlaylistType(PlaylistType),
    EndList,
    ByteRange {
        len: u64,
        offset: Option<u64>,
    },
    ProgramDateTime(f64),
    Map {
        uri: &'a str,
    },
    Unknown(&'a str),
}

/// Parse one playlist line. Blank lines and plain comments yield `None`.
pub fn parse_line(line: &str) -> Option<PlaylistLine<'_>> {
    let line = line.trim_end_matches('\r').trim();
    if line.is_empty() {
        return None;
    }

    if !line.starts_with('#') {
        return Some(PlaylistLine::Uri(line));
    }
    if !line.starts_with("#EXT") {
        // Plain comment.
        return None;
    }

    let tag = if line == "#EXTM3U" {
        Tag::ExtM3u
    } else if let Some(value) = line.strip_prefix("#EXTINF:") {
        let duration = value
            .split(',')
            .next()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        Tag::Inf { duration }
    } else if let Some(value) = line.strip_prefix("#EXT-X-KEY:") {
        parse_key(value)
    } else if line == "#EXT-X-DISCONTINUITY" {
        Tag::Discontinuity
    } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
        match value.trim().parse::<u64>() {
            Ok(seq) => Tag::MediaSequence(seq),
            Err(_) => Tag::Unknown(line),
        }
    } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
        match value.trim().parse::<f64>() {
            Ok(duration) => Tag::TargetDuration(duration),
            Err(_) => Tag::Unknown(line),
        }
    } else if let Some(value) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
        match value.trim() {
            "VOD" => Tag::PlaylistType(PlaylistType::Vod),
            "EVENT" => Tag::PlaylistType(PlaylistType::Event),
            _ => Tag::Unknown(line),
        }
    } else if line == "#EXT-X-ENDLIST" {
        Tag::EndList
    } else if let Some(value) = line.strip_prefix("#EXT-X-BYTERANGE:") {
        parse_byte_range(value).unwrap_or(Tag::Unknown(line))
    } else if let Some(value) = line.strip_prefix("#EXT-X-PROGRAM-DATE-TIME:") {
        match parse_program_date_time(value.trim()) {
            Some(epoch) => Tag::ProgramDateTime(epoch),
            None => Tag::Unknown(line),
        }
    } else if let Some(value) = line.strip_prefix("#EXT-X-MAP:") {
        match attr_value(value, "URI") {
            Some(uri) => Tag::Map { uri },
            None => Tag::Unknown(line),
        }
    } else if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
        match value.trim().parse::<u32>() {
            Ok(version) => Tag::Version(version),
            Err(_) => Tag::Unknown(line),
        }
    } else {
        Tag::Unknown(line)
    };

    Some(PlaylistLine::Tag(tag))
}

fn parse_key(attrs: &str) -> Tag<'_> {
    let method = match attr_value(attrs, "METHOD") {
        Some("NONE") => EncryptionMethod::None,
        Some("AES-128") => EncryptionMethod::Aes128,
        Some("SAMPLE-AES") => EncryptionMethod::SampleAes,
        Some(other) => EncryptionMethod::Other(other.to_string()),
        None => EncryptionMethod::Other("missing".to_string()),
    };

    Tag::Key {
        method,
        uri: attr_value(attrs, "URI"),
        iv: attr_value(attrs, "IV").and_then(parse_iv),
        raw: attrs,
    }
}

/// `<len>[@<offset>]`; offset defaults to the previous range's end.
fn parse_byte_range(value: &str) -> Option<Tag<'_>> {
    let value = value.trim();
    let (len_str, offset) = match value.split_once('@') {
        Some((len, offset)) => (len, Some(offset.trim().parse::<u64>().ok()?)),
        None => (value, None),
    };
    let len = len_str.trim().parse::<u64>().ok()?;
    Some(Tag::ByteRange { len, offset })
}

/// Extract one attribute from a comma-separated attribute list,
/// stripping surrounding quotes.
pub fn attr_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = attrs;
    while !rest.is_empty() {
        let (pair, tail) = split_attr(rest);
        rest = tail;

        if let Some((key, value)) = pair.split_once('=') {
            if key.trim() == name {
                return Some(value.trim().trim_matches('"'));
            }
        }
    }
    None
}

/// Split off one `KEY=VALUE` pair, honoring quoted commas.
fn split_attr(attrs: &str) -> (&str, &str) {
    let mut in_quotes = false;
    for (i, c) in attrs.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&attrs[..i], &attrs[i + 1..]),
            _ => {}
        }
    }
    (attrs, "")
}

/// `0x`-prefixed 128-bit IV.
fn parse_iv(value: &str) -> Option<[u8; 16]> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    if hex.len() != 32 {
        return None;
    }

    let mut iv = [0u8; 16];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let chunk = std::str::from_utf8(chunk).ok()?;
        iv[i] = u8::from_str_radix(chunk, 16).ok()?;
    }
    Some(iv)
}

/// Parse an ISO-8601 date-time (`YYYY-MM-DDTHH:MM:SS[.sss][Z|±HH:MM]`)
/// into epoch seconds.
///
/// Program-date-times are only ever compared to one another with a
/// multi-second tolerance, so sub-millisecond precision is not a
/// concern.
pub fn parse_program_date_time(value: &str) -> Option<f64> {
    let (date, rest) = value.split_once('T')?;

    let mut date_parts = date.split('-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: i64 = date_parts.next()?.parse().ok()?;
    let day: i64 = date_parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    // Split off the timezone suffix.
    let (time, offset_secs) = if let Some(time) = rest.strip_suffix('Z') {
        (time, 0i64)
    } else if let Some(pos) = rest.rfind(['+', '-']) {
        let (time, tz) = rest.split_at(pos);
        let sign = if tz.starts_with('-') { -1i64 } else { 1i64 };
        let tz = &tz[1..];
        let (th, tm) = tz.split_once(':')?;
        let th: i64 = th.parse().ok()?;
        let tm: i64 = tm.parse().ok()?;
        (time, sign * (th * 3600 + tm * 60))
    } else {
        (rest, 0i64)
    };

    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: f64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    let epoch = days as f64 * 86_400.0 + hour as f64 * 3600.0 + minute as f64 * 60.0 + second
        - offset_secs as f64;
    Some(epoch)
}

/// Days since 1970-01-01 (Howard Hinnant's days-from-civil algorithm).
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_basic_tags() {
        assert_eq!(parse_line("#EXTM3U"), Some(PlaylistLine::Tag(Tag::ExtM3u)));
        assert_eq!(
            parse_line("#EXT-X-ENDLIST"),
            Some(PlaylistLine::Tag(Tag::EndList))
        );
        assert_eq!(
            parse_line("#EXT-X-DISCONTINUITY"),
            Some(PlaylistLine::Tag(Tag::Discontinuity))
        );
        assert_eq!(
            parse_line("#EXT-X-MEDIA-SEQUENCE:42"),
            Some(PlaylistLine::Tag(Tag::MediaSequence(42)))
        );
    }

    #[test]
    fn parses_inf_duration() {
        assert_eq!(
            parse_line("#EXTINF:6.006,"),
            Some(PlaylistLine::Tag(Tag::Inf { duration: 6.006 }))
        );
        assert_eq!(
            parse_line("#EXTINF:4,title with, commas"),
            Some(PlaylistLine::Tag(Tag::Inf { duration: 4.0 }))
        );
    }

    #[test]
    fn uri_lines_and_comments() {
        assert_eq!(
            parse_line("segment_0.ts"),
            Some(PlaylistLine::Uri("segment_0.ts"))
        );
        assert_eq!(parse_line("# just a comment"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("seg.ts\r"), Some(PlaylistLine::Uri("seg.ts")));
    }

    #[test]
    fn parses_key_attributes() {
        let line = r#"#EXT-X-KEY:METHOD=AES-128,URI="https://k.example/key",IV=0x000102030405060708090a0b0c0d0e0f"#;
        let Some(PlaylistLine::Tag(Tag::Key {
            method, uri, iv, ..
        })) = parse_line(line)
        else {
            panic!("expected key tag");
        };

        assert_eq!(method, EncryptionMethod::Aes128);
        assert_eq!(uri, Some("https://k.example/key"));
        let iv = iv.unwrap();
        assert_eq!(iv[0], 0x00);
        assert_eq!(iv[15], 0x0f);
    }

    #[test]
    fn key_method_none() {
        let Some(PlaylistLine::Tag(Tag::Key { method, .. })) =
            parse_line("#EXT-X-KEY:METHOD=NONE")
        else {
            panic!("expected key tag");
        };
        assert_eq!(method, EncryptionMethod::None);
    }

    #[rstest]
    #[case("1000@200", 1000, Some(200))]
    #[case("1000", 1000, None)]
    fn parses_byte_range(#[case] value: &str, #[case] len: u64, #[case] offset: Option<u64>) {
        let line = format!("#EXT-X-BYTERANGE:{value}");
        assert_eq!(
            parse_line(&line),
            Some(PlaylistLine::Tag(Tag::ByteRange { len, offset }))
        );
    }

    #[test]
    fn quoted_commas_do_not_split_attrs() {
        let attrs = r#"METHOD=AES-128,URI="https://k.example/key?a=1,b=2",IV=0x00000000000000000000000000000001"#;
        assert_eq!(
            attr_value(attrs, "URI"),
            Some("https://k.example/key?a=1,b=2")
        );
    }

    #[rstest]
    #[case("1970-01-01T00:00:00Z", 0.0)]
    #[case("1970-01-02T00:00:00Z", 86_400.0)]
    #[case("2021-01-01T00:00:00Z", 1_609_459_200.0)]
    #[case("2021-01-01T01:00:00+01:00", 1_609_459_200.0)]
    #[case("2021-01-01T00:00:30.500Z", 1_609_459_230.5)]
    fn parses_program_date_time_cases(#[case] input: &str, #[case] expected: f64) {
        let parsed = parse_program_date_time(input).unwrap();
        assert!(
            (parsed - expected).abs() < 0.001,
            "{input}: {parsed} != {expected}"
        );
    }

    #[test]
    fn unknown_tags_are_preserved_not_rejected() {
        assert_eq!(
            parse_line("#EXT-X-SOMETHING-NEW:VALUE=1"),
            Some(PlaylistLine::Tag(Tag::Unknown("#EXT-X-SOMETHING-NEW:VALUE=1")))
        );
    }
}
