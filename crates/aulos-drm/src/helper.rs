use std::time::Duration;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::{DrmError, DrmResult};

/// Widevine protection system id.
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

/// PlayReady protection system id.
pub const PLAYREADY_SYSTEM_ID: [u8; 16] = [
    0x9a, 0x04, 0xf0, 0x79, 0x98, 0x40, 0x42, 0x86, 0xab, 0x92, 0xe6, 0x5b, 0xe0, 0x88, 0x5f, 0x95,
];

/// W3C ClearKey protection system id.
pub const CLEARKEY_SYSTEM_ID: [u8; 16] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb, 0x4b,
];

/// Closed set of supported DRM systems.
///
/// Selected via [`DrmSystem::from_system_id`] rather than dynamic UUID
/// matching against registered helper objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrmSystem {
    ClearKey,
    Widevine,
    PlayReady,
}

impl DrmSystem {
    /// Factory keyed on the 16-byte protection system id.
    #[must_use]
    pub fn from_system_id(id: &[u8; 16]) -> Option<Self> {
        match *id {
            CLEARKEY_SYSTEM_ID => Some(Self::ClearKey),
            WIDEVINE_SYSTEM_ID => Some(Self::Widevine),
            PLAYREADY_SYSTEM_ID => Some(Self::PlayReady),
            _ => None,
        }
    }

    #[must_use]
    pub fn system_id(self) -> [u8; 16] {
        match self {
            Self::ClearKey => CLEARKEY_SYSTEM_ID,
            Self::Widevine => WIDEVINE_SYSTEM_ID,
            Self::PlayReady => PLAYREADY_SYSTEM_ID,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ClearKey => "clearkey",
            Self::Widevine => "widevine",
            Self::PlayReady => "playready",
        }
    }

    /// How long key processing (license round-trip + key derivation) may
    /// take before waiters give up.
    #[must_use]
    pub fn key_process_timeout(self) -> Duration {
        match self {
            Self::ClearKey => Duration::from_secs(5),
            Self::Widevine | Self::PlayReady => Duration::from_secs(12),
        }
    }

    /// Whether the license is delivered out of band by the application.
    #[must_use]
    pub fn is_external_license(self) -> bool {
        false
    }

    /// Content type of the license request body.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::ClearKey => "application/json",
            Self::Widevine => "application/octet-stream",
            Self::PlayReady => "text/xml; charset=utf-8",
        }
    }

    /// Build the license challenge for a parsed PSSH.
    ///
    /// The challenge body is the system-specific init data; the payloads
    /// themselves are treated as opaque per the parsing contract. For
    /// ClearKey the init data carries the key URL itself, which then
    /// overrides the configured license endpoint.
    pub fn generate_license_request(self, pssh: &PsshData) -> DrmResult<LicenseChallenge> {
        if pssh.data.is_empty() {
            return Err(DrmError::ChallengeGeneration(
                "empty init data in PSSH".to_string(),
            ));
        }

        let url = match self {
            Self::ClearKey => std::str::from_utf8(&pssh.data)
                .ok()
                .and_then(|s| url::Url::parse(s).ok()),
            Self::Widevine | Self::PlayReady => None,
        };

        Ok(LicenseChallenge {
            body: pssh.data.clone(),
            content_type: self.content_type(),
            url,
        })
    }

    /// Finalize key derivation from the license response body.
    ///
    /// The decrypt contract is AES-128, so every system must yield a
    /// 16-byte content key here.
    pub fn transform_license_response(self, body: Bytes) -> DrmResult<[u8; 16]> {
        if body.len() < 16 {
            return Err(DrmError::CorruptMetadata(format!(
                "license response too short: {} bytes",
                body.len()
            )));
        }

        let mut key = [0u8; 16];
        key.copy_from_slice(&body[..16]);
        Ok(key)
    }
}

/// License challenge ready to POST.
#[derive(Debug, Clone)]
pub struct LicenseChallenge {
    pub body: Bytes,
    pub content_type: &'static str,
    /// Per-key endpoint override; `None` uses the configured server.
    pub url: Option<url::Url>,
}

/// Parsed PSSH box.
#[derive(Debug, Clone)]
pub struct PsshData {
    pub system: DrmSystem,
    /// First key id for v1 boxes; digest of the data payload for v0.
    pub key_id: Bytes,
    /// System-specific opaque payload.
    pub data: Bytes,
}

/// Parse a PSSH box (ISO/IEC 23001-7) and select the DRM system.
///
/// Layout: size(4) 'pssh'(4) version(1) flags(3) system-id(16)
/// [v1: kid-count(4) kids(16×n)] data-size(4) data.
pub fn parse_pssh(init_data: &[u8]) -> DrmResult<PsshData> {
    const HEADER_LEN: usize = 4 + 4 + 4 + 16;

    if init_data.len() < HEADER_LEN + 4 {
        return Err(DrmError::CorruptMetadata(format!(
            "PSSH too short: {} bytes",
            init_data.len()
        )));
    }
    if &init_data[4..8] != b"pssh" {
        return Err(DrmError::CorruptMetadata("missing pssh box type".to_string()));
    }

    let version = init_data[8];
    let mut system_id = [0u8; 16];
    system_id.copy_from_slice(&init_data[12..28]);
    let system = DrmSystem::from_system_id(&system_id).ok_or(DrmError::UnsupportedSystem)?;

    let mut pos = HEADER_LEN;
    let mut first_kid: Option<Bytes> = None;

    if version >= 1 {
        let kid_count = read_u32(init_data, pos)? as usize;
        pos += 4;

        let kids_len = kid_count
            .checked_mul(16)
            .ok_or_else(|| DrmError::CorruptMetadata("kid count overflow".to_string()))?;
        if init_data.len() < pos + kids_len + 4 {
            return Err(DrmError::CorruptMetadata("truncated kid list".to_string()));
        }
        if kid_count > 0 {
            first_kid = Some(Bytes::copy_from_slice(&init_data[pos..pos + 16]));
        }
        pos += kids_len;
    }

    let data_size = read_u32(init_data, pos)? as usize;
    pos += 4;
    if init_data.len() < pos + data_size {
        return Err(DrmError::CorruptMetadata("truncated pssh data".to_string()));
    }
    let data = Bytes::copy_from_slice(&init_data[pos..pos + data_size]);

    let key_id = first_kid.unwrap_or_else(|| {
        let digest = Sha256::digest(&data);
        Bytes::copy_from_slice(&digest[..16])
    });

    Ok(PsshData {
        system,
        key_id,
        data,
    })
}

/// Build ClearKey init data wrapping a key URL (HLS `#EXT-X-KEY`
/// AES-128 keys are routed through the session manager as ClearKey
/// content, so dedup/eviction/deferral apply uniformly).
pub fn clearkey_init_data(key_uri: &str) -> Vec<u8> {
    let data = key_uri.as_bytes();
    let mut body = Vec::with_capacity(24 + data.len());
    body.extend_from_slice(&[0u8, 0, 0, 0]);
    body.extend_from_slice(&CLEARKEY_SYSTEM_ID);
    body.extend_from_slice(&(data.len() as u32).to_be_bytes());
    body.extend_from_slice(data);

    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(b"pssh");
    out.extend_from_slice(&body);
    out
}

fn read_u32(buf: &[u8], pos: usize) -> DrmResult<u32> {
    let slice = buf
        .get(pos..pos + 4)
        .ok_or_else(|| DrmError::CorruptMetadata("truncated pssh field".to_string()))?;
    let mut be = [0u8; 4];
    be.copy_from_slice(slice);
    Ok(u32::from_be_bytes(be))
}
