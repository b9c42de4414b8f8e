use std::{fmt, sync::Arc, time::Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Notify;

use crate::DrmSystem;

/// Content-key identity: SHA-256 digest of the key metadata blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDigest([u8; 32]);

impl KeyDigest {
    pub fn from_blob(blob: &[u8]) -> Self {
        let digest = Sha256::digest(blob);
        Self(digest.into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for KeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyDigest({self})")
    }
}

impl fmt::Display for KeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are plenty for logs.
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Per-slot session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Pending,
    Ready,
    Error,
    KeyAcquisitionTimedOut,
    EmptySessionIdError,
}

impl SessionState {
    /// Whether a lookup for this key should short-circuit to an error
    /// without re-requesting.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            Self::Error | Self::KeyAcquisitionTimedOut | Self::EmptySessionIdError
        )
    }

    /// Whether session creation is still in flight.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Init | Self::Pending)
    }
}

/// One slot of the fixed-size session pool.
pub(crate) struct Slot {
    pub key: KeyDigest,
    pub system: DrmSystem,
    pub state: SessionState,
    pub created_at: Instant,
    /// Protects the slot actively backing current playback from
    /// eviction.
    pub primary: bool,
    pub key_material: Option<[u8; 16]>,
    pub notify: Arc<Notify>,
    pub error_detail: Option<String>,
}

impl Slot {
    pub fn new(key: KeyDigest, system: DrmSystem) -> Self {
        Self {
            key,
            system,
            state: SessionState::Init,
            created_at: Instant::now(),
            primary: false,
            key_material: None,
            notify: Arc::new(Notify::new()),
            error_detail: None,
        }
    }
}

/// Ready decrypt session handle returned to fetchers.
///
/// Holds a snapshot of the derived key material, so decryption never
/// touches the slot table and distinct sessions decrypt concurrently.
#[derive(Clone)]
pub struct DecryptSession {
    key: KeyDigest,
    system: DrmSystem,
    material: [u8; 16],
}

impl DecryptSession {
    pub(crate) fn new(key: KeyDigest, system: DrmSystem, material: [u8; 16]) -> Self {
        Self {
            key,
            system,
            material,
        }
    }

    pub fn key(&self) -> &KeyDigest {
        &self.key
    }

    pub fn system(&self) -> DrmSystem {
        self.system
    }

    /// Decrypt a fragment with this session's content key.
    pub fn decrypt(&self, data: &[u8], iv: &[u8; 16]) -> crate::DrmResult<Vec<u8>> {
        crate::decrypt::aes128_cbc_decrypt(data, &self.material, iv)
    }
}
