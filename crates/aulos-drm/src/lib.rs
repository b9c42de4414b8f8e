#![forbid(unsafe_code)]

//! DRM session management and fragment decryption.
//!
//! [`DrmSessionManager`] owns a small fixed pool of decrypt-session
//! slots keyed by content-key digest. Concurrent license requests for
//! the same key are deduplicated at the slot level: the first caller
//! performs the acquisition, later callers wait on the slot and receive
//! the same session once it is ready. The manager is an instance owned
//! by the player session — there is no global state.
//!
//! Supported DRM systems form a closed set ([`DrmSystem`]) selected by
//! their 16-byte system id; the license exchange itself is modeled by
//! [`LicenseTransport`], so tests and platform secure-clients plug in at
//! the same seam.

mod decrypt;
mod error;
mod helper;
mod license;
mod manager;
mod options;
mod session;

pub use decrypt::aes128_cbc_decrypt;
pub use error::{DrmError, DrmResult};
pub use helper::{
    clearkey_init_data, parse_pssh, DrmSystem, LicenseChallenge, PsshData, CLEARKEY_SYSTEM_ID,
    PLAYREADY_SYSTEM_ID, WIDEVINE_SYSTEM_ID,
};
pub use license::{HttpLicenseTransport, LicenseClient, LicenseResponse, LicenseTransport, TokenSource};
pub use manager::DrmSessionManager;
pub use options::DrmOptions;
pub use session::{DecryptSession, KeyDigest, SessionState};

/// Mock APIs for the license seams, available to dependent crates'
/// tests via the `mock` feature.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    pub use crate::license::{LicenseTransportMock, TokenSourceMock};
}
