//! AES-128-CBC fragment decryption.

use aes::Aes128;
use cbc::{
    cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit},
    Decryptor,
};
use tracing::trace;

use crate::{DrmError, DrmResult};

/// AES block size in bytes.
const AES_BLOCK_SIZE: usize = 16;

/// Decrypt a whole fragment buffer with AES-128-CBC and strip PKCS7
/// padding.
///
/// Fragments are cached decrypted, so decryption happens once per
/// fragment on the fetch path, never on the inject path.
pub fn aes128_cbc_decrypt(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> DrmResult<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(DrmError::Decrypt(format!(
            "input length {} is not aligned to AES block size {AES_BLOCK_SIZE}",
            data.len()
        )));
    }

    let mut buf = data.to_vec();
    let decryptor = Decryptor::<Aes128>::new(key.into(), iv.into());
    let plaintext = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| DrmError::Decrypt(format!("PKCS7 unpad failed: {e}")))?;

    let written = plaintext.len();
    trace!(
        encrypted = data.len(),
        decrypted = written,
        "aes128_cbc: fragment decrypted"
    );

    buf.truncate(written);
    Ok(buf)
}
