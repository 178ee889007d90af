use crate::traits::error::CryptoError;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Secret-box key length in bytes
pub const SECRET_BOX_KEY_LEN: usize = 32;

/// Secret-box nonce length in bytes
pub const SECRET_BOX_NONCE_LEN: usize = 24;

/// Cryptographic primitives needed by the client
///
/// Used for inline-secret signing and for opening end-to-end encrypted
/// payloads on `private-encrypted-` channels.
pub trait Crypto: Send + Sync {
    /// HMAC-SHA256 of `message` keyed with `secret`
    fn hmac_sha256(&self, secret: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Open an authenticated secret box (tag-prefixed XSalsa20-Poly1305)
    ///
    /// # Arguments
    /// * `ciphertext` - Poly1305 tag followed by the encrypted payload
    /// * `key` - 32-byte key
    /// * `nonce` - 24-byte nonce
    fn secret_box_open(
        &self,
        ciphertext: &[u8],
        key: &[u8],
        nonce: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Default [`Crypto`] implementation backed by the RustCrypto crates
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCrypto;

impl Crypto for RustCrypto {
    fn hmac_sha256(&self, secret: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
            .map_err(|e| CryptoError::InvalidMacKey(e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn secret_box_open(
        &self,
        ciphertext: &[u8],
        key: &[u8],
        nonce: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if key.len() != SECRET_BOX_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRET_BOX_KEY_LEN,
                actual: key.len(),
            });
        }
        if nonce.len() != SECRET_BOX_NONCE_LEN {
            return Err(CryptoError::InvalidNonceLength {
                expected: SECRET_BOX_NONCE_LEN,
                actual: nonce.len(),
            });
        }

        let cipher = XSalsa20Poly1305::new_from_slice(key).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: SECRET_BOX_KEY_LEN,
                actual: key.len(),
            }
        })?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
