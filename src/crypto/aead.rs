//! Hand-assembled RFC 7539 ChaCha20-Poly1305, built directly from the
//! `chacha20` stream cipher and `poly1305` universal hash rather than the
//! high-level `chacha20poly1305` crate.
//!
//! The PVC check needs the raw, truncated Poly1305 tag before any
//! full-tag constant-time compare (`secequal32`); a crate that only
//! exposes an opaque `decrypt() -> Result<Vec<u8>, Error>` can't produce
//! that. Streaming `auth`/`encrypt`/`decrypt`/`finish` also matches the
//! reference firmware's `rfc7539_init/auth/encrypt/decrypt/finish` API,
//! which this module mirrors one-to-one.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha20, Key as ChaChaKey, Nonce as ChaChaNonce};
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::{Key as PolyKey, Poly1305};

use crate::constants::{CHACHA20_BLOCK_SIZE, POLY1305_TAG_SIZE};
use crate::error::CryptoError;

/// A single-use RFC 7539 AEAD context. Consumed by `finish`.
pub struct Rfc7539Context {
    cipher: ChaCha20,
    mac: Poly1305,
    aad_len: u64,
    ct_len: u64,
}

impl Rfc7539Context {
    /// Derive the one-time Poly1305 key from ChaCha20 block 0 and seek the
    /// cipher to block 1, per RFC 7539 §2.6.
    pub fn new(key: &[u8], nonce: &[u8]) -> Result<Self, CryptoError> {
        let key = ChaChaKey::from_slice(key);
        let nonce = ChaChaNonce::from_slice(nonce);
        let mut cipher = ChaCha20::new(key, nonce);

        let mut poly_key_bytes = [0u8; 32];
        cipher.apply_keystream(&mut poly_key_bytes);
        cipher.seek(CHACHA20_BLOCK_SIZE as u32);

        let mac = Poly1305::new(PolyKey::from_slice(&poly_key_bytes));

        Ok(Self {
            cipher,
            mac,
            aad_len: 0,
            ct_len: 0,
        })
    }

    /// Absorb additional authenticated data. Must be called before any
    /// `encrypt`/`decrypt` call.
    pub fn auth(&mut self, aad: &[u8]) {
        self.mac.update_padded(aad);
        self.aad_len += aad.len() as u64;
    }

    /// Encrypt `buf` in place and absorb the resulting ciphertext.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
        self.mac.update_padded(buf);
        self.ct_len += buf.len() as u64;
    }

    /// Absorb `buf` as ciphertext, then decrypt it in place. The absorb must
    /// happen first: the tag covers ciphertext, not plaintext.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.mac.update_padded(buf);
        self.ct_len += buf.len() as u64;
        self.cipher.apply_keystream(buf);
    }

    /// Consume the context and return the 16-byte Poly1305 tag.
    pub fn finish(mut self) -> [u8; POLY1305_TAG_SIZE] {
        let mut len_block = [0u8; 16];
        len_block[0..8].copy_from_slice(&self.aad_len.to_le_bytes());
        len_block[8..16].copy_from_slice(&self.ct_len.to_le_bytes());
        self.mac.update_padded(&len_block);

        let tag = self.mac.finalize();
        let mut out = [0u8; POLY1305_TAG_SIZE];
        out.copy_from_slice(&tag);
        out
    }
}

/// One-shot encrypt of `plaintext` in place, returning the full tag.
pub fn seal(key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &mut [u8]) -> Result<[u8; POLY1305_TAG_SIZE], CryptoError> {
    let mut ctx = Rfc7539Context::new(key, nonce)?;
    ctx.auth(aad);
    ctx.encrypt(plaintext);
    Ok(ctx.finish())
}

/// One-shot decrypt of `ciphertext` in place, verifying `tag` in constant
/// time. On mismatch, `ciphertext` is left decrypted in place (the caller is
/// responsible for zeroizing on `Err`) and `CryptoError::AuthenticationFailed`
/// is returned.
pub fn open(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &mut [u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    let mut ctx = Rfc7539Context::new(key, nonce)?;
    ctx.auth(aad);
    ctx.decrypt(ciphertext);
    let computed = ctx.finish();
    if crate::crypto::secequal(&computed, tag) {
        Ok(())
    } else {
        Err(CryptoError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let key = [0x11u8; 32];
        let nonce = [0x22u8; 12];
        let aad = b"record-key";

        let mut buf = b"hello world".to_vec();
        let tag = seal(&key, &nonce, aad, &mut buf).unwrap();

        open(&key, &nonce, aad, &mut buf, &tag).unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let key = [0x11u8; 32];
        let nonce = [0x22u8; 12];
        let aad = b"record-key";

        let mut buf = b"hello world".to_vec();
        let tag = seal(&key, &nonce, aad, &mut buf).unwrap();
        buf[0] ^= 0x01;

        assert!(open(&key, &nonce, aad, &mut buf, &tag).is_err());
    }

    #[test]
    fn mismatched_aad_fails_to_open() {
        let key = [0x11u8; 32];
        let nonce = [0x22u8; 12];

        let mut buf = b"hello world".to_vec();
        let tag = seal(&key, &nonce, b"key-1", &mut buf).unwrap();

        assert!(open(&key, &nonce, b"key-2", &mut buf, &tag).is_err());
    }
}
