//! Cryptographic primitives: hashing, keyed hashing, constant-time
//! comparisons, a CSPRNG, the incremental PBKDF2 used for PIN stretching, the
//! RFC 7539 AEAD construction, and the PIN-stretch backend trait.

pub mod aead;
pub mod pbkdf2;
pub mod pin_stretch;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

type HmacSha256 = Hmac<Sha256>;

/// One SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA256 over `data`, keyed by `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Fill `buf` with cryptographically secure random bytes.
pub fn random_buffer(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// A single random 32-bit word.
pub fn random32() -> u32 {
    OsRng.next_u32()
}

/// Jitter the timing of the caller immediately before a security-sensitive
/// comparison, within `[0, max_micros)`. A no-op at `max_micros == 0`.
pub fn wait_random(max_micros: u32) {
    if max_micros == 0 {
        return;
    }
    let delay = random32() % max_micros;
    std::thread::sleep(std::time::Duration::from_micros(delay as u64));
}

/// Constant-time byte-slice equality with a loop-completion check: the fold
/// must visit every byte or the result is treated as a mismatch, mirroring
/// the reference firmware's defense against a loop-exit fault.
pub fn secequal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = Choice::from(1u8);
    let mut visited = 0usize;
    for (x, y) in a.iter().zip(b.iter()) {
        acc &= x.ct_eq(y);
        visited += 1;
    }
    if visited != a.len() {
        return false;
    }
    acc.unwrap_u8() == 1
}

/// Constant-time, power-analysis-hardened equality over 32-bit words: each
/// pair is compared under a freshly drawn random mask so that the bit
/// pattern crossing the comparator never directly reflects either operand.
pub fn secequal32(a: &[u32], b: &[u32]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc: u32 = 0;
    let mut visited = 0usize;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let mask = random32();
        acc |= (x ^ mask) ^ (y ^ mask);
        visited += 1;
    }
    if visited != a.len() {
        return false;
    }
    acc == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"hello"), sha256(b"hello"));
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }

    #[test]
    fn hmac_depends_on_key_and_data() {
        assert_eq!(hmac_sha256(b"k", b"m"), hmac_sha256(b"k", b"m"));
        assert_ne!(hmac_sha256(b"k1", b"m"), hmac_sha256(b"k2", b"m"));
    }

    #[test]
    fn secequal_matches_and_mismatches() {
        assert!(secequal(b"abcd", b"abcd"));
        assert!(!secequal(b"abcd", b"abce"));
        assert!(!secequal(b"abc", b"abcd"));
    }

    #[test]
    fn secequal32_matches_and_mismatches() {
        assert!(secequal32(&[1, 2, 3], &[1, 2, 3]));
        assert!(!secequal32(&[1, 2, 3], &[1, 2, 4]));
    }
}
