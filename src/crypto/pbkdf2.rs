//! Incremental PBKDF2-HMAC-SHA256, producing two 32-byte output blocks at
//! once (the reference firmware's `pbkdf2_hmac_sha256_Init/Update/Final`).
//!
//! The `pbkdf2` crate's convenience function runs the whole iteration count
//! in one call; this crate needs to pump the UI progress callback every
//! `PIN_ITER_BATCHES` sub-batch, so the F-function loop is reimplemented
//! directly on `hmac` + `sha2`, kept resumable across `advance()` calls.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Resumable PBKDF2-HMAC-SHA256 state producing two concatenated 32-byte
/// blocks (block indices 1 and 2 of the standard construction).
pub struct Pbkdf2Context {
    prf: HmacSha256,
    block1_u: [u8; 32],
    block1_t: [u8; 32],
    block2_u: [u8; 32],
    block2_t: [u8; 32],
    iterations_done: u32,
    total_iterations: u32,
}

impl Pbkdf2Context {
    /// Begin a derivation of `total_iterations` over `password`/`salt`. Does
    /// the first iteration of each block immediately (`U_1 = T_1`), matching
    /// the reference `_Init` call.
    pub fn new(password: &[u8], salt: &[u8], total_iterations: u32) -> Result<Self, CryptoError> {
        let prf = HmacSha256::new_from_slice(password).map_err(|_| CryptoError::InvalidLength)?;

        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&1u32.to_be_bytes());
        let block1_u: [u8; 32] = mac.finalize().into_bytes().into();

        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&2u32.to_be_bytes());
        let block2_u: [u8; 32] = mac.finalize().into_bytes().into();

        Ok(Self {
            prf,
            block1_t: block1_u,
            block1_u,
            block2_t: block2_u,
            block2_u,
            iterations_done: 1,
            total_iterations,
        })
    }

    /// Run up to `count` more iterations of both blocks' F-function chains.
    /// Saturates at `total_iterations`; calling `advance` again past that
    /// point is a no-op.
    pub fn advance(&mut self, count: u32) {
        let remaining = self.total_iterations.saturating_sub(self.iterations_done);
        let count = count.min(remaining);

        for _ in 0..count {
            let mut mac = self.prf.clone();
            mac.update(&self.block1_u);
            self.block1_u = mac.finalize().into_bytes().into();
            for (t, u) in self.block1_t.iter_mut().zip(self.block1_u.iter()) {
                *t ^= u;
            }

            let mut mac = self.prf.clone();
            mac.update(&self.block2_u);
            self.block2_u = mac.finalize().into_bytes().into();
            for (t, u) in self.block2_t.iter_mut().zip(self.block2_u.iter()) {
                *t ^= u;
            }

            self.iterations_done += 1;
        }
    }

    pub fn iterations_done(&self) -> u32 {
        self.iterations_done
    }

    pub fn is_done(&self) -> bool {
        self.iterations_done >= self.total_iterations
    }

    /// Consume the context, returning `(block1, block2)`.
    pub fn finish(self) -> ([u8; 32], [u8; 32]) {
        (self.block1_t, self.block2_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resuming_in_batches_matches_running_straight_through() {
        let mut batched = Pbkdf2Context::new(b"pin", b"salt", 100).unwrap();
        for _ in 0..10 {
            batched.advance(10);
        }
        let (b1, b2) = batched.finish();

        let mut straight = Pbkdf2Context::new(b"pin", b"salt", 100).unwrap();
        straight.advance(100);
        let (s1, s2) = straight.finish();

        assert_eq!(b1, s1);
        assert_eq!(b2, s2);
    }

    #[test]
    fn different_passwords_diverge() {
        let mut a = Pbkdf2Context::new(b"pin1", b"salt", 50).unwrap();
        a.advance(50);
        let mut b = Pbkdf2Context::new(b"pin2", b"salt", 50).unwrap();
        b.advance(50);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn advance_past_total_is_a_no_op() {
        let mut ctx = Pbkdf2Context::new(b"pin", b"salt", 10).unwrap();
        ctx.advance(10);
        let first = ctx.finish();

        let mut ctx = Pbkdf2Context::new(b"pin", b"salt", 10).unwrap();
        ctx.advance(10);
        ctx.advance(5);
        let second = ctx.finish();

        assert_eq!(first, second);
    }
}
