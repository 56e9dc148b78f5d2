//! Key derivation and the RAM-only unlocked session.
//!
//! Cached key material never touches the record log; it lives in a
//! `ZeroizeOnDrop` buffer here and is cleared on every exit from the
//! unlocked state, including fault-handled ones.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::AuthState;
use crate::constants::{DEK_SIZE, HARDWARE_SALT_SIZE, KEYS_SIZE, PIN_ITER_BATCHES, PIN_ITER_COUNT, PIN_PBKDF2_MS};
use crate::crypto::pbkdf2::Pbkdf2Context;
use crate::crypto::pin_stretch::PinStretch;
use crate::crypto::sha256;
use crate::error::CryptoError;
use crate::progress::ProgressCallback;

/// `DEK ‖ SAK`, cached only while unlocked.
#[derive(ZeroizeOnDrop)]
struct CachedKeys {
    bytes: [u8; KEYS_SIZE],
}

impl CachedKeys {
    fn dek(&self) -> &[u8] {
        &self.bytes[..DEK_SIZE]
    }

    fn sak(&self) -> &[u8] {
        &self.bytes[DEK_SIZE..]
    }
}

/// The engine's RAM-resident session state.
pub struct Session {
    pub initialized: bool,
    pub unlocked: bool,
    pub auth: AuthState,
    pub hardware_salt: [u8; HARDWARE_SALT_SIZE],
    keys: Option<CachedKeys>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            initialized: false,
            unlocked: false,
            auth: AuthState::zero(),
            hardware_salt: [0u8; HARDWARE_SALT_SIZE],
            keys: None,
        }
    }

    /// Hash the caller-supplied salt once at `init` and zeroize the caller's
    /// buffer in place afterwards.
    pub fn bind_hardware_salt(&mut self, caller_salt: &mut [u8]) {
        self.hardware_salt = sha256(caller_salt);
        caller_salt.zeroize();
    }

    pub fn dek(&self) -> Option<&[u8]> {
        self.keys.as_ref().map(CachedKeys::dek)
    }

    pub fn sak(&self) -> Option<&[u8]> {
        self.keys.as_ref().map(CachedKeys::sak)
    }

    /// Transition to `Unlocked`, caching `dek_sak` and the freshly rebuilt
    /// authentication state.
    pub fn unlock_with(&mut self, dek_sak: [u8; KEYS_SIZE], auth: AuthState) {
        self.keys = Some(CachedKeys { bytes: dek_sak });
        self.auth = auth;
        self.unlocked = true;
    }

    /// Zeroize cached keys and return to `Locked`. Idempotent.
    pub fn lock(&mut self) {
        self.keys = None;
        self.auth = AuthState::zero();
        self.unlocked = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the ten-sub-batch PBKDF2-HMAC-SHA256 derivation, pumping `progress`
/// after each sub-batch. Returns `CryptoError::Cancelled` if the callback
/// asks to abort.
fn run_pbkdf2(ctx: &mut Pbkdf2Context, progress: &mut dyn ProgressCallback) -> Result<(), CryptoError> {
    let per_batch = PIN_ITER_COUNT / PIN_ITER_BATCHES;
    for batch in 1..=PIN_ITER_BATCHES {
        ctx.advance(per_batch);
        let elapsed_ms = batch * (PIN_PBKDF2_MS / PIN_ITER_BATCHES);
        let remaining_ms = PIN_PBKDF2_MS.saturating_sub(elapsed_ms);
        let per_mille = batch * 1000 / PIN_ITER_BATCHES;
        if progress.on_progress(remaining_ms / 1000, per_mille, "deriving key") {
            return Err(CryptoError::Cancelled);
        }
    }
    Ok(())
}

/// Derive KEK/KEIV directly from the PIN: `PBKDF2(pin, salt, 20000)` split
/// into its two 32-byte output blocks. Used when no secure element is
/// configured.
pub fn derive_kek_keiv_software(
    pin: &[u8],
    salt: &[u8],
    progress: &mut dyn ProgressCallback,
) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut ctx = Pbkdf2Context::new(pin, salt, PIN_ITER_COUNT).map_err(|_| CryptoError::InvalidLength)?;
    run_pbkdf2(&mut ctx, progress)?;
    Ok(ctx.finish())
}

/// Derive KEK/KEIV via a secure element: PBKDF2 first stretches the PIN into
/// a 32-byte value handed to the element, which returns a 32-byte `secret`;
/// KEK/KEIV are then `PBKDF2(secret, "", 1)`'s two blocks. `is_set` selects
/// whether the element binds a fresh PIN (`set_pin`) or verifies one
/// (`unlock`).
pub fn derive_kek_keiv_secure_element(
    pin: &[u8],
    salt: &[u8],
    stretch: &mut dyn PinStretch,
    is_set: bool,
    progress: &mut dyn ProgressCallback,
) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut ctx = Pbkdf2Context::new(pin, salt, PIN_ITER_COUNT).map_err(|_| CryptoError::InvalidLength)?;
    run_pbkdf2(&mut ctx, progress)?;
    let (mut stretched_pin, _unused_block) = ctx.finish();

    let secret_result = if is_set {
        stretch.stretch_set(&stretched_pin)
    } else {
        stretch.stretch_verify(&stretched_pin)
    };
    stretched_pin.zeroize();
    let mut secret = secret_result?;

    let mut final_ctx = Pbkdf2Context::new(&secret, b"", 1).map_err(|_| CryptoError::InvalidLength)?;
    let (kek, keiv) = final_ctx.finish();
    secret.zeroize();
    Ok((kek, keiv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;

    #[test]
    fn software_derivation_is_deterministic() {
        let salt = [0u8; 32];
        let mut a = NullProgress;
        let mut b = NullProgress;
        let out1 = derive_kek_keiv_software(b"1234", &salt, &mut a).unwrap();
        let out2 = derive_kek_keiv_software(b"1234", &salt, &mut b).unwrap();
        assert_eq!(out1, out2);
    }

    #[test]
    fn different_pins_diverge() {
        let salt = [0u8; 32];
        let mut a = NullProgress;
        let mut b = NullProgress;
        let out1 = derive_kek_keiv_software(b"1234", &salt, &mut a).unwrap();
        let out2 = derive_kek_keiv_software(b"4321", &salt, &mut b).unwrap();
        assert_ne!(out1, out2);
    }

    #[test]
    fn cancelling_midway_aborts() {
        let salt = [0u8; 32];
        let mut calls = 0u32;
        let mut progress = |_remaining: u32, _per_mille: u32, _msg: &str| -> bool {
            calls += 1;
            calls >= 3
        };
        let result = derive_kek_keiv_software(b"1234", &salt, &mut progress);
        assert!(matches!(result, Err(CryptoError::Cancelled)));
    }

    #[test]
    fn lock_clears_cached_keys() {
        let mut session = Session::new();
        session.unlock_with([0u8; KEYS_SIZE], AuthState::zero());
        assert!(session.unlocked);
        assert!(session.dek().is_some());
        session.lock();
        assert!(!session.unlocked);
        assert!(session.dek().is_none());
    }
}
