//! Fixed sizes and sentinel values shared across every layer.
//!
//! Lifted from the reference firmware's `storage.c`, which hard-codes these
//! as `#define`s next to the structures they size. Keeping them in one place
//! here serves the same purpose: every other module imports from here rather
//! than re-deriving a magic number.

/// Size of the salt mixed into `EDEK_PVC` on every `set_pin`.
pub const STORAGE_SALT_SIZE: usize = 8;
/// Size of the caller-supplied external salt, when present.
pub const EXTERNAL_SALT_SIZE: usize = 32;
/// Size of the hashed hardware salt (one SHA-256 digest).
pub const HARDWARE_SALT_SIZE: usize = 32;

/// Data encryption key size.
pub const DEK_SIZE: usize = 32;
/// Storage authentication key size.
pub const SAK_SIZE: usize = 16;
/// Combined `DEK || SAK` size cached in RAM while unlocked.
pub const KEYS_SIZE: usize = DEK_SIZE + SAK_SIZE;
/// PIN verification code size (truncated Poly1305 tag).
pub const PVC_SIZE: usize = 8;

/// Whole-store authentication tag size (full HMAC-SHA256 output).
pub const STORAGE_TAG_SIZE: usize = 32;
/// Poly1305 tag size.
pub const POLY1305_TAG_SIZE: usize = 16;
/// ChaCha20 IV (nonce) size per RFC 7539.
pub const CHACHA20_IV_SIZE: usize = 12;
/// ChaCha20 block size, used to seek the keystream past the one-time
/// Poly1305 key block before encrypting.
pub const CHACHA20_BLOCK_SIZE: usize = 64;

/// Salt size used when tagging the wipe code.
pub const WIPE_CODE_SALT_SIZE: usize = 8;
/// Tag size used when authenticating the wipe code.
pub const WIPE_CODE_TAG_SIZE: usize = 8;
/// Longest wipe code accepted by `change_wipe_code`.
pub const MAX_WIPE_CODE_LEN: usize = 50;

/// Longest plaintext value accepted by `set` for an encrypted record:
/// `u16::MAX` minus the IV and Poly1305 tag framing either side of it.
pub const MAX_ENCRYPTED_VALUE_LEN: usize = u16::MAX as usize - CHACHA20_IV_SIZE - POLY1305_TAG_SIZE;

/// Maximum number of consecutive wrong unlock attempts before a wipe.
pub const PIN_MAX_TRIES: u32 = 16;
/// Total PBKDF2-HMAC-SHA256 iterations spent deriving KEK/KEIV.
pub const PIN_ITER_COUNT: u32 = 20_000;
/// Number of sub-batches the iteration count is split into for UI progress.
pub const PIN_ITER_BATCHES: u32 = 10;
/// Reported wall-clock budget of the full PBKDF2 derivation, in milliseconds.
pub const PIN_PBKDF2_MS: u32 = 1280;

/// Longest legacy (storage version <= 2) numeric PIN, in decimal digits.
pub const V0_MAX_PIN_LEN: usize = 9;

/// Current on-disk storage format version this crate writes and expects.
pub const STORAGE_VERSION: u32 = 4;

/// `TRUE_WORD`/`FALSE_WORD` guard the `STORAGE_UPGRADED` marker. They are
/// unrelated bit patterns (not simple complements) so that a single stuck
/// or flipped bit cannot turn one into the other.
pub const TRUE_WORD: u32 = 0xC35A_69A5;
pub const FALSE_WORD: u32 = 0x3CA5_965A;

pub const TRUE_BYTE: u8 = 0x01;
pub const FALSE_BYTE: u8 = 0x00;

/// Empty wipe code sentinel used internally so that comparisons never need
/// a special case for "wipe code unset".
pub const WIPE_CODE_EMPTY: &[u8] = &[0, 0, 0, 0];

/// Legacy (storage version 2) encoding of an unset wipe code.
pub const V2_WIPE_CODE_EMPTY: u32 = 0;
/// Legacy (storage version <= 2) encoding of an empty PIN.
pub const V0_PIN_EMPTY: u32 = 1;
