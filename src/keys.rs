//! Reserved record keys under `APP_STORAGE`, used by the engine's own
//! bookkeeping and never reachable through the public record API.

use crate::log::{make_key, APP_STORAGE};

/// PIN-fail / fault counter. Also exported as [`crate::pin_fail::PIN_FAIL_KEY`].
pub const PIN_LOGS: u16 = make_key(APP_STORAGE, 0x01);
/// `storage_salt(8) ‖ EDEK(48) ‖ PVC(8)`.
pub const EDEK_PVC: u16 = make_key(APP_STORAGE, 0x02);
/// Single byte, `TRUE_BYTE` iff the PIN is empty.
pub const PIN_NOT_SET: u16 = make_key(APP_STORAGE, 0x03);
/// Authenticated 32-bit storage version (encrypted).
pub const VERSION: u16 = make_key(APP_STORAGE, 0x04);
/// 16-byte HMAC of the running XOR of every protected key's contribution.
pub const STORAGE_TAG: u16 = make_key(APP_STORAGE, 0x05);
/// `code ‖ salt(8) ‖ tag(8)`.
pub const WIPE_CODE_DATA: u16 = make_key(APP_STORAGE, 0x06);
/// `TRUE_WORD` while an upgrade is in flight since the last version check.
pub const STORAGE_UPGRADED: u16 = make_key(APP_STORAGE, 0x07);
/// Duplicate of [`VERSION`], stored unencrypted.
pub const UNAUTH_VERSION: u16 = make_key(APP_STORAGE, 0x08);
