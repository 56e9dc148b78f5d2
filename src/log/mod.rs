//! The append-only record log collaborator (historically "norcow").
//!
//! Stores a flat mapping from 16-bit key to byte sequence on wear-sensitive
//! flash. This module only specifies the contract (`RecordLog`) plus key
//! classification helpers; [`memory`] and [`file`] provide two concrete
//! backends.

pub mod file;
pub mod memory;

pub use file::FileLog;
pub use memory::MemoryLog;

use crate::error::LogError;

/// High bit of the APP byte: record is unencrypted and legible while locked.
pub const FLAG_PUBLIC: u8 = 0x80;
/// Second-highest bit of the APP byte: a PUBLIC record writable while locked.
pub const FLAG_WRITE: u8 = 0x40;
/// The reserved APP value for the engine's own bookkeeping keys.
pub const APP_STORAGE: u8 = 0x00;

/// Build a 16-bit record key from an APP byte (including its flag bits) and
/// an item byte.
#[inline]
pub const fn make_key(app: u8, item: u8) -> u16 {
    ((app as u16) << 8) | item as u16
}

#[inline]
pub const fn app_of(key: u16) -> u8 {
    (key >> 8) as u8
}

#[inline]
pub const fn is_public(key: u16) -> bool {
    app_of(key) & FLAG_PUBLIC != 0
}

#[inline]
pub const fn is_write_locked(key: u16) -> bool {
    app_of(key) & FLAG_WRITE != 0
}

/// A record is "protected" when it is neither reserved for the engine nor
/// flagged PUBLIC: its body is encrypted and its key contributes to the
/// whole-store authentication tag.
#[inline]
pub const fn is_protected(key: u16) -> bool {
    app_of(key) != APP_STORAGE && !is_public(key)
}

/// Contract the append-only flash log must satisfy. Every failure is an
/// `Err`; the core never retries at this level.
pub trait RecordLog {
    /// Open (or create) the log and return its stored format version.
    fn init(&mut self) -> Result<u32, LogError>;

    fn get(&self, key: u16) -> Result<Option<Vec<u8>>, LogError>;

    /// A materialized, stably-ordered view of every live record, visited
    /// exactly once. Stands in for the C API's `get_next(&cursor)` cursor.
    fn snapshot(&self) -> Result<Vec<(u16, Vec<u8>)>, LogError>;

    /// Overwrite (or create) `key` with the full contents of `buf`.
    fn set(&mut self, key: u16, buf: &[u8]) -> Result<(), LogError>;

    /// Like `set`, but also reports whether `key` already existed.
    fn set_ex(&mut self, key: u16, buf: &[u8]) -> Result<bool, LogError>;

    /// Reserve a slot of exactly `total_len` bytes under `key`, to be filled
    /// by subsequent `append_bytes` calls. The Rust shape of
    /// `set(key, NULL, expected_total_len)`.
    fn preallocate(&mut self, key: u16, total_len: usize) -> Result<(), LogError>;

    /// Append `chunk` into the slot reserved by `preallocate`. The Rust
    /// shape of `update_bytes`. The sum of all appended chunks must equal
    /// the slot's declared `total_len`.
    fn append_bytes(&mut self, key: u16, chunk: &[u8]) -> Result<(), LogError>;

    /// Remove `key`. Idempotent: deleting an absent key is not an error.
    fn delete(&mut self, key: u16) -> Result<(), LogError>;

    /// Erase every record and reset to a fresh, unversioned log.
    fn wipe(&mut self) -> Result<(), LogError>;

    /// Commit the end of an in-place format upgrade.
    fn upgrade_finish(&mut self) -> Result<(), LogError>;

    /// Reset a wear-friendly monotonic counter to `value`.
    fn set_counter(&mut self, key: u16, value: u32) -> Result<(), LogError>;

    /// Tick the counter and return its new value.
    fn next_counter(&mut self, key: u16) -> Result<u32, LogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let reserved = make_key(APP_STORAGE, 0x04);
        let public = make_key(0x01 | FLAG_PUBLIC, 0x01);
        let write_locked = make_key(0x01 | FLAG_PUBLIC | FLAG_WRITE, 0x01);
        let protected = make_key(0x01, 0x01);

        assert!(!is_protected(reserved));
        assert!(!is_protected(public));
        assert!(is_public(public));
        assert!(is_write_locked(write_locked));
        assert!(!is_write_locked(public));
        assert!(is_protected(protected));
        assert!(!is_public(protected));
    }
}
