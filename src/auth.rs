//! Whole-store authentication tag and the "is-protected" classification.
//!
//! Every protected record contributes `HMAC_SAK(key_le_bytes)` into a
//! running XOR sum `S`; the persisted `STORAGE_TAG` is `HMAC_SAK(S)`. A tag
//! mismatch at read time, or a fold that disagrees with an independent
//! second fold of the same state, is treated as a fault rather than a plain
//! "not found".

use crate::crypto::{hmac_sha256, secequal};
use crate::error::StorageError;
use crate::keys::STORAGE_TAG;
use crate::log::{is_protected, RecordLog};

/// The RAM-resident running XOR sum `S` over every protected key's HMAC.
#[derive(Clone, Copy)]
pub struct AuthState {
    pub sum: [u8; 32],
}

impl AuthState {
    pub fn zero() -> Self {
        Self { sum: [0u8; 32] }
    }
}

/// Zero `S` and persist `STORAGE_TAG = HMAC_SAK(0)`. Called once per wipe.
pub fn auth_init<L: RecordLog>(log: &mut L, sak: &[u8]) -> Result<AuthState, StorageError> {
    let state = AuthState::zero();
    let tag = hmac_sha256(sak, &state.sum);
    log.set(STORAGE_TAG, &tag)?;
    Ok(state)
}

/// Fold `key`'s contribution into `state.sum` (no-op if not protected) and
/// persist the recomputed `STORAGE_TAG`.
pub fn auth_update<L: RecordLog>(
    log: &mut L,
    sak: &[u8],
    state: &mut AuthState,
    key: u16,
) -> Result<(), StorageError> {
    if !is_protected(key) {
        return Ok(());
    }
    let h = hmac_sha256(sak, &key.to_le_bytes());
    for (s, hb) in state.sum.iter_mut().zip(h.iter()) {
        *s ^= hb;
    }
    let tag = hmac_sha256(sak, &state.sum);
    log.set(STORAGE_TAG, &tag)?;
    Ok(())
}

/// Write `key = val`, then fold the key into the running tag if this is the
/// record's first write. Rolls back the write on a tag-update failure.
pub fn auth_set<L: RecordLog>(
    log: &mut L,
    sak: &[u8],
    state: &mut AuthState,
    key: u16,
    val: &[u8],
) -> Result<(), StorageError> {
    let existed = log.set_ex(key, val)?;
    if !existed {
        if let Err(e) = auth_update(log, sak, state, key) {
            let _ = log.delete(key);
            return Err(e);
        }
    }
    Ok(())
}

/// Fold every protected key's contribution into `S` over one snapshot,
/// also locating `key` if present.
fn fold_snapshot(sak: &[u8], snapshot: &[(u16, Vec<u8>)], key: u16) -> ([u8; 32], Option<Vec<u8>>) {
    let mut sum = [0u8; 32];
    let mut found = None;
    for (k, v) in snapshot {
        if is_protected(*k) {
            let h = hmac_sha256(sak, &k.to_le_bytes());
            for (s, hb) in sum.iter_mut().zip(h.iter()) {
                *s ^= hb;
            }
        }
        if *k == key {
            found = Some(v.clone());
        }
    }
    (sum, found)
}

/// Recompute `S` and locate `key` from a fresh snapshot, then take a
/// second, independently obtained snapshot and redo the fold. Any anomaly —
/// a stale or partial log read, a fold that landed on a different entry
/// count or a different running sum the second time round, a tag mismatch —
/// is a fault, not a plain miss. A log whose `snapshot()` isn't stable
/// across two consecutive calls on unchanged state is itself the iterator
/// anomaly this guards against: a single pass over its own output can never
/// observe that kind of corruption, only a second, independent read can.
pub fn auth_get<L: RecordLog>(log: &L, sak: &[u8], key: u16) -> Result<Option<Vec<u8>>, StorageError> {
    let snapshot = log.snapshot()?;
    let (sum, found) = fold_snapshot(sak, &snapshot, key);

    let confirm_snapshot = log.snapshot()?;
    let (confirm_sum, confirm_found) = fold_snapshot(sak, &confirm_snapshot, key);
    if confirm_snapshot.len() != snapshot.len() || confirm_sum != sum {
        return Err(StorageError::Fault("auth_get snapshot fold is unstable across reads"));
    }
    if confirm_found.is_some() != found.is_some() {
        return Err(StorageError::Fault("auth_get not-found status diverged between reads"));
    }

    let stored_tag = log
        .get(STORAGE_TAG)?
        .ok_or(StorageError::Fault("missing STORAGE_TAG"))?;
    let computed_tag = hmac_sha256(sak, &sum);
    if !secequal(&computed_tag, &stored_tag) {
        return Err(StorageError::Fault("store tag mismatch"));
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::memory::MemoryLog;
    use crate::log::RecordLog as _;

    #[test]
    fn set_then_get_round_trips_and_tag_matches() {
        let mut log = MemoryLog::new();
        log.init().unwrap();
        let sak = [0x11u8; 16];
        let mut state = auth_init(&mut log, &sak).unwrap();

        let key = crate::log::make_key(0x01, 0x05);
        auth_set(&mut log, &sak, &mut state, key, b"payload").unwrap();

        assert_eq!(auth_get(&log, &sak, key).unwrap().unwrap(), b"payload");
    }

    #[test]
    fn tampered_tag_is_a_fault() {
        let mut log = MemoryLog::new();
        log.init().unwrap();
        let sak = [0x11u8; 16];
        let mut state = auth_init(&mut log, &sak).unwrap();
        let key = crate::log::make_key(0x01, 0x05);
        auth_set(&mut log, &sak, &mut state, key, b"payload").unwrap();

        log.set(STORAGE_TAG, &[0u8; crate::constants::STORAGE_TAG_SIZE]).unwrap();
        assert!(auth_get(&log, &sak, key).is_err());
    }

    #[test]
    fn public_keys_do_not_affect_the_tag() {
        let mut log = MemoryLog::new();
        log.init().unwrap();
        let sak = [0x11u8; 16];
        let mut state = auth_init(&mut log, &sak).unwrap();
        let before = state.sum;

        let public_key = crate::log::make_key(0x01 | crate::log::FLAG_PUBLIC, 0x05);
        auth_set(&mut log, &sak, &mut state, public_key, b"x").unwrap();

        assert_eq!(state.sum, before);
    }

    /// A `RecordLog` whose `snapshot()` silently drops the last entry it
    /// returned on its first call, then reports the full set from then on —
    /// standing in for a torn or fault-injected read that disagrees with
    /// itself between two consecutive calls.
    struct FlakyLog {
        inner: MemoryLog,
        calls: std::cell::Cell<u32>,
    }

    impl RecordLog for FlakyLog {
        fn init(&mut self) -> Result<u32, crate::error::LogError> {
            self.inner.init()
        }
        fn get(&self, key: u16) -> Result<Option<Vec<u8>>, crate::error::LogError> {
            self.inner.get(key)
        }
        fn snapshot(&self) -> Result<Vec<(u16, Vec<u8>)>, crate::error::LogError> {
            let mut snap = self.inner.snapshot()?;
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n == 0 && !snap.is_empty() {
                snap.pop();
            }
            Ok(snap)
        }
        fn set(&mut self, key: u16, buf: &[u8]) -> Result<(), crate::error::LogError> {
            self.inner.set(key, buf)
        }
        fn set_ex(&mut self, key: u16, buf: &[u8]) -> Result<bool, crate::error::LogError> {
            self.inner.set_ex(key, buf)
        }
        fn preallocate(&mut self, key: u16, total_len: usize) -> Result<(), crate::error::LogError> {
            self.inner.preallocate(key, total_len)
        }
        fn append_bytes(&mut self, key: u16, chunk: &[u8]) -> Result<(), crate::error::LogError> {
            self.inner.append_bytes(key, chunk)
        }
        fn delete(&mut self, key: u16) -> Result<(), crate::error::LogError> {
            self.inner.delete(key)
        }
        fn wipe(&mut self) -> Result<(), crate::error::LogError> {
            self.inner.wipe()
        }
        fn upgrade_finish(&mut self) -> Result<(), crate::error::LogError> {
            self.inner.upgrade_finish()
        }
        fn set_counter(&mut self, key: u16, value: u32) -> Result<(), crate::error::LogError> {
            self.inner.set_counter(key, value)
        }
        fn next_counter(&mut self, key: u16) -> Result<u32, crate::error::LogError> {
            self.inner.next_counter(key)
        }
    }

    #[test]
    fn a_snapshot_that_disagrees_with_itself_is_a_fault() {
        let mut log = FlakyLog {
            inner: MemoryLog::new(),
            calls: std::cell::Cell::new(0),
        };
        log.init().unwrap();
        let sak = [0x11u8; 16];
        let mut state = auth_init(&mut log, &sak).unwrap();

        let key = crate::log::make_key(0x01, 0x05);
        auth_set(&mut log, &sak, &mut state, key, b"payload").unwrap();

        assert!(auth_get(&log, &sak, key).is_err());
    }
}
