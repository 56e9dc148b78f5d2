//! In-memory `RecordLog`. Used by tests and by hosts that don't need
//! persistence (e.g. an emulator running against a RAM-backed log).

use std::collections::BTreeMap;

use crate::constants::STORAGE_VERSION;
use crate::error::LogError;

use super::RecordLog;

struct Slot {
    data: Vec<u8>,
    cursor: usize,
}

#[derive(Default, Clone, Copy)]
struct Counter {
    base: u32,
    ticks: u32,
}

/// A `RecordLog` backed entirely by RAM.
#[derive(Default)]
pub struct MemoryLog {
    slots: BTreeMap<u16, Slot>,
    counters: BTreeMap<u16, Counter>,
    version: u32,
}

impl MemoryLog {
    /// A fresh log at the engine's current format version.
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            counters: BTreeMap::new(),
            version: STORAGE_VERSION,
        }
    }

    /// Construct a log pre-populated at a specific (possibly legacy) format
    /// version, for upgrade-path tests. `entries` are raw key/value pairs as
    /// they would appear on flash at that version.
    pub fn from_legacy(version: u32, entries: impl IntoIterator<Item = (u16, Vec<u8>)>) -> Self {
        let mut slots = BTreeMap::new();
        for (key, data) in entries {
            let len = data.len();
            slots.insert(key, Slot { data, cursor: len });
        }
        Self {
            slots,
            counters: BTreeMap::new(),
            version,
        }
    }
}

impl RecordLog for MemoryLog {
    fn init(&mut self) -> Result<u32, LogError> {
        Ok(self.version)
    }

    fn get(&self, key: u16) -> Result<Option<Vec<u8>>, LogError> {
        Ok(self.slots.get(&key).map(|s| s.data.clone()))
    }

    fn snapshot(&self) -> Result<Vec<(u16, Vec<u8>)>, LogError> {
        Ok(self
            .slots
            .iter()
            .map(|(k, s)| (*k, s.data.clone()))
            .collect())
    }

    fn set(&mut self, key: u16, buf: &[u8]) -> Result<(), LogError> {
        self.slots.insert(
            key,
            Slot {
                data: buf.to_vec(),
                cursor: buf.len(),
            },
        );
        Ok(())
    }

    fn set_ex(&mut self, key: u16, buf: &[u8]) -> Result<bool, LogError> {
        let existed = self.slots.contains_key(&key);
        self.set(key, buf)?;
        Ok(existed)
    }

    fn preallocate(&mut self, key: u16, total_len: usize) -> Result<(), LogError> {
        self.slots.insert(
            key,
            Slot {
                data: vec![0u8; total_len],
                cursor: 0,
            },
        );
        Ok(())
    }

    fn append_bytes(&mut self, key: u16, chunk: &[u8]) -> Result<(), LogError> {
        let slot = self.slots.get_mut(&key).ok_or(LogError::NoSlot(key))?;
        let end = slot.cursor + chunk.len();
        if end > slot.data.len() {
            return Err(LogError::SlotOverflow(key, end, slot.data.len()));
        }
        slot.data[slot.cursor..end].copy_from_slice(chunk);
        slot.cursor = end;
        Ok(())
    }

    fn delete(&mut self, key: u16) -> Result<(), LogError> {
        self.slots.remove(&key);
        self.counters.remove(&key);
        Ok(())
    }

    fn wipe(&mut self) -> Result<(), LogError> {
        self.slots.clear();
        self.counters.clear();
        self.version = STORAGE_VERSION;
        Ok(())
    }

    fn upgrade_finish(&mut self) -> Result<(), LogError> {
        self.version = STORAGE_VERSION;
        Ok(())
    }

    fn set_counter(&mut self, key: u16, value: u32) -> Result<(), LogError> {
        self.counters.insert(key, Counter { base: value, ticks: 0 });
        Ok(())
    }

    fn next_counter(&mut self, key: u16) -> Result<u32, LogError> {
        let counter = self.counters.entry(key).or_insert(Counter { base: 0, ticks: 0 });
        counter.ticks = counter
            .ticks
            .checked_add(1)
            .ok_or(LogError::CounterSaturated(key))?;
        counter
            .base
            .checked_add(counter.ticks)
            .ok_or(LogError::CounterSaturated(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preallocate_then_append() {
        let mut log = MemoryLog::new();
        log.preallocate(0x0101, 5).unwrap();
        log.append_bytes(0x0101, b"ab").unwrap();
        log.append_bytes(0x0101, b"cde").unwrap();
        assert_eq!(log.get(0x0101).unwrap().unwrap(), b"abcde");
    }

    #[test]
    fn append_overflow_is_rejected() {
        let mut log = MemoryLog::new();
        log.preallocate(0x0101, 2).unwrap();
        log.append_bytes(0x0101, b"ab").unwrap();
        assert!(log.append_bytes(0x0101, b"c").is_err());
    }

    #[test]
    fn counters_are_monotonic() {
        let mut log = MemoryLog::new();
        log.set_counter(0x0101, 10).unwrap();
        assert_eq!(log.next_counter(0x0101).unwrap(), 11);
        assert_eq!(log.next_counter(0x0101).unwrap(), 12);
    }

    #[test]
    fn wipe_clears_everything() {
        let mut log = MemoryLog::new();
        log.set(0x0101, b"x").unwrap();
        log.wipe().unwrap();
        assert!(log.get(0x0101).unwrap().is_none());
        assert_eq!(log.init().unwrap(), STORAGE_VERSION);
    }
}
