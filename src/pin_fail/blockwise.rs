//! Fixed-word PIN-fail counter for flash where rewriting a reserved slot
//! outright (erase + program) is cheap enough not to need the bit-clearing
//! scheme in [`super::bitwise`].

use crate::error::PinFailError;
use crate::log::RecordLog;

use super::PIN_FAIL_KEY;

pub struct BlockwisePinFailLog<L> {
    log: L,
}

impl<L: RecordLog> BlockwisePinFailLog<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub fn into_inner(self) -> L {
        self.log
    }

    fn read(&self) -> Result<u32, PinFailError> {
        match self.log.get(PIN_FAIL_KEY)? {
            None => Ok(0),
            Some(bytes) if bytes.len() == 4 => Ok(u32::from_le_bytes(bytes.try_into().unwrap())),
            Some(_) => Err(PinFailError::Corrupt("blockwise pin-fail record has the wrong length".into())),
        }
    }

    fn write(&mut self, value: u32) -> Result<(), PinFailError> {
        self.log.set(PIN_FAIL_KEY, &value.to_le_bytes())?;
        Ok(())
    }
}

impl<L: RecordLog> super::PinFailLog for BlockwisePinFailLog<L> {
    fn init(&mut self, initial_count: u32) -> Result<(), PinFailError> {
        self.write(initial_count)
    }

    fn get_fails(&self) -> Result<u32, PinFailError> {
        self.read()
    }

    fn fails_increase(&mut self) -> Result<u32, PinFailError> {
        let next = self.read()?.checked_add(1).ok_or(PinFailError::TickBudgetExhausted)?;
        self.write(next)?;
        Ok(next)
    }

    fn fails_reset(&mut self) -> Result<(), PinFailError> {
        self.write(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{memory::MemoryLog, RecordLog as _};
    use crate::pin_fail::PinFailLog;

    fn new_log() -> BlockwisePinFailLog<MemoryLog> {
        let mut inner = MemoryLog::new();
        inner.init().unwrap();
        BlockwisePinFailLog::new(inner)
    }

    #[test]
    fn starts_at_zero() {
        let log = new_log();
        assert_eq!(log.get_fails().unwrap(), 0);
    }

    #[test]
    fn increase_and_reset() {
        let mut log = new_log();
        assert_eq!(log.fails_increase().unwrap(), 1);
        assert_eq!(log.fails_increase().unwrap(), 2);
        log.fails_reset().unwrap();
        assert_eq!(log.get_fails().unwrap(), 0);
    }

    #[test]
    fn init_seeds_a_legacy_count() {
        let mut log = new_log();
        log.init(7).unwrap();
        assert_eq!(log.get_fails().unwrap(), 7);
    }
}
