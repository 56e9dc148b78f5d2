//! Bit-clearing PIN-fail counter for flash that can only clear, never set,
//! individual bits without an erase cycle.
//!
//! Mirrors the legacy v0 encoding (`v0_pin_get_fails` in the reference
//! firmware): a region of `u32` words, each initialized to all-ones. Each
//! failure clears one more bit. The fail count is the number of cleared bits
//! in the first word that isn't already fully cleared, plus 32 for every
//! fully-cleared word before it.

use crate::error::PinFailError;
use crate::log::RecordLog;

use super::PIN_FAIL_KEY;

const WORD_BITS: u32 = 32;
/// Number of words reserved for the counter. At 32 fails per word this gives
/// headroom far beyond `PIN_MAX_TRIES`, so the log is never exhausted in
/// practice; `TickBudgetExhausted` exists for the case it somehow is.
const WORDS: usize = 4;

pub struct BitwisePinFailLog<L> {
    log: L,
}

impl<L: RecordLog> BitwisePinFailLog<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub fn into_inner(self) -> L {
        self.log
    }

    fn load_words(&self) -> Result<[u32; WORDS], PinFailError> {
        match self.log.get(PIN_FAIL_KEY)? {
            None => Ok([u32::MAX; WORDS]),
            Some(bytes) if bytes.len() == WORDS * 4 => {
                let mut words = [0u32; WORDS];
                for (i, word) in words.iter_mut().enumerate() {
                    *word = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
                }
                Ok(words)
            }
            Some(_) => Err(PinFailError::Corrupt("bitwise pin-fail record has the wrong length".into())),
        }
    }

    fn store_words(&mut self, words: [u32; WORDS]) -> Result<(), PinFailError> {
        let mut buf = Vec::with_capacity(WORDS * 4);
        for word in words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        self.log.set(PIN_FAIL_KEY, &buf)?;
        Ok(())
    }
}

impl<L: RecordLog> super::PinFailLog for BitwisePinFailLog<L> {
    fn init(&mut self, initial_count: u32) -> Result<(), PinFailError> {
        let mut words = [u32::MAX; WORDS];
        let full_words = (initial_count / WORD_BITS) as usize;
        let remainder = initial_count % WORD_BITS;
        for word in words.iter_mut().take(full_words.min(WORDS)) {
            *word = 0;
        }
        if full_words < WORDS && remainder > 0 {
            words[full_words] = u32::MAX << remainder;
        }
        self.store_words(words)
    }

    fn get_fails(&self) -> Result<u32, PinFailError> {
        let words = self.load_words()?;
        let mut total = 0u32;
        for word in words {
            if word == 0 {
                total += WORD_BITS;
                continue;
            }
            total += (!word).count_ones();
            return Ok(total);
        }
        Ok(total)
    }

    fn fails_increase(&mut self) -> Result<u32, PinFailError> {
        let mut words = self.load_words()?;
        let idx = words.iter().position(|&w| w != 0).ok_or(PinFailError::TickBudgetExhausted)?;
        words[idx] &= words[idx] - 1;
        self.store_words(words)?;
        self.get_fails()
    }

    fn fails_reset(&mut self) -> Result<(), PinFailError> {
        self.store_words([u32::MAX; WORDS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{memory::MemoryLog, RecordLog as _};
    use crate::pin_fail::PinFailLog;

    fn new_log() -> BitwisePinFailLog<MemoryLog> {
        let mut inner = MemoryLog::new();
        inner.init().unwrap();
        BitwisePinFailLog::new(inner)
    }

    #[test]
    fn starts_at_zero() {
        let log = new_log();
        assert_eq!(log.get_fails().unwrap(), 0);
    }

    #[test]
    fn increase_is_monotonic_within_a_word() {
        let mut log = new_log();
        for expected in 1..=16 {
            assert_eq!(log.fails_increase().unwrap(), expected);
        }
    }

    #[test]
    fn crosses_a_word_boundary() {
        let mut log = new_log();
        for _ in 0..32 {
            log.fails_increase().unwrap();
        }
        assert_eq!(log.get_fails().unwrap(), 32);
        assert_eq!(log.fails_increase().unwrap(), 33);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut log = new_log();
        log.fails_increase().unwrap();
        log.fails_increase().unwrap();
        log.fails_reset().unwrap();
        assert_eq!(log.get_fails().unwrap(), 0);
    }

    #[test]
    fn init_seeds_a_legacy_count() {
        let mut log = new_log();
        log.init(5).unwrap();
        assert_eq!(log.get_fails().unwrap(), 5);
    }
}
