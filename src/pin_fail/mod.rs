//! The PIN-fail counter collaborator.
//!
//! Tracks how many consecutive wrong unlock attempts have been made since the
//! last success. The counter doubles as the fault counter: any detected fault
//! bumps it exactly like a wrong PIN, so repeated fault injection drains the
//! same budget a PIN-guessing attacker would.
//!
//! Two flash-write disciplines are offered, selected at compile time because
//! the choice depends on what the host's flash controller can do:
//! - `bitwise` (Cargo feature `pin-fails-bitwise`): only ever clears bits,
//!   never sets them, so it needs no erase cycle per failure.
//! - `blockwise` (default): writes a plain word per update; for a flash that
//!   allows rewriting a reserved slot outright, this is simpler and just as
//!   safe.

pub mod bitwise;
pub mod blockwise;

#[cfg(feature = "pin-fails-bitwise")]
pub use bitwise::BitwisePinFailLog as DefaultPinFailLog;
#[cfg(not(feature = "pin-fails-bitwise"))]
pub use blockwise::BlockwisePinFailLog as DefaultPinFailLog;

use crate::error::PinFailError;

/// Record key the core reserves for the PIN-fail counter.
pub const PIN_FAIL_KEY: u16 = crate::log::make_key(crate::log::APP_STORAGE, 0x01);

/// Contract for the PIN-fail counter collaborator.
pub trait PinFailLog {
    /// Reset the counter to `initial_count`, e.g. when migrating a legacy
    /// count forward during a format upgrade.
    fn init(&mut self, initial_count: u32) -> Result<(), PinFailError>;

    /// The number of consecutive failures recorded since the last reset.
    fn get_fails(&self) -> Result<u32, PinFailError>;

    /// Record one more failure and return the new total.
    fn fails_increase(&mut self) -> Result<u32, PinFailError>;

    /// Clear the counter after a successful unlock.
    fn fails_reset(&mut self) -> Result<(), PinFailError>;
}
