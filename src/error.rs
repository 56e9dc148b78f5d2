//! Error types for every layer of the engine.
//!
//! Small `thiserror`-derived enums with `#[from]` conversions from the
//! layers underneath, rather than a single stringly-typed catch-all.

use thiserror::Error;

/// Failures from the append-only record log collaborator.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("record log I/O error: {0}")]
    Io(String),
    #[error("record log is corrupt: {0}")]
    Corrupt(String),
    #[error("key {0:#06x} not found")]
    NotFound(u16),
    #[error("key {0:#06x} already exists")]
    AlreadyExists(u16),
    #[error("preallocated slot for key {0:#06x} overflowed: wrote {1}, expected {2}")]
    SlotOverflow(u16, usize, usize),
    #[error("no preallocated slot for key {0:#06x}")]
    NoSlot(u16),
    #[error("counter for key {0:#06x} saturated")]
    CounterSaturated(u16),
}

/// Failures from the PIN-fail counter collaborator.
#[derive(Error, Debug)]
pub enum PinFailError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("PIN-fail counter is corrupt: {0}")]
    Corrupt(String),
    #[error("PIN-fail counter exhausted its tick budget")]
    TickBudgetExhausted,
}

/// Failures from the crypto primitives layer.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("AEAD authentication failed")]
    AuthenticationFailed,
    #[error("invalid key or nonce length")]
    InvalidLength,
    #[error("secure element error: {0}")]
    SecureElement(String),
    #[error("secure element PIN counter exceeded")]
    SecureElementCounterExceeded,
    #[error("operation cancelled by the user")]
    Cancelled,
}

/// Top-level outcome for every mutating `StorageCore` operation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    PinFail(#[from] PinFailError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("storage engine is not initialized")]
    NotInitialized,
    #[error("operation not permitted: {0}")]
    NotPermitted(&'static str),
    #[error("value too large: {0} bytes")]
    ValueTooLarge(usize),
    #[error("fault detected: {0}")]
    Fault(&'static str),
}
