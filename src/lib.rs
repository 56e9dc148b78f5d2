//! # keyvault-core
//!
//! A PIN-protected encrypted key-value storage engine for constrained
//! hardware security devices: an append-only flash record log, an AEAD
//! envelope per application record, a whole-store authentication tag, and an
//! unlock state machine with exponential-backoff throttling and wipe-on-fault
//! countermeasures.
//!
//! ## Layout
//!
//! - [`log`] — the append-only record log contract (`RecordLog`) and two
//!   backends: an in-memory one for tests, and a file-backed one that replays
//!   a frame log on open.
//! - [`pin_fail`] — the PIN-fail/fault counter, in bitwise (bits only ever
//!   cleared) or blockwise (plain word rewrite) flavors.
//! - [`crypto`] — hashing, HMAC, a constant-time CSPRNG-masked comparator, the
//!   incremental PBKDF2-HMAC-SHA256 used to derive KEK/KEIV, the hand-built
//!   RFC 7539 ChaCha20-Poly1305 AEAD, and the PIN-stretch backend trait.
//! - [`auth`] — the whole-store authentication tag.
//! - [`session`] — RAM-only cached keys and key derivation.
//! - [`upgrade`] — legacy format codecs and the version-consistency check.
//! - [`engine`] — [`StorageCore`], the public API.
//!
//! ## Quick start
//!
//! ```
//! use keyvault_core::{
//!     LoggingFaultScreens, MemoryLog, NullProgress, StdDelay, StorageConfig, StorageCore,
//! };
//! use keyvault_core::pin_fail::DefaultPinFailLog;
//!
//! let log = MemoryLog::new();
//! let pin_fails = DefaultPinFailLog::new(MemoryLog::new());
//! let mut core = StorageCore::new(log, pin_fails, StorageConfig::default());
//!
//! let mut salt = [0u8; 32];
//! core.init(&mut salt, &mut NullProgress, &mut LoggingFaultScreens).unwrap();
//! assert!(core
//!     .unlock(b"", None, &mut NullProgress, &mut StdDelay, &mut LoggingFaultScreens)
//!     .unwrap());
//! core.set(0x01, 0x01, b"hello", &mut LoggingFaultScreens).unwrap();
//! assert_eq!(
//!     core.get(0x01, 0x01, &mut LoggingFaultScreens).unwrap(),
//!     Some(b"hello".to_vec())
//! );
//! ```

pub mod auth;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod keys;
pub mod log;
pub mod pin_fail;
pub mod progress;
pub mod secbool;
pub mod session;
pub mod upgrade;

pub use config::StorageConfig;
pub use engine::StorageCore;
pub use error::{CryptoError, LogError, PinFailError, StorageError};
pub use log::{FileLog, MemoryLog, RecordLog};
pub use pin_fail::PinFailLog;
pub use progress::{Delay, FaultScreens, LoggingFaultScreens, NullProgress, ProgressCallback, StdDelay};
pub use secbool::SecBool;

#[cfg(feature = "secure-element")]
pub use crypto::pin_stretch::{MockSecureElement, SecureElement, SecureElementPinStretch};
pub use crypto::pin_stretch::{PinStretch, SoftwarePinStretch};
