//! PIN-stretching backend.
//!
//! The software path trusts PBKDF2's iteration count alone. The optional
//! `secure-element` feature instead routes the already-PBKDF2-stretched PIN
//! through a hardware counter that enforces its own retry budget
//! independently of this crate's in-log `PinFailLog`, mirroring the
//! reference firmware's Optiga-backed `optiga_pin_set`/`optiga_pin_verify`.

use crate::error::CryptoError;

/// Stretches an already-PBKDF2-derived 32-byte value into the 32-byte
/// `secret` actually used to derive KEK/KEIV.
pub trait PinStretch {
    /// Bind `stretched_pin` to the backend for the first time (set-PIN path).
    fn stretch_set(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError>;

    /// Verify `stretched_pin` against whatever the backend bound earlier
    /// (unlock path). Returns the same 32-byte `secret` on success.
    fn stretch_verify(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError>;
}

/// The always-available backend: PBKDF2's 20,000 iterations are the entire
/// stretch, so `secret` is just `stretched_pin` passed through.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwarePinStretch;

impl PinStretch for SoftwarePinStretch {
    fn stretch_set(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
        Ok(*stretched_pin)
    }

    fn stretch_verify(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
        Ok(*stretched_pin)
    }
}

#[cfg(feature = "secure-element")]
mod secure_element {
    use super::{CryptoError, PinStretch};

    /// Narrow hardware collaborator contract a real secure-element driver
    /// would implement; `MockSecureElement` stands in for testing.
    pub trait SecureElement {
        fn pin_set(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError>;
        fn pin_verify(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError>;
    }

    /// Routes `PinStretch` calls through a `SecureElement` implementation.
    pub struct SecureElementPinStretch<E> {
        element: E,
    }

    impl<E: SecureElement> SecureElementPinStretch<E> {
        pub fn new(element: E) -> Self {
            Self { element }
        }
    }

    impl<E: SecureElement> PinStretch for SecureElementPinStretch<E> {
        fn stretch_set(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
            self.element.pin_set(stretched_pin)
        }

        fn stretch_verify(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
            self.element.pin_verify(stretched_pin)
        }
    }

    /// An in-memory `SecureElement` with its own retry counter, for tests
    /// exercising the `secure-element` path without real hardware.
    #[derive(Default)]
    pub struct MockSecureElement {
        bound: Option<[u8; 32]>,
        counter: u32,
        max_tries: u32,
    }

    impl MockSecureElement {
        pub fn new(max_tries: u32) -> Self {
            Self {
                bound: None,
                counter: 0,
                max_tries,
            }
        }
    }

    impl SecureElement for MockSecureElement {
        fn pin_set(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
            self.bound = Some(*stretched_pin);
            self.counter = 0;
            Ok(crate::crypto::sha256(stretched_pin))
        }

        fn pin_verify(&mut self, stretched_pin: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
            if self.counter >= self.max_tries {
                return Err(CryptoError::SecureElementCounterExceeded);
            }
            self.counter += 1;
            match self.bound {
                Some(bound) if crate::crypto::secequal(&bound, stretched_pin) => {
                    self.counter = 0;
                    Ok(crate::crypto::sha256(stretched_pin))
                }
                _ => Err(CryptoError::SecureElement("PIN mismatch".into())),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn set_then_verify_round_trips() {
            let mut element = SecureElementPinStretch::new(MockSecureElement::new(10));
            let stretched = [0x42u8; 32];
            let set_secret = element.stretch_set(&stretched).unwrap();
            let verify_secret = element.stretch_verify(&stretched).unwrap();
            assert_eq!(set_secret, verify_secret);
        }

        #[test]
        fn wrong_pin_is_rejected() {
            let mut element = SecureElementPinStretch::new(MockSecureElement::new(10));
            element.stretch_set(&[0x42u8; 32]).unwrap();
            assert!(element.stretch_verify(&[0x43u8; 32]).is_err());
        }

        #[test]
        fn counter_exceeded_locks_out_the_element() {
            let mut element = SecureElementPinStretch::new(MockSecureElement::new(2));
            element.stretch_set(&[0x42u8; 32]).unwrap();
            assert!(element.stretch_verify(&[0x00u8; 32]).is_err());
            assert!(element.stretch_verify(&[0x00u8; 32]).is_err());
            assert!(matches!(
                element.stretch_verify(&[0x00u8; 32]),
                Err(CryptoError::SecureElementCounterExceeded)
            ));
        }
    }
}

#[cfg(feature = "secure-element")]
pub use secure_element::{MockSecureElement, SecureElement, SecureElementPinStretch};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_stretch_is_a_pass_through() {
        let mut stretch = SoftwarePinStretch;
        let stretched = [7u8; 32];
        assert_eq!(stretch.stretch_set(&stretched).unwrap(), stretched);
        assert_eq!(stretch.stretch_verify(&stretched).unwrap(), stretched);
    }
}
