use crate::constants::DEFAULT_NONCE_LENGTH;
use crate::error::CspError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use getrandom::getrandom;
use smallvec::{smallvec, SmallVec};
use std::fmt::Debug;

/// Anything able to mint fresh nonce values.
///
/// Implementations must fail rather than hand out a predictable value.
pub trait NonceSource: Debug {
    fn generate(&self) -> Result<String, CspError>;
}

/// Draws nonces from the operating system's entropy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceGenerator {
    length: usize,
}

impl NonceGenerator {
    /// Creates a generator producing `length` random bytes per nonce.
    ///
    /// Lengths below 16 bytes are raised to 16 so every nonce carries at
    /// least 128 bits of entropy.
    #[inline]
    pub fn new(length: usize) -> Self {
        if length < DEFAULT_NONCE_LENGTH {
            log::warn!(
                "nonce length {} is below {} bytes, using {}",
                length,
                DEFAULT_NONCE_LENGTH,
                DEFAULT_NONCE_LENGTH
            );
        }
        Self {
            length: length.max(DEFAULT_NONCE_LENGTH),
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&self) -> Result<String, CspError> {
        let mut buffer: SmallVec<[u8; 32]> = smallvec![0u8; self.length];
        getrandom(&mut buffer).map_err(|err| {
            log::error!("entropy source unavailable: {}", err);
            CspError::CryptoError(format!("failed to generate random bytes: {}", err))
        })?;
        Ok(BASE64.encode(&buffer))
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_LENGTH)
    }
}

impl NonceSource for NonceGenerator {
    #[inline]
    fn generate(&self) -> Result<String, CspError> {
        NonceGenerator::generate(self)
    }
}
