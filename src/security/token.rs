use crate::constants::{HMAC_KEY_LEN, PLACEHOLDER_SEPARATOR, TOKEN_SEPARATOR};
use crate::error::CspError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use ring::{
    hmac,
    rand::{SecureRandom, SystemRandom},
};
use std::fmt;

/// Tamper-evident encoding of short strings.
///
/// Tokens end up inside double-quoted HTML attributes, so implementations
/// must never emit `"`.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, data: &str) -> String;

    fn verify(&self, token: &str) -> Result<String, CspError>;
}

/// HMAC-SHA256 signer. Tokens have the form
/// `base64url(payload) "." base64url(tag)`.
///
/// Every process serving the same cached pages must share the secret,
/// otherwise cached placeholders fail verification after a restart.
pub struct HmacTokenSigner {
    key: hmac::Key,
}

impl HmacTokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self, CspError> {
        if secret.is_empty() {
            return Err(CspError::ConfigError(
                "token signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    /// Creates a signer with a random per-process key.
    pub fn generate() -> Result<Self, CspError> {
        let rng = SystemRandom::new();
        let mut secret = [0u8; HMAC_KEY_LEN];
        rng.fill(&mut secret)
            .map_err(|_| CspError::CryptoError("failed to generate signing key".to_string()))?;
        Self::new(&secret)
    }
}

impl TokenSigner for HmacTokenSigner {
    fn sign(&self, data: &str) -> String {
        let tag = hmac::sign(&self.key, data.as_bytes());
        let mut token = BASE64.encode(data.as_bytes());
        token.push(TOKEN_SEPARATOR);
        BASE64.encode_string(tag.as_ref(), &mut token);
        token
    }

    fn verify(&self, token: &str) -> Result<String, CspError> {
        let invalid = || CspError::InvalidToken(token.to_string());

        let (payload, tag) = token.split_once(TOKEN_SEPARATOR).ok_or_else(invalid)?;
        let payload = BASE64.decode(payload).map_err(|_| invalid())?;
        let tag = BASE64.decode(tag).map_err(|_| invalid())?;

        hmac::verify(&self.key, &payload, &tag).map_err(|_| invalid())?;
        String::from_utf8(payload).map_err(|_| invalid())
    }
}

impl fmt::Debug for HmacTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacTokenSigner").finish_non_exhaustive()
    }
}

/// The `<directive>:<nonce>` pair carried by a placeholder token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placeholder {
    pub directive: String,
    pub nonce: String,
}

impl Placeholder {
    #[inline]
    pub fn new(directive: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
            nonce: nonce.into(),
        }
    }

    pub fn sign(&self, signer: &dyn TokenSigner) -> String {
        signer.sign(&format!(
            "{}{}{}",
            self.directive, PLACEHOLDER_SEPARATOR, self.nonce
        ))
    }

    /// Verifies `token` and splits its payload on the first separator.
    pub fn verify(token: &str, signer: &dyn TokenSigner) -> Result<Self, CspError> {
        let payload = signer.verify(token)?;
        match payload.split_once(PLACEHOLDER_SEPARATOR) {
            Some((directive, nonce)) if !directive.is_empty() => Ok(Self::new(directive, nonce)),
            _ => Err(CspError::MalformedPayload(payload)),
        }
    }
}
