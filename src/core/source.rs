use crate::constants::{
    NONCE_MARKER, NONCE_PREFIX, NONE_SOURCE, REPORT_SAMPLE_SOURCE, SELF_SOURCE,
    STRICT_DYNAMIC_SOURCE, SUFFIX_QUOTE, UNSAFE_EVAL_SOURCE, UNSAFE_HASHES_SOURCE,
    UNSAFE_INLINE_SOURCE, WASM_UNSAFE_EVAL_SOURCE,
};
use crate::error::CspError;
use crate::utils::BufferWriter;
use bytes::BytesMut;
use std::{borrow::Cow, fmt, str::FromStr};

/// A single source expression of a directive.
///
/// `NonceMarker` is never serialized on its own: the policy builder replaces
/// it with one `'nonce-…'` expression per nonce issued for the directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    None,
    Self_,
    UnsafeInline,
    UnsafeEval,
    StrictDynamic,
    ReportSample,
    WasmUnsafeEval,
    UnsafeHashes,
    Host(Cow<'static, str>),
    Scheme(Cow<'static, str>),
    Nonce(Cow<'static, str>),
    NonceMarker,
}

impl Source {
    #[inline(always)]
    pub const fn is_none(&self) -> bool {
        matches!(self, Source::None)
    }

    #[inline(always)]
    pub const fn is_nonce_marker(&self) -> bool {
        matches!(self, Source::NonceMarker)
    }

    #[inline]
    pub const fn as_static_str(&self) -> Option<&'static str> {
        match self {
            Source::None => Some(NONE_SOURCE),
            Source::Self_ => Some(SELF_SOURCE),
            Source::UnsafeInline => Some(UNSAFE_INLINE_SOURCE),
            Source::UnsafeEval => Some(UNSAFE_EVAL_SOURCE),
            Source::StrictDynamic => Some(STRICT_DYNAMIC_SOURCE),
            Source::ReportSample => Some(REPORT_SAMPLE_SOURCE),
            Source::WasmUnsafeEval => Some(WASM_UNSAFE_EVAL_SOURCE),
            Source::UnsafeHashes => Some(UNSAFE_HASHES_SOURCE),
            _ => None,
        }
    }

    #[inline]
    pub fn estimated_size(&self) -> usize {
        match self {
            Source::Host(host) => host.len(),
            Source::Scheme(scheme) => scheme.len() + 1,
            Source::Nonce(nonce) => NONCE_PREFIX.len() + nonce.len() + SUFFIX_QUOTE.len(),
            // 16 random bytes encode to 22 base64url characters
            Source::NonceMarker => NONCE_PREFIX.len() + 22 + SUFFIX_QUOTE.len(),
            keyword => keyword.as_static_str().map_or(0, str::len),
        }
    }

    /// Parses a source expression as written in configuration.
    ///
    /// Keywords are accepted with or without their single quotes and in any
    /// ASCII case. Anything that is not a keyword, nonce, scheme or the
    /// nonce marker is kept verbatim as a host expression.
    pub fn parse(value: &str) -> Result<Self, CspError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CspError::ConfigError("empty source expression".to_string()));
        }

        if value == NONCE_MARKER {
            return Ok(Source::NonceMarker);
        }

        let unquoted = value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .unwrap_or(value);

        let keyword = match unquoted.to_ascii_lowercase().as_str() {
            "none" => Some(Source::None),
            "self" => Some(Source::Self_),
            "unsafe-inline" => Some(Source::UnsafeInline),
            "unsafe-eval" => Some(Source::UnsafeEval),
            "strict-dynamic" => Some(Source::StrictDynamic),
            "report-sample" => Some(Source::ReportSample),
            "wasm-unsafe-eval" => Some(Source::WasmUnsafeEval),
            "unsafe-hashes" => Some(Source::UnsafeHashes),
            _ => None,
        };
        if let Some(keyword) = keyword {
            return Ok(keyword);
        }

        if unquoted.len() != value.len() {
            if let Some(nonce) = unquoted.strip_prefix("nonce-") {
                if nonce.is_empty() {
                    return Err(CspError::ConfigError(format!(
                        "nonce source without a value: {}",
                        value
                    )));
                }
                return Ok(Source::Nonce(Cow::Owned(nonce.to_owned())));
            }
        }

        if let Some(scheme) = value.strip_suffix(':') {
            if is_scheme(scheme) {
                return Ok(Source::Scheme(Cow::Owned(scheme.to_owned())));
            }
        }

        Ok(Source::Host(Cow::Owned(value.to_owned())))
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl FromStr for Source {
    type Err = CspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::parse(s)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Host(host) => f.write_str(host),
            Source::Scheme(scheme) => write!(f, "{}:", scheme),
            Source::Nonce(nonce) => write!(f, "{}{}{}", NONCE_PREFIX, nonce, SUFFIX_QUOTE),
            Source::NonceMarker => f.write_str(NONCE_MARKER),
            keyword => f.write_str(keyword.as_static_str().unwrap_or_default()),
        }
    }
}

impl BufferWriter for Source {
    fn write_to_buffer(&self, buffer: &mut BytesMut) {
        match self {
            Source::Host(host) => buffer.extend_from_slice(host.as_bytes()),
            Source::Scheme(scheme) => {
                buffer.extend_from_slice(scheme.as_bytes());
                buffer.extend_from_slice(b":");
            }
            Source::Nonce(nonce) => write_nonce(buffer, nonce),
            // Expanded by the policy builder; a bare marker contributes nothing.
            Source::NonceMarker => {}
            keyword => {
                if let Some(value) = keyword.as_static_str() {
                    buffer.extend_from_slice(value.as_bytes());
                }
            }
        }
    }
}

#[inline]
pub(crate) fn write_nonce(buffer: &mut BytesMut, nonce: &str) {
    buffer.reserve(NONCE_PREFIX.len() + nonce.len() + SUFFIX_QUOTE.len());
    buffer.extend_from_slice(NONCE_PREFIX.as_bytes());
    buffer.extend_from_slice(nonce.as_bytes());
    buffer.extend_from_slice(SUFFIX_QUOTE.as_bytes());
}
