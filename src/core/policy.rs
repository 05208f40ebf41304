use crate::constants::{DEFAULT_BUFFER_CAPACITY, REPORT_URI, SEMICOLON_SPACE};
use crate::core::config::{CspConfig, EmptyDirectives};
use crate::core::directives::Directive;
use crate::core::source::{write_nonce, Source};
use crate::error::CspError;
use crate::security::registry::NonceRegistry;
use crate::utils::BufferWriter;
use actix_web::http::header::{HeaderName, HeaderValue};
use bytes::BytesMut;

/// The effective policy of one response: configured directives with nonce
/// markers expanded from the request's registry.
#[derive(Debug, Clone, Copy)]
pub struct CspPolicy<'a> {
    config: &'a CspConfig,
    registry: &'a NonceRegistry,
}

impl<'a> CspPolicy<'a> {
    #[inline]
    pub fn new(config: &'a CspConfig, registry: &'a NonceRegistry) -> Self {
        Self { config, registry }
    }

    #[inline]
    pub fn header_name(&self) -> HeaderName {
        self.config.header_name()
    }

    pub fn header_value(&self) -> Result<HeaderValue, CspError> {
        let buffer = self.serialize();
        HeaderValue::from_maybe_shared(buffer.freeze()).map_err(|_| {
            CspError::HeaderError("policy contains bytes not allowed in a header".to_string())
        })
    }

    pub fn header_string(&self) -> String {
        String::from_utf8_lossy(&self.serialize()).into_owned()
    }

    fn serialize(&self) -> BytesMut {
        let capacity = self
            .config
            .directives()
            .map(|d| d.estimated_size() + SEMICOLON_SPACE.len())
            .sum::<usize>()
            .max(DEFAULT_BUFFER_CAPACITY);
        let mut buffer = BytesMut::with_capacity(capacity);

        for directive in self.config.directives() {
            self.write_directive(directive, &mut buffer);
        }

        if let Some(uri) = self.config.report_uri() {
            if !buffer.is_empty() {
                buffer.extend_from_slice(SEMICOLON_SPACE);
            }
            buffer.extend_from_slice(REPORT_URI.as_bytes());
            buffer.extend_from_slice(b" ");
            buffer.extend_from_slice(uri.as_bytes());
        }

        buffer
    }

    fn write_directive(&self, directive: &Directive, buffer: &mut BytesMut) {
        let start = buffer.len();
        if start > 0 {
            buffer.extend_from_slice(SEMICOLON_SPACE);
        }
        buffer.extend_from_slice(directive.name().as_bytes());

        if directive.is_valueless() {
            return;
        }

        let mut written = 0usize;
        for source in directive.sources() {
            if let Source::NonceMarker = source {
                for nonce in self.registry.nonces(directive.name()) {
                    buffer.extend_from_slice(b" ");
                    write_nonce(buffer, nonce);
                    written += 1;
                }
            } else {
                buffer.extend_from_slice(b" ");
                source.write_to_buffer(buffer);
                written += 1;
            }
        }

        if written == 0 && self.config.empty_directives() == EmptyDirectives::Omit {
            log::debug!(
                "omitting directive {} with no nonces issued",
                directive.name()
            );
            buffer.truncate(start);
        }
    }
}

/// Serialises `config` against the nonces issued so far.
pub fn build_header_value(
    config: &CspConfig,
    registry: &NonceRegistry,
) -> Result<HeaderValue, CspError> {
    CspPolicy::new(config, registry).header_value()
}

#[inline]
pub fn build_header_string(config: &CspConfig, registry: &NonceRegistry) -> String {
    CspPolicy::new(config, registry).header_string()
}
