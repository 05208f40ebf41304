use bytes::BytesMut;
use std::borrow::Cow;

pub(crate) trait BufferWriter {
    fn write_to_buffer(&self, buffer: &mut BytesMut);
}

/// Resolves `$NAME` and `${NAME}` references against the process environment.
///
/// Values that are not references, or that name an unset variable, are
/// returned unchanged.
pub fn resolve_env(value: &str) -> Cow<'_, str> {
    let name = match value.strip_prefix('$') {
        Some(rest) => rest
            .strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .unwrap_or(rest),
        None => return Cow::Borrowed(value),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Cow::Borrowed(value);
    }

    match std::env::var(name) {
        Ok(resolved) => Cow::Owned(resolved),
        Err(_) => {
            log::debug!("environment variable {} is not set, keeping literal", name);
            Cow::Borrowed(value)
        }
    }
}
