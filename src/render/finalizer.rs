use crate::core::config::{CspConfig, RequestClass};
use crate::core::policy::CspPolicy;
use crate::error::CspError;
use crate::security::registry::NonceRegistry;
use actix_web::http::header::HeaderMap;

/// Attaches the policy header unless the policy is disabled for this class
/// of request. An existing header of the same name is overwritten.
///
/// Must run after the rewrite pass so the registry holds every nonce that
/// reached the output. Returns whether a header was attached.
pub fn maybe_attach_header(
    config: &CspConfig,
    class: RequestClass,
    registry: &NonceRegistry,
    headers: &mut HeaderMap,
) -> Result<bool, CspError> {
    if !config.applies_to(class) {
        return Ok(false);
    }

    let policy = CspPolicy::new(config, registry);
    let value = policy.header_value()?;
    headers.insert(policy.header_name(), value);
    Ok(true)
}
