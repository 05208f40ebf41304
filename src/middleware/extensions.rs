use crate::error::CspError;
use crate::security::registry::RequestNonces;
use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};

pub trait CspExtensions {
    /// The request's nonce handle, present when the request went through
    /// [`CspNonceMiddleware`](crate::middleware::CspNonceMiddleware).
    fn csp_nonces(&self) -> Option<RequestNonces>;

    /// A complete `nonce="…"` attribute carrying a signed placeholder for
    /// `directive`.
    fn csp_nonce_attr(&self, directive: &str) -> Result<String, CspError>;
}

impl<T> CspExtensions for T
where
    T: HttpMessage,
{
    fn csp_nonces(&self) -> Option<RequestNonces> {
        self.extensions().get::<RequestNonces>().cloned()
    }

    fn csp_nonce_attr(&self, directive: &str) -> Result<String, CspError> {
        self.csp_nonces()
            .ok_or_else(missing_middleware)?
            .nonce_attr(directive)
    }
}

fn missing_middleware() -> CspError {
    CspError::ConfigError("CSP nonce middleware is not installed".to_string())
}

impl FromRequest for RequestNonces {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.csp_nonces().ok_or_else(|| missing_middleware().into()))
    }
}
