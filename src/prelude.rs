pub use crate::core::{CspConfig, CspConfigBuilder, CspSettings, RequestClass, Source};
pub use crate::middleware::{csp_nonce_middleware, CspExtensions, CspNonceMiddleware};
pub use crate::monitoring::CspStats;
pub use crate::security::{HmacTokenSigner, NonceRegistry, RequestNonces, TokenSigner};
