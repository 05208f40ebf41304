pub mod constants;
pub mod core;
pub mod error;
pub mod middleware;
pub mod monitoring;
pub mod prelude;
pub mod render;
pub mod security;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::{
    build_header_string, build_header_value, CspConfig, CspConfigBuilder, CspPolicy, CspSettings,
    EmptyDirectives, RequestClass, Source,
};
pub use crate::error::CspError;
pub use crate::middleware::{csp_nonce_middleware, CspExtensions, CspNonceMiddleware};
pub use crate::monitoring::CspStats;
pub use crate::render::{maybe_attach_header, NonceRewriter, RewriteOutcome};
pub use crate::security::{
    HmacTokenSigner, NonceGenerator, NonceRegistry, NonceSource, Placeholder, RequestNonces,
    TokenSigner,
};
