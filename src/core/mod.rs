pub mod config;
pub mod directives;
pub mod policy;
pub mod source;

pub use config::{CspConfig, CspConfigBuilder, CspSettings, EmptyDirectives, RequestClass};
pub use directives::*;
pub use policy::{build_header_string, build_header_value, CspPolicy};
pub use source::Source;
