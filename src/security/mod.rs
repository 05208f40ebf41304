pub mod nonce;
pub mod registry;
pub mod token;

pub use nonce::{NonceGenerator, NonceSource};
pub use registry::{NonceRegistry, RequestNonces};
pub use token::{HmacTokenSigner, Placeholder, TokenSigner};
