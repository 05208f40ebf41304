pub mod finalizer;
pub mod rewriter;

pub use finalizer::maybe_attach_header;
pub use rewriter::{NonceRewriter, RewriteOutcome};
