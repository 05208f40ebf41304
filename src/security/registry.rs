use crate::error::CspError;
use crate::monitoring::stats::CspStats;
use crate::render::rewriter::{NonceRewriter, RewriteOutcome};
use crate::security::nonce::{NonceGenerator, NonceSource};
use crate::security::token::{Placeholder, TokenSigner};
use indexmap::{IndexMap, IndexSet};
use std::{
    cell::{Ref, RefCell},
    rc::Rc,
    sync::Arc,
};

/// Nonces issued during a single request, grouped by directive.
///
/// Values are only ever added. Iteration follows insertion order, which is
/// also the order nonces appear in the policy header.
#[derive(Debug, Clone)]
pub struct NonceRegistry {
    nonces: IndexMap<String, IndexSet<String>>,
    source: Rc<dyn NonceSource>,
}

impl NonceRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::with_source(NonceGenerator::default())
    }

    pub fn with_source(source: impl NonceSource + 'static) -> Self {
        Self {
            nonces: IndexMap::new(),
            source: Rc::new(source),
        }
    }

    /// Mints a fresh nonce and records it under `directive`.
    pub fn create_nonce(&mut self, directive: &str) -> Result<String, CspError> {
        let nonce = self.source.generate()?;
        self.record_nonce(directive, nonce.clone());
        Ok(nonce)
    }

    /// Records an externally obtained nonce. Recording a known value is a
    /// no-op.
    pub fn record_nonce(&mut self, directive: &str, nonce: impl Into<String>) {
        match self.nonces.get_mut(directive) {
            Some(set) => {
                set.insert(nonce.into());
            }
            None => {
                let mut set = IndexSet::new();
                set.insert(nonce.into());
                self.nonces.insert(directive.to_owned(), set);
            }
        }
    }

    #[inline]
    pub fn has_nonce(&self, directive: &str, nonce: &str) -> bool {
        self.nonces
            .get(directive)
            .map_or(false, |set| set.contains(nonce))
    }

    pub fn nonces<'a>(&'a self, directive: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.nonces
            .get(directive)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    #[inline]
    pub fn directives(&self) -> impl Iterator<Item = &str> {
        self.nonces.keys().map(String::as_str)
    }

    /// Total number of nonces across all directives.
    #[inline]
    pub fn len(&self) -> usize {
        self.nonces.values().map(IndexSet::len).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request handle on the nonce registry, stored in request extensions
/// by the middleware and handed to handlers and templates.
#[derive(Clone)]
pub struct RequestNonces {
    registry: Rc<RefCell<NonceRegistry>>,
    signer: Arc<dyn TokenSigner>,
    stats: Arc<CspStats>,
}

impl RequestNonces {
    pub fn new(registry: NonceRegistry, signer: Arc<dyn TokenSigner>, stats: Arc<CspStats>) -> Self {
        Self {
            registry: Rc::new(RefCell::new(registry)),
            signer,
            stats,
        }
    }

    pub fn create_nonce(&self, directive: &str) -> Result<String, CspError> {
        let nonce = self.registry.borrow_mut().create_nonce(directive)?;
        self.stats.increment_nonce_generation_count();
        Ok(nonce)
    }

    #[inline]
    pub fn has_nonce(&self, directive: &str, nonce: &str) -> bool {
        self.registry.borrow().has_nonce(directive, nonce)
    }

    /// Issues a nonce for `directive` and returns it wrapped in a signed
    /// placeholder token, suitable for markup that may be cached.
    pub fn placeholder(&self, directive: &str) -> Result<String, CspError> {
        crate::core::directives::validate_directive_name(directive)?;
        let nonce = self.create_nonce(directive)?;
        Ok(Placeholder::new(directive, nonce).sign(self.signer.as_ref()))
    }

    /// Same as [`placeholder`](Self::placeholder), rendered as a complete
    /// `nonce="…"` attribute.
    pub fn nonce_attr(&self, directive: &str) -> Result<String, CspError> {
        Ok(format!("nonce=\"{}\"", self.placeholder(directive)?))
    }

    /// Resolves every placeholder in `output` against this request's
    /// registry.
    pub fn rewrite(&self, output: &str) -> Result<RewriteOutcome, CspError> {
        let rewriter = NonceRewriter::new(self.signer.as_ref());
        let outcome = rewriter.rewrite(output, &mut self.registry.borrow_mut())?;
        self.stats.add_rewrite_outcome(&outcome);
        Ok(outcome)
    }

    #[inline]
    pub fn registry(&self) -> Ref<'_, NonceRegistry> {
        self.registry.borrow()
    }

    #[inline]
    pub fn signer(&self) -> &dyn TokenSigner {
        self.signer.as_ref()
    }
}

impl std::fmt::Debug for RequestNonces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestNonces")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
