use crate::constants::NONCE_ATTRIBUTE_PATTERN;
use crate::error::CspError;
use crate::security::registry::NonceRegistry;
use crate::security::token::{Placeholder, TokenSigner};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

fn nonce_attribute() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(NONCE_ATTRIBUTE_PATTERN).expect("nonce attribute pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewriteOutcome {
    pub output: String,
    /// Attributes rewritten to a verified nonce.
    pub resolved: usize,
    /// Nonces newly created during the pass.
    pub minted: usize,
    /// Attributes left untouched because their token did not verify.
    pub rejected: usize,
}

/// Resolves signed `nonce="…"` placeholders in rendered output.
///
/// A placeholder whose nonce is already in the registry was issued during
/// this request and is kept. Otherwise the markup came out of a page cache
/// and the placeholder gets a freshly minted nonce. Placeholders carrying
/// the same directive and nonce resolve to the same final nonce, even when
/// the signer produced different token text for them.
pub struct NonceRewriter<'a> {
    signer: &'a dyn TokenSigner,
}

impl<'a> NonceRewriter<'a> {
    #[inline]
    pub fn new(signer: &'a dyn TokenSigner) -> Self {
        Self { signer }
    }

    pub fn rewrite(
        &self,
        output: &str,
        registry: &mut NonceRegistry,
    ) -> Result<RewriteOutcome, CspError> {
        let mut outcome = RewriteOutcome::default();
        let mut by_token: FxHashMap<&str, Option<String>> = FxHashMap::default();
        let mut by_payload: FxHashMap<Placeholder, String> = FxHashMap::default();
        let mut rewritten = String::with_capacity(output.len());
        let mut last = 0;

        for captures in nonce_attribute().captures_iter(output) {
            let (Some(attribute), Some(token)) = (captures.get(0), captures.get(1)) else {
                continue;
            };

            let nonce = match by_token.get(token.as_str()).cloned() {
                Some(nonce) => nonce,
                None => {
                    let nonce =
                        self.resolve(token.as_str(), registry, &mut by_payload, &mut outcome)?;
                    by_token.insert(token.as_str(), nonce.clone());
                    nonce
                }
            };

            rewritten.push_str(&output[last..attribute.start()]);
            match nonce {
                Some(nonce) => {
                    rewritten.push_str("nonce=\"");
                    rewritten.push_str(&nonce);
                    rewritten.push('"');
                    outcome.resolved += 1;
                }
                None => {
                    rewritten.push_str(attribute.as_str());
                    outcome.rejected += 1;
                }
            }
            last = attribute.end();
        }

        rewritten.push_str(&output[last..]);
        outcome.output = rewritten;
        Ok(outcome)
    }

    fn resolve(
        &self,
        token: &str,
        registry: &mut NonceRegistry,
        by_payload: &mut FxHashMap<Placeholder, String>,
        outcome: &mut RewriteOutcome,
    ) -> Result<Option<String>, CspError> {
        let placeholder = match Placeholder::verify(token, self.signer) {
            Ok(placeholder) => placeholder,
            Err(err) => {
                log::debug!("leaving nonce attribute untouched: {}", err);
                return Ok(None);
            }
        };

        if let Some(nonce) = by_payload.get(&placeholder) {
            return Ok(Some(nonce.clone()));
        }

        let nonce = if registry.has_nonce(&placeholder.directive, &placeholder.nonce) {
            placeholder.nonce.clone()
        } else {
            let nonce = registry.create_nonce(&placeholder.directive)?;
            outcome.minted += 1;
            nonce
        };
        by_payload.insert(placeholder, nonce.clone());
        Ok(Some(nonce))
    }
}
