use actix_web_csp_nonce::{
    build_header_value, CspConfigBuilder, CspError, HmacTokenSigner, NonceRegistry, NonceRewriter,
    NonceSource, Placeholder, RewriteOutcome, Source, TokenSigner,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

fn signer() -> HmacTokenSigner {
    HmacTokenSigner::new(b"rewriter property secret").unwrap()
}

#[derive(Debug)]
struct ExhaustedEntropy;

impl NonceSource for ExhaustedEntropy {
    fn generate(&self) -> Result<String, CspError> {
        Err(CspError::CryptoError("no entropy".to_string()))
    }
}

/// Prefixes every token with a fresh counter, so equal payloads never
/// produce equal token text.
struct SaltedSigner {
    inner: HmacTokenSigner,
    counter: AtomicU64,
}

impl SaltedSigner {
    fn new() -> Self {
        Self {
            inner: signer(),
            counter: AtomicU64::new(0),
        }
    }
}

impl TokenSigner for SaltedSigner {
    fn sign(&self, data: &str) -> String {
        let salt = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}~{}", salt, self.inner.sign(data))
    }

    fn verify(&self, token: &str) -> Result<String, CspError> {
        let (_, token) = token
            .split_once('~')
            .ok_or_else(|| CspError::InvalidToken(token.to_owned()))?;
        self.inner.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_nonce_is_kept() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let nonce = registry.create_nonce("script-src").unwrap();
        let token = Placeholder::new("script-src", nonce.as_str()).sign(&signer);
        let html = format!("<script nonce=\"{}\"></script>", token);

        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        assert_eq!(outcome.output, format!("<script nonce=\"{}\"></script>", nonce));
        assert_eq!((outcome.resolved, outcome.minted, outcome.rejected), (1, 0, 0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cached_placeholder_gets_fresh_nonce() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let token = Placeholder::new("script-src", "p1").sign(&signer);
        let html = format!("<script nonce=\"{}\">", token);

        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        let minted: Vec<_> = registry.nonces("script-src").collect();
        assert_eq!(minted.len(), 1);
        assert_ne!(minted[0], "p1");
        assert_eq!(outcome.output, format!("<script nonce=\"{}\">", minted[0]));
        assert_eq!(outcome.minted, 1);
    }

    #[test]
    fn test_repeated_placeholder_resolves_once() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let token = Placeholder::new("script-src", "abc").sign(&signer);
        let html = format!(
            "<script nonce=\"{t}\"></script><p>x</p><script nonce=\"{t}\"></script>",
            t = token
        );

        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        let nonce = registry.nonces("script-src").next().unwrap().to_owned();
        assert_eq!(registry.len(), 1);
        assert_eq!(outcome.output.matches(&format!("nonce=\"{}\"", nonce)).count(), 2);
        assert_eq!((outcome.resolved, outcome.minted), (2, 1));
    }

    #[test]
    fn test_invalid_tokens_are_left_alone() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let foreign = HmacTokenSigner::new(b"someone else").unwrap();
        let forged = Placeholder::new("script-src", "evil").sign(&foreign);
        let malformed = signer.sign("no-separator");
        let html = format!(
            r#"<script nonce="{}"></script><script nonce="{}"></script><script nonce=""></script>"#,
            forged, malformed
        );

        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        assert_eq!(outcome.output, html);
        assert_eq!(outcome.rejected, 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_directives_are_kept_apart() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let script = Placeholder::new("script-src", "same").sign(&signer);
        let style = Placeholder::new("style-src", "same").sign(&signer);
        let html = format!(r#"<script nonce="{}"></script><style nonce="{}"></style>"#, script, style);

        NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        assert_eq!(registry.nonces("script-src").count(), 1);
        assert_eq!(registry.nonces("style-src").count(), 1);
        assert_ne!(
            registry.nonces("script-src").next(),
            registry.nonces("style-src").next()
        );
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let token = Placeholder::new("style-src", "p").sign(&signer);
        let html = format!(r#"<style nonce="{}"></style>"#, token);

        let rewriter = NonceRewriter::new(&signer);
        let first = rewriter.rewrite(&html, &mut registry).unwrap();
        let second = rewriter.rewrite(&first.output, &mut registry).unwrap();

        assert_eq!(second.output, first.output);
        assert_eq!(second.minted, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_output_without_placeholders_is_unchanged() {
        let signer = signer();
        let mut registry = NonceRegistry::new();
        let html = "<html><body>nonce = 'x'</body></html>";

        let outcome = NonceRewriter::new(&signer).rewrite(html, &mut registry).unwrap();
        assert_eq!(outcome.output, html);
        assert_eq!(outcome, RewriteOutcome { output: html.to_string(), ..Default::default() });
    }

    #[test]
    fn test_rewritten_output_matches_header() {
        let signer = signer();
        let script = Placeholder::new("script-src", "a").sign(&signer);
        let style = Placeholder::new("style-src", "b").sign(&signer);
        let html = format!(
            r#"<script nonce="{s}"></script><style nonce="{t}"></style><script nonce="{s}"></script>"#,
            s = script,
            t = style
        );
        let mut registry = NonceRegistry::new();
        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        let config = CspConfigBuilder::new()
            .enabled(true)
            .script_src([Source::Self_, Source::NonceMarker])
            .style_src([Source::NonceMarker])
            .build()
            .unwrap();
        let header = build_header_value(&config, &registry).unwrap();
        let header = header.to_str().unwrap();

        let script_nonce = registry.nonces("script-src").next().unwrap();
        let style_nonce = registry.nonces("style-src").next().unwrap();
        assert_eq!(
            header,
            format!("script-src 'self' 'nonce-{}'; style-src 'nonce-{}'", script_nonce, style_nonce)
        );
        assert_eq!(outcome.output.matches(script_nonce).count(), 2);
        assert_eq!(outcome.output.matches(style_nonce).count(), 1);
    }

    #[test]
    fn test_entropy_failure_aborts_rewrite() {
        let signer = signer();
        let token = Placeholder::new("script-src", "p1").sign(&signer);
        let html = format!("<script nonce=\"{}\">", token);
        let mut registry = NonceRegistry::with_source(ExhaustedEntropy);

        let result = NonceRewriter::new(&signer).rewrite(&html, &mut registry);

        assert!(matches!(result, Err(CspError::CryptoError(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entropy_failure_is_not_hit_for_known_nonces() {
        let signer = signer();
        let mut registry = NonceRegistry::with_source(ExhaustedEntropy);
        registry.record_nonce("script-src", "known");
        let token = Placeholder::new("script-src", "known").sign(&signer);
        let html = format!("<script nonce=\"{}\">", token);

        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();
        assert_eq!(outcome.output, "<script nonce=\"known\">");
    }

    #[test]
    fn test_custom_signer_is_honoured() {
        struct Plain;

        impl TokenSigner for Plain {
            fn sign(&self, data: &str) -> String {
                format!("plain-{}", data)
            }

            fn verify(&self, token: &str) -> Result<String, CspError> {
                token
                    .strip_prefix("plain-")
                    .map(str::to_owned)
                    .ok_or_else(|| CspError::InvalidToken(token.to_owned()))
            }
        }

        let mut registry = NonceRegistry::new();
        registry.record_nonce("style-src", "n1");
        let outcome = NonceRewriter::new(&Plain)
            .rewrite(r#"<style nonce="plain-style-src:n1"></style>"#, &mut registry)
            .unwrap();

        assert_eq!(outcome.output, r#"<style nonce="n1"></style>"#);
    }

    #[test]
    fn test_differently_signed_duplicates_share_a_nonce() {
        let signer = SaltedSigner::new();
        let first = Placeholder::new("script-src", "abc").sign(&signer);
        let second = Placeholder::new("script-src", "abc").sign(&signer);
        assert_ne!(first, second);

        let html = format!(
            r#"<script nonce="{}"></script><script nonce="{}"></script>"#,
            first, second
        );
        let mut registry = NonceRegistry::new();
        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        let nonces: Vec<_> = registry.nonces("script-src").collect();
        assert_eq!(nonces.len(), 1);
        assert_eq!(
            outcome.output,
            format!(r#"<script nonce="{n}"></script><script nonce="{n}"></script>"#, n = nonces[0])
        );
        assert_eq!((outcome.resolved, outcome.minted), (2, 1));
    }

    #[test]
    fn test_differently_signed_issued_nonce_is_kept() {
        let signer = SaltedSigner::new();
        let mut registry = NonceRegistry::new();
        let nonce = registry.create_nonce("style-src").unwrap();
        let html = format!(
            r#"<style nonce="{}"></style><style nonce="{}"></style>"#,
            Placeholder::new("style-src", nonce.as_str()).sign(&signer),
            Placeholder::new("style-src", nonce.as_str()).sign(&signer)
        );

        let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

        assert_eq!(outcome.output.matches(&format!("nonce=\"{}\"", nonce)).count(), 2);
        assert_eq!(outcome.minted, 0);
        assert_eq!(registry.len(), 1);
    }

    proptest! {
        #[test]
        fn test_flipped_bit_is_left_alone(index in any::<prop::sample::Index>(), bit in 0u8..7) {
            let signer = signer();
            let token = Placeholder::new("script-src", "abc").sign(&signer);
            let mut bytes = token.clone().into_bytes();
            let position = index.index(bytes.len());
            bytes[position] ^= 1 << bit;
            let tampered = String::from_utf8(bytes).unwrap();
            prop_assume!(tampered != token);

            let html = format!("<script nonce=\"{}\"></script>", tampered);
            let mut registry = NonceRegistry::new();
            let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

            prop_assert_eq!(outcome.output, html);
            prop_assert!(registry.is_empty());
        }

        #[test]
        fn test_plain_markup_is_unchanged(html in "[a-z<>/= \"]{0,64}") {
            let signer = signer();
            let mut registry = NonceRegistry::new();
            let outcome = NonceRewriter::new(&signer).rewrite(&html, &mut registry).unwrap();

            prop_assert_eq!(outcome.output, html);
            prop_assert_eq!(outcome.resolved, 0);
        }
    }
}
