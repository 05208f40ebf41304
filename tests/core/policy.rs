use actix_web_csp_nonce::{
    build_header_string, build_header_value, CspConfig, CspConfigBuilder, CspPolicy,
    EmptyDirectives, NonceRegistry, Source,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NonceRegistry {
        let mut registry = NonceRegistry::new();
        registry.record_nonce("script-src", "N1");
        registry.record_nonce("style-src", "N3");
        registry.record_nonce("script-src", "N2");
        registry
    }

    #[test]
    fn test_markers_expand_in_registry_order() {
        let config = CspConfigBuilder::new()
            .script_src([Source::Self_, Source::NonceMarker])
            .style_src([Source::NonceMarker])
            .build()
            .unwrap();

        let header = build_header_string(&config, &registry());
        assert_eq!(
            header,
            "script-src 'self' 'nonce-N1' 'nonce-N2'; style-src 'nonce-N3'"
        );
    }

    #[test]
    fn test_marker_position_is_preserved() {
        let config = CspConfigBuilder::new()
            .script_src([
                Source::NonceMarker,
                Source::StrictDynamic,
                Source::Scheme("https".into()),
            ])
            .build()
            .unwrap();

        let header = CspPolicy::new(&config, &registry()).header_string();
        assert_eq!(
            header,
            "script-src 'nonce-N1' 'nonce-N2' 'strict-dynamic' https:"
        );
    }

    #[test]
    fn test_directive_without_nonces_is_omitted_by_default() {
        let config = CspConfigBuilder::new()
            .default_src([Source::Self_])
            .script_src([Source::NonceMarker])
            .img_src([Source::Self_])
            .build()
            .unwrap();

        let header = CspPolicy::new(&config, &NonceRegistry::new()).header_string();
        assert_eq!(header, "default-src 'self'; img-src 'self'");
    }

    #[test]
    fn test_leading_omitted_directive_leaves_no_separator() {
        let config = CspConfigBuilder::new()
            .script_src([Source::NonceMarker])
            .img_src([Source::Self_])
            .build()
            .unwrap();

        let header = CspPolicy::new(&config, &NonceRegistry::new()).header_string();
        assert_eq!(header, "img-src 'self'");
    }

    #[test]
    fn test_directive_without_nonces_can_be_emitted() {
        let config = CspConfigBuilder::new()
            .script_src([Source::NonceMarker])
            .empty_directives(EmptyDirectives::Emit)
            .build()
            .unwrap();

        let header = CspPolicy::new(&config, &NonceRegistry::new()).header_string();
        assert_eq!(header, "script-src");
    }

    #[test]
    fn test_valueless_directive_and_report_uri() {
        let config = CspConfigBuilder::new()
            .default_src([Source::Self_])
            .upgrade_insecure_requests()
            .report_uri("/csp-report")
            .build()
            .unwrap();

        let header = CspPolicy::new(&config, &NonceRegistry::new()).header_string();
        assert_eq!(
            header,
            "default-src 'self'; upgrade-insecure-requests; report-uri /csp-report"
        );
    }

    #[test]
    fn test_nonces_for_unconfigured_directive_are_ignored() {
        let config = CspConfigBuilder::new()
            .style_src([Source::Self_])
            .build()
            .unwrap();

        let header = CspPolicy::new(&config, &registry()).header_string();
        assert_eq!(header, "style-src 'self'");
    }

    #[test]
    fn test_header_value_matches_string() {
        let config = CspConfigBuilder::new()
            .script_src([Source::Self_, Source::NonceMarker])
            .build()
            .unwrap();
        let registry = registry();

        let value = build_header_value(&config, &registry).unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            CspPolicy::new(&config, &registry).header_string()
        );
    }

    #[test]
    fn test_header_name_follows_report_only() {
        let enforced = CspConfigBuilder::new().default_src([Source::Self_]).build_unchecked();
        let report_only = CspConfigBuilder::new()
            .report_only(true)
            .default_src([Source::Self_])
            .build_unchecked();
        let registry = NonceRegistry::new();

        assert_eq!(
            CspPolicy::new(&enforced, &registry).header_name().as_str(),
            "content-security-policy"
        );
        assert_eq!(
            CspPolicy::new(&report_only, &registry).header_name().as_str(),
            "content-security-policy-report-only"
        );
    }

    #[test]
    fn test_empty_config_yields_empty_header() {
        let config = CspConfig::default();
        assert_eq!(CspPolicy::new(&config, &NonceRegistry::new()).header_string(), "");
    }
}
