use actix_web_csp_nonce::{
    CspConfigBuilder, CspPolicy, CspSettings, RequestClass, Source,
};

fn main() -> Result<(), actix_web_csp_nonce::CspError> {
    println!("Actix Web CSP Nonce Example");

    let config = CspConfigBuilder::new()
        .enabled(true)
        .default_src([Source::Self_])
        .script_src([Source::Self_, Source::NonceMarker])
        .style_src([Source::Self_, Source::NonceMarker])
        .build()?;
    let settings = CspSettings::new(config)?;

    // First request renders the page and stores it in a cache.
    let first = settings.request_nonces();
    let cached_page = format!(
        "<style {}></style><script {}></script>",
        first.nonce_attr("style-src")?,
        first.nonce_attr("script-src")?
    );

    // A later request replays the cached markup without rendering it.
    let replay = settings.request_nonces();
    let outcome = replay.rewrite(&cached_page)?;
    let config = settings.config();
    let registry = replay.registry();
    let policy = CspPolicy::new(&config, &registry);

    println!("Public request gets the policy: {}", config.applies_to(RequestClass::Public));
    println!("Output: {}", outcome.output);
    println!("{}: {}", policy.header_name(), policy.header_string());

    Ok(())
}
