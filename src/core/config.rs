use crate::constants::{
    DEFAULT_ADMIN_PATH_PREFIX, HEADER_CSP, HEADER_CSP_REPORT_ONLY, UPGRADE_INSECURE_REQUESTS,
};
use crate::core::directives::{Directive, DirectiveSpec};
use crate::core::source::Source;
use crate::error::CspError;
use crate::monitoring::stats::CspStats;
use crate::security::nonce::NonceGenerator;
use crate::security::registry::{NonceRegistry, RequestNonces};
use crate::security::token::{HmacTokenSigner, TokenSigner};
use crate::utils::resolve_env;
use actix_web::http::header::HeaderName;
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, path::Path, sync::Arc};

/// What to do with a directive whose sources were all nonce markers and no
/// nonce was issued for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyDirectives {
    /// Leave the directive out of the header. Browsers then fall back to
    /// `default-src` for it, which may be looser than a bare directive.
    #[default]
    Omit,
    /// Emit the directive name with no sources.
    Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Public,
    Administrative,
}

/// Immutable policy configuration, shared by all requests that loaded the
/// same snapshot.
#[derive(Debug, Clone)]
pub struct CspConfig {
    enabled: bool,
    enabled_for_admin_requests: bool,
    report_only: bool,
    report_uri: Option<Cow<'static, str>>,
    admin_path_prefix: Option<Cow<'static, str>>,
    empty_directives: EmptyDirectives,
    directives: IndexMap<Cow<'static, str>, Directive>,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enabled_for_admin_requests: false,
            report_only: false,
            report_uri: None,
            admin_path_prefix: Some(Cow::Borrowed(DEFAULT_ADMIN_PATH_PREFIX)),
            empty_directives: EmptyDirectives::default(),
            directives: IndexMap::new(),
        }
    }
}

impl CspConfig {
    #[inline]
    pub fn builder() -> CspConfigBuilder {
        CspConfigBuilder::new()
    }

    pub fn from_json(json: &str) -> Result<Self, CspError> {
        let raw: RawCspConfig = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CspError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn is_enabled_for_admin_requests(&self) -> bool {
        self.enabled_for_admin_requests
    }

    #[inline]
    pub fn is_report_only(&self) -> bool {
        self.report_only
    }

    #[inline]
    pub fn report_uri(&self) -> Option<&str> {
        self.report_uri.as_deref()
    }

    #[inline]
    pub fn admin_path_prefix(&self) -> Option<&str> {
        self.admin_path_prefix.as_deref()
    }

    #[inline]
    pub fn empty_directives(&self) -> EmptyDirectives {
        self.empty_directives
    }

    #[inline]
    pub fn get_directive(&self, name: &str) -> Option<&Directive> {
        self.directives.get(name)
    }

    #[inline]
    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.directives.values()
    }

    #[inline]
    pub fn header_name(&self) -> HeaderName {
        if self.report_only {
            HeaderName::from_static(HEADER_CSP_REPORT_ONLY)
        } else {
            HeaderName::from_static(HEADER_CSP)
        }
    }

    /// Requests under the admin path prefix are administrative.
    pub fn classify(&self, path: &str) -> RequestClass {
        match self.admin_path_prefix.as_deref() {
            Some(prefix) if is_under_prefix(path, prefix) => RequestClass::Administrative,
            _ => RequestClass::Public,
        }
    }

    /// Whether the policy is active for requests of the given class.
    #[inline]
    pub fn applies_to(&self, class: RequestClass) -> bool {
        self.enabled
            && (class == RequestClass::Public || self.enabled_for_admin_requests)
    }

    pub fn validate(&self) -> Result<(), CspError> {
        for directive in self.directives.values() {
            directive.validate()?;
        }
        if let Some(uri) = &self.report_uri {
            if uri.is_empty() || uri.contains([';', ',']) || uri.chars().any(char::is_whitespace) {
                return Err(CspError::ConfigError(format!("invalid report URI: {}", uri)));
            }
        }
        Ok(())
    }
}

fn is_under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCspConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default, alias = "enabledForCp")]
    enabled_for_admin_requests: bool,
    #[serde(default)]
    report_only: bool,
    #[serde(default)]
    report_uri: Option<String>,
    #[serde(default = "default_admin_path_prefix")]
    admin_path_prefix: Option<String>,
    #[serde(default)]
    empty_directives: EmptyDirectives,
    #[serde(default)]
    directives: IndexMap<String, Vec<String>>,
}

fn default_admin_path_prefix() -> Option<String> {
    Some(DEFAULT_ADMIN_PATH_PREFIX.to_string())
}

impl TryFrom<RawCspConfig> for CspConfig {
    type Error = CspError;

    fn try_from(raw: RawCspConfig) -> Result<Self, Self::Error> {
        let mut builder = CspConfigBuilder::new()
            .enabled(raw.enabled)
            .enabled_for_admin_requests(raw.enabled_for_admin_requests)
            .report_only(raw.report_only)
            .admin_path_prefix(raw.admin_path_prefix)
            .empty_directives(raw.empty_directives);

        if let Some(uri) = raw.report_uri {
            builder = builder.report_uri(resolve_env(&uri).into_owned());
        }

        for (name, values) in raw.directives {
            let sources = values
                .iter()
                .map(|value| Source::parse(&resolve_env(value)))
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.directive(name, sources);
        }

        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct CspConfigBuilder {
    config: CspConfig,
}

impl CspConfigBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    #[inline]
    pub fn enabled_for_admin_requests(mut self, enabled: bool) -> Self {
        self.config.enabled_for_admin_requests = enabled;
        self
    }

    #[inline]
    pub fn report_only(mut self, enabled: bool) -> Self {
        self.config.report_only = enabled;
        self
    }

    #[inline]
    pub fn report_uri(mut self, uri: impl Into<Cow<'static, str>>) -> Self {
        self.config.report_uri = Some(uri.into());
        self
    }

    /// `None` treats every request as public.
    #[inline]
    pub fn admin_path_prefix<P: Into<Cow<'static, str>>>(mut self, prefix: Option<P>) -> Self {
        self.config.admin_path_prefix = prefix.map(Into::into);
        self
    }

    #[inline]
    pub fn empty_directives(mut self, mode: EmptyDirectives) -> Self {
        self.config.empty_directives = mode;
        self
    }

    /// Adds or replaces a directive, keeping its original position when
    /// replacing.
    pub fn directive(
        self,
        name: impl Into<Cow<'static, str>>,
        sources: impl IntoIterator<Item = Source>,
    ) -> Self {
        let mut directive = Directive::new(name);
        directive.add_sources(sources);
        self.with_directive(directive)
    }

    pub fn add_directive<D: DirectiveSpec>(self, directive_builder: D) -> Self {
        self.with_directive(directive_builder.build())
    }

    #[inline]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        let name = Cow::Owned(directive.name().to_owned());
        self.config.directives.insert(name, directive);
        self
    }

    pub fn default_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::DefaultSrc::new().add_sources(sources))
    }

    pub fn script_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::ScriptSrc::new().add_sources(sources))
    }

    pub fn style_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::StyleSrc::new().add_sources(sources))
    }

    pub fn img_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::ImgSrc::new().add_sources(sources))
    }

    pub fn connect_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::ConnectSrc::new().add_sources(sources))
    }

    pub fn font_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::FontSrc::new().add_sources(sources))
    }

    pub fn object_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::ObjectSrc::new().add_sources(sources))
    }

    pub fn frame_src(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::FrameSrc::new().add_sources(sources))
    }

    pub fn frame_ancestors(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::FrameAncestors::new().add_sources(sources))
    }

    pub fn base_uri(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::BaseUri::new().add_sources(sources))
    }

    pub fn form_action(self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.add_directive(crate::core::directives::FormAction::new().add_sources(sources))
    }

    pub fn upgrade_insecure_requests(self) -> Self {
        self.with_directive(Directive::new(UPGRADE_INSECURE_REQUESTS))
    }

    pub fn build(self) -> Result<CspConfig, CspError> {
        self.config.validate()?;
        Ok(self.config)
    }

    #[inline]
    pub fn build_unchecked(self) -> CspConfig {
        self.config
    }
}

/// Process-wide CSP state handed to the middleware: the current config
/// snapshot, the placeholder signer and counters.
///
/// Each request loads one snapshot at its start and keeps it until the
/// response is finalised, so updates never change a policy mid-request.
#[derive(Clone)]
pub struct CspSettings {
    config: Arc<ArcSwap<CspConfig>>,
    signer: Arc<dyn TokenSigner>,
    nonce_generator: NonceGenerator,
    stats: Arc<CspStats>,
}

impl CspSettings {
    /// Uses a random signing key. Placeholders cached by another process
    /// (or before a restart) will not verify; see [`CspSettings::with_secret`].
    pub fn new(config: CspConfig) -> Result<Self, CspError> {
        Ok(Self::with_signer(config, Arc::new(HmacTokenSigner::generate()?)))
    }

    pub fn with_secret(config: CspConfig, secret: &[u8]) -> Result<Self, CspError> {
        Ok(Self::with_signer(config, Arc::new(HmacTokenSigner::new(secret)?)))
    }

    pub fn with_signer(config: CspConfig, signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            signer,
            nonce_generator: NonceGenerator::default(),
            stats: Arc::new(CspStats::new()),
        }
    }

    #[inline]
    pub fn with_nonce_length(mut self, length: usize) -> Self {
        self.nonce_generator = NonceGenerator::new(length);
        self
    }

    #[inline]
    pub fn config(&self) -> Arc<CspConfig> {
        self.config.load_full()
    }

    /// Publishes a modified copy of the current config. In-flight requests
    /// keep the snapshot they started with.
    pub fn update<F>(&self, f: F) -> Result<(), CspError>
    where
        F: FnOnce(&mut CspConfig),
    {
        let mut next = CspConfig::clone(&self.config.load());
        f(&mut next);
        next.validate()?;
        self.config.store(Arc::new(next));
        self.stats.increment_config_update_count();
        Ok(())
    }

    pub fn replace(&self, config: CspConfig) -> Result<(), CspError> {
        config.validate()?;
        self.config.store(Arc::new(config));
        self.stats.increment_config_update_count();
        Ok(())
    }

    #[inline]
    pub fn signer(&self) -> &Arc<dyn TokenSigner> {
        &self.signer
    }

    #[inline]
    pub fn stats(&self) -> &Arc<CspStats> {
        &self.stats
    }

    /// Fresh per-request state with an empty registry.
    pub fn request_nonces(&self) -> RequestNonces {
        RequestNonces::new(
            NonceRegistry::with_source(self.nonce_generator),
            self.signer.clone(),
            self.stats.clone(),
        )
    }
}

impl std::fmt::Debug for CspSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CspSettings")
            .field("config", &**self.config.load())
            .field("nonce_generator", &self.nonce_generator)
            .finish_non_exhaustive()
    }
}
