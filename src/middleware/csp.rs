use crate::core::config::{CspConfig, CspSettings, RequestClass};
use crate::error::CspError;
use crate::render::finalizer::maybe_attach_header;
use crate::security::registry::RequestNonces;
use actix_web::{
    body::{to_bytes, BoxBody, EitherBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE},
    mime::{self, Mime},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::{rc::Rc, time::Instant};
use uuid::Uuid;

/// Issues per-request nonce registries, resolves placeholders in HTML
/// responses and attaches the policy header.
#[derive(Clone)]
pub struct CspNonceMiddleware {
    settings: CspSettings,
}

impl CspNonceMiddleware {
    #[inline]
    pub fn new(settings: CspSettings) -> Self {
        Self { settings }
    }

    #[inline]
    pub fn settings(&self) -> &CspSettings {
        &self.settings
    }
}

impl<S, B> Transform<S, ServiceRequest> for CspNonceMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CspNonceMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CspNonceMiddlewareService {
            service: Rc::new(service),
            settings: self.settings.clone(),
        }))
    }
}

pub struct CspNonceMiddlewareService<S> {
    service: Rc<S>,
    settings: CspSettings,
}

impl<S, B> Service<ServiceRequest> for CspNonceMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let settings = self.settings.clone();

        Box::pin(async move {
            let request_id = Uuid::new_v4();
            let config = settings.config();
            let class = config.classify(req.path());
            let nonces = settings.request_nonces();

            req.extensions_mut().insert(nonces.clone());
            settings.stats().increment_request_count();

            let res = service.call(req).await?;

            if !config.applies_to(class) {
                log::trace!("[{}] policy not active for {:?} request", request_id, class);
                return Ok(res.map_into_left_body());
            }

            let mut res = if is_html(res.headers()) {
                rewrite_body(res, &nonces, &settings, request_id).await?
            } else {
                res.map_into_left_body()
            };

            finalize(&config, class, &nonces, res.headers_mut(), &settings, request_id)?;
            Ok(res)
        })
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Mime>().ok())
        .map_or(false, |content_type| {
            content_type.type_() == mime::TEXT && content_type.subtype() == mime::HTML
        })
}

async fn rewrite_body<B>(
    res: ServiceResponse<B>,
    nonces: &RequestNonces,
    settings: &CspSettings,
    request_id: Uuid,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody + 'static,
{
    let (req, res) = res.into_parts();
    let (mut head, body) = res.into_parts();

    let bytes = match to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let err: Box<dyn std::error::Error> = err.into();
            log::error!("[{}] failed to buffer response body: {}", request_id, err);
            return Err(CspError::BodyError(err.to_string()).into());
        }
    };

    let body = match std::str::from_utf8(&bytes) {
        Ok(output) => {
            let started = Instant::now();
            let outcome = nonces.rewrite(output)?;
            let elapsed = usize::try_from(started.elapsed().as_nanos()).unwrap_or(usize::MAX);
            settings.stats().add_rewrite_time(elapsed);
            log::debug!(
                "[{}] placeholders resolved: {}, minted: {}, rejected: {}",
                request_id,
                outcome.resolved,
                outcome.minted,
                outcome.rejected
            );
            outcome.output.into_bytes().into()
        }
        Err(_) => {
            log::warn!("[{}] HTML response is not valid UTF-8, skipping nonce rewrite", request_id);
            bytes
        }
    };

    head.headers_mut().remove(CONTENT_LENGTH);
    let res = head.set_body(BoxBody::new(body));
    Ok(ServiceResponse::new(req, res).map_into_right_body())
}

fn finalize(
    config: &CspConfig,
    class: RequestClass,
    nonces: &RequestNonces,
    headers: &mut HeaderMap,
    settings: &CspSettings,
    request_id: Uuid,
) -> Result<(), CspError> {
    let registry = nonces.registry();
    match maybe_attach_header(config, class, &registry, headers) {
        Ok(attached) => {
            if attached {
                settings.stats().increment_header_count();
            }
            Ok(())
        }
        Err(err) => {
            log::error!("[{}] failed to build CSP header: {}", request_id, err);
            Err(err)
        }
    }
}

#[inline]
pub fn csp_nonce_middleware(settings: CspSettings) -> CspNonceMiddleware {
    CspNonceMiddleware::new(settings)
}
