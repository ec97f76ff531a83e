pub mod builder;
pub mod identity;

use crate::backend::{CounterStore, RateDecisionEngine};
use crate::error::DecisionError;
use crate::policy::QuotaTable;
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::HttpResponse;
use builder::RateLimiterBuilder;
use futures::future::{ok, LocalBoxFuture, Ready};
use identity::{Identity, RequestClassifier};
use std::fmt::Display;
use std::rc::Rc;

type DeniedResponse = dyn Fn(&Identity) -> HttpResponse;

pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Rate limit middleware.
pub struct RateLimiter<S> {
    engine: RateDecisionEngine<S>,
    classifier: Rc<RequestClassifier>,
    denied_response: Rc<DeniedResponse>,
}

impl<S: CounterStore> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            classifier: self.classifier.clone(),
            denied_response: self.denied_response.clone(),
        }
    }
}

impl<S: CounterStore + 'static> RateLimiter<S> {
    /// # Arguments
    ///
    /// * `store`: Where the request counters are kept.
    /// * `quotas`: The quota of each limit class.
    pub fn builder(store: S, quotas: QuotaTable) -> RateLimiterBuilder<S> {
        RateLimiterBuilder::new(RateDecisionEngine::new(store, quotas))
    }
}

impl<Svc, B, S> Transform<Svc, ServiceRequest> for RateLimiter<S>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    Svc::Future: 'static,
    B: 'static,
    S: CounterStore + 'static,
    S::Error: Display + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = RateLimiterMiddleware<Svc, S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: Svc) -> Self::Future {
        ok(RateLimiterMiddleware {
            service: Rc::new(service),
            engine: self.engine.clone(),
            classifier: self.classifier.clone(),
            denied_response: self.denied_response.clone(),
        })
    }
}

pub struct RateLimiterMiddleware<Svc, S> {
    service: Rc<Svc>,
    engine: RateDecisionEngine<S>,
    classifier: Rc<RequestClassifier>,
    denied_response: Rc<DeniedResponse>,
}

impl<Svc, B, S> Service<ServiceRequest> for RateLimiterMiddleware<Svc, S>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    Svc::Future: 'static,
    B: 'static,
    S: CounterStore + 'static,
    S::Error: Display + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let engine = self.engine.clone();
        let classifier = self.classifier.clone();
        let denied_response = self.denied_response.clone();

        Box::pin(async move {
            let identity = classifier.classify(&req);

            match engine.decide(&identity.identifier, &identity.class).await {
                Ok(decision) if decision.is_allowed() => {}
                Ok(_) => {
                    log::debug!(
                        "Rate limit exceeded for {}:{}",
                        identity.class,
                        identity.identifier
                    );
                    let response = (denied_response)(&identity);
                    return Ok(req.into_response(response).map_into_right_body());
                }
                // Both kinds look the same to the caller, only the log tells them apart
                Err(e) => {
                    match &e {
                        DecisionError::Configuration(e) => {
                            log::error!("Rate limiter is misconfigured: {e}")
                        }
                        DecisionError::Store(e) => log::error!("Rate limiter failed: {e}"),
                    }
                    let response = HttpResponse::InternalServerError().body(INTERNAL_ERROR_BODY);
                    return Ok(req.into_response(response).map_into_right_body());
                }
            }

            let service_response = service.call(req).await?;
            Ok(service_response.map_into_left_body())
        })
    }
}
