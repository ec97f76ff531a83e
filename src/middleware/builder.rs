use crate::backend::{CounterStore, RateDecisionEngine};
use crate::middleware::identity::{Identity, RequestClassifier};
use crate::middleware::{DeniedResponse, RateLimiter};
use actix_web::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use actix_web::HttpResponse;
use std::rc::Rc;
use std::time::Duration;

pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 10;

pub const DENIED_BODY: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

pub struct RateLimiterBuilder<S> {
    engine: RateDecisionEngine<S>,
    classifier: RequestClassifier,
    denied_response: Rc<DeniedResponse>,
}

impl<S: CounterStore + 'static> RateLimiterBuilder<S> {
    pub(super) fn new(engine: RateDecisionEngine<S>) -> Self {
        Self {
            engine,
            classifier: RequestClassifier::default(),
            denied_response: default_denied_response(Some(Duration::from_secs(
                DEFAULT_RETRY_AFTER_SECONDS,
            ))),
        }
    }

    /// The header carrying the caller's bearer token.
    ///
    /// Defaults to `API_KEY`.
    pub fn token_header(mut self, name: HeaderName) -> Self {
        self.classifier = self.classifier.token_header(name);
        self
    }

    /// The header set by a trusted proxy to the client's address.
    ///
    /// Defaults to `X-Real-IP`.
    pub fn real_ip_header(mut self, name: HeaderName) -> Self {
        self.classifier = self.classifier.real_ip_header(name);
        self
    }

    /// The comma separated list of addresses set by trusted proxies, the first entry is used.
    ///
    /// Defaults to `X-Forwarded-For`.
    pub fn forwarded_for_header(mut self, name: HeaderName) -> Self {
        self.classifier = self.classifier.forwarded_for_header(name);
        self
    }

    /// The `retry-after` hint sent with the default denied response, rounded up to whole seconds.
    ///
    /// Defaults to 10 seconds, [None] omits the header.
    pub fn retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.denied_response = default_denied_response(retry_after);
        self
    }

    /// In the event that the request is denied, configure the [HttpResponse] returned.
    ///
    /// Replaces the default status 429 response (and any [RateLimiterBuilder::retry_after] hint).
    pub fn request_denied_response<R>(mut self, denied_response: R) -> Self
    where
        R: Fn(&Identity) -> HttpResponse + 'static,
    {
        self.denied_response = Rc::new(denied_response);
        self
    }

    pub fn build(self) -> RateLimiter<S> {
        RateLimiter {
            engine: self.engine,
            classifier: Rc::new(self.classifier),
            denied_response: self.denied_response,
        }
    }
}

fn default_denied_response(retry_after: Option<Duration>) -> Rc<DeniedResponse> {
    let seconds = retry_after.map(|d| {
        let millis = d.as_millis() as f64;
        (millis / 1000f64).ceil() as u64
    });
    Rc::new(move |_identity| {
        let mut response = HttpResponse::TooManyRequests();
        if let Some(seconds) = seconds {
            response.insert_header((RETRY_AFTER, HeaderValue::from(seconds)));
        }
        response.body(DENIED_BODY)
    })
}
