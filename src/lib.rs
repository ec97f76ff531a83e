#![cfg_attr(docsrs, feature(doc_cfg))]
//! Request admission for actix-web.
//!
//! Each request is counted against a quota, either by its bearer token or, failing that, by the
//! client's IP address. A request over quota is rejected with `429 Too Many Requests`.
//!
//! ```no_run
//! # async fn example() {
//! use actix_web::{App, HttpServer};
//! use quota_gate::backend::memory::InMemoryStore;
//! use quota_gate::{QuotaTable, RateLimiter};
//!
//! // Created once, so that every worker shares the same counters
//! let store = InMemoryStore::builder().build();
//! let quotas = QuotaTable::from_env();
//! HttpServer::new(move || {
//!     App::new().wrap(RateLimiter::builder(store.clone(), quotas.clone()).build())
//! });
//! # }
//! ```

pub mod backend;
pub mod error;
mod middleware;
pub mod policy;

pub use middleware::builder::{RateLimiterBuilder, DENIED_BODY};
pub use middleware::identity::{Identity, RequestClassifier};
pub use middleware::{RateLimiter, INTERNAL_ERROR_BODY};
pub use policy::{LimitClass, Quota, QuotaTable};
