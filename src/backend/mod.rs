#[cfg(feature = "dashmap")]
#[cfg_attr(docsrs, doc(cfg(feature = "dashmap")))]
pub mod memory;

#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;

use crate::error::DecisionError;
use crate::policy::{LimitClass, QuotaTable};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Self::Allowed
        } else {
            Self::Denied
        }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }
}

/// A store of named counters that expire after a period of inactivity.
///
/// A CounterStore is required to implement [Clone], usually this means wrapping your data store
/// within an [Arc], although many connection pools already do so internally; there is no need to
/// wrap it twice.
pub trait CounterStore: Clone {
    type Error;

    /// Increment the counter named `key`, and (re)set it to expire `expiry` from now.
    ///
    /// Returns the count after the increment; a counter that does not exist, or has expired,
    /// starts again from zero.
    ///
    /// The increment and the expiry reset must happen as one atomic unit, as observed by every
    /// caller sharing the same backing store, otherwise concurrent requests can slip past the
    /// quota.
    fn increment(
        &self,
        key: &str,
        expiry: Duration,
    ) -> impl Future<Output = Result<u64, Self::Error>>;
}

/// Fixed window rate limiting on top of a [CounterStore].
///
/// Each window is rolling: the expiry is re-armed on every request, so a key only resets once it
/// has been idle for a whole window.
#[derive(Debug, Clone)]
pub struct RateDecisionEngine<S> {
    store: S,
    quotas: Arc<QuotaTable>,
}

impl<S: CounterStore> RateDecisionEngine<S> {
    pub fn new(store: S, quotas: QuotaTable) -> Self {
        Self {
            store,
            quotas: Arc::new(quotas),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn quotas(&self) -> &QuotaTable {
        &self.quotas
    }

    /// Counts a request from `identifier` against the quota of `class`.
    ///
    /// The store is not touched if the class is misconfigured, and a store failure is returned
    /// straight away without retrying.
    pub async fn decide(
        &self,
        identifier: &str,
        class: &LimitClass,
    ) -> Result<Decision, DecisionError<S::Error>> {
        let quota = self.quotas.resolve(class)?;
        let key = counter_key(class, identifier);
        let count = self
            .store
            .increment(&key, quota.window)
            .await
            .map_err(DecisionError::Store)?;
        Ok(Decision::from_allowed(count <= quota.max_requests))
    }
}

pub fn counter_key(class: &LimitClass, identifier: &str) -> String {
    format!("{class}:{identifier}")
}
