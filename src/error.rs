use crate::policy::LimitClass;
use actix_web::{HttpResponse, ResponseError};
use std::fmt::{Debug, Display};
use thiserror::Error;

/// The quota or window of a [LimitClass] could not be resolved to a positive value.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("No {setting} configured for limit class `{class}`")]
    Missing {
        class: LimitClass,
        setting: &'static str,
    },
    #[error("The {setting} for limit class `{class}` is not a number: {value:?}")]
    NotNumeric {
        class: LimitClass,
        setting: &'static str,
        value: String,
    },
    #[error("The {setting} for limit class `{class}` must be greater than zero")]
    NotPositive {
        class: LimitClass,
        setting: &'static str,
    },
    #[error("Unknown limit class `{0}`")]
    UnknownClass(LimitClass),
}

impl ResponseError for ConfigurationError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}

/// Failure of [RateDecisionEngine::decide()](crate::backend::RateDecisionEngine::decide).
///
/// Being denied is not an error, see [Decision](crate::backend::Decision).
#[derive(Debug, Error)]
pub enum DecisionError<E> {
    #[error("Invalid rate limit configuration: {0}")]
    Configuration(
        #[source]
        #[from]
        ConfigurationError,
    ),
    #[error("Counter store failed: {0}")]
    Store(#[source] E),
}

impl<E> DecisionError<E> {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl<E> ResponseError for DecisionError<E>
where
    E: std::error::Error + Debug + Display + 'static,
{
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}
