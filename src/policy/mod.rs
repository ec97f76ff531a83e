use crate::error::ConfigurationError;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const RATE_LIMIT_SUFFIX: &str = "RATE_LIMIT";
pub const WINDOW_SECONDS_SUFFIX: &str = "WINDOW_SECONDS";

const QUOTA_SETTING: &str = "quota";
const WINDOW_SETTING: &str = "window";

/// A named category of caller identifiers, each class has its own [Quota].
///
/// The name doubles as the counter key namespace, so identical identifiers in different classes
/// never share a counter.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LimitClass(Cow<'static, str>);

impl LimitClass {
    /// Callers identified by their source IP address.
    pub const BY_IP: LimitClass = LimitClass(Cow::Borrowed("ip"));
    /// Callers identified by a bearer token.
    pub const BY_TOKEN: LimitClass = LimitClass(Cow::Borrowed("token"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LimitClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The requests allowed per window for a [LimitClass].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Quota {
    /// The total requests to be allowed within the window.
    pub max_requests: u64,
    /// How long a counter lives after its most recent increment.
    pub window: Duration,
}

impl Quota {
    pub fn new(
        class: &LimitClass,
        max_requests: u64,
        window: Duration,
    ) -> Result<Self, ConfigurationError> {
        if max_requests == 0 {
            return Err(ConfigurationError::NotPositive {
                class: class.clone(),
                setting: QUOTA_SETTING,
            });
        }
        if window.is_zero() {
            return Err(ConfigurationError::NotPositive {
                class: class.clone(),
                setting: WINDOW_SETTING,
            });
        }
        Ok(Self {
            max_requests,
            window,
        })
    }
}

/// Maps each [LimitClass] to its [Quota].
///
/// The table is loaded once and handed to the
/// [RateDecisionEngine](crate::backend::RateDecisionEngine). A class whose settings were invalid at
/// load time keeps its [ConfigurationError], which is then reported on every decision for that
/// class.
#[derive(Debug, Clone, Default)]
pub struct QuotaTable {
    classes: HashMap<LimitClass, Result<Quota, ConfigurationError>>,
}

impl QuotaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the quota for a class.
    pub fn with_quota(mut self, class: LimitClass, max_requests: u64, window: Duration) -> Self {
        let quota = Quota::new(&class, max_requests, window);
        self.classes.insert(class, quota);
        self
    }

    /// Reads `<PREFIX>_RATE_LIMIT` and `<PREFIX>_WINDOW_SECONDS` for each `(class, prefix)` pair.
    ///
    /// # Arguments
    ///
    /// * `classes`: The classes to load, along with their setting name prefix.
    /// * `lookup`: Returns the raw value of a setting, or [None] if it is not set.
    pub fn from_lookup<'a, I, F>(classes: I, lookup: F) -> Self
    where
        I: IntoIterator<Item = (LimitClass, &'a str)>,
        F: Fn(&str) -> Option<String>,
    {
        let classes = classes
            .into_iter()
            .map(|(class, prefix)| {
                let quota = load_quota(&class, prefix, &lookup);
                (class, quota)
            })
            .collect();
        Self { classes }
    }

    /// Loads the built-in classes from the process environment:
    ///
    /// - `IP_RATE_LIMIT` / `IP_WINDOW_SECONDS` for [LimitClass::BY_IP]
    /// - `TOKEN_RATE_LIMIT` / `TOKEN_WINDOW_SECONDS` for [LimitClass::BY_TOKEN]
    pub fn from_env() -> Self {
        Self::from_lookup(
            [(LimitClass::BY_IP, "IP"), (LimitClass::BY_TOKEN, "TOKEN")],
            |name| std::env::var(name).ok(),
        )
    }

    pub fn resolve(&self, class: &LimitClass) -> Result<Quota, ConfigurationError> {
        match self.classes.get(class) {
            Some(quota) => quota.clone(),
            None => Err(ConfigurationError::UnknownClass(class.clone())),
        }
    }
}

fn load_quota<F>(class: &LimitClass, prefix: &str, lookup: &F) -> Result<Quota, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    let max_requests = load_number(class, QUOTA_SETTING, prefix, RATE_LIMIT_SUFFIX, lookup)?;
    let window = load_number(class, WINDOW_SETTING, prefix, WINDOW_SECONDS_SUFFIX, lookup)?;
    Quota::new(class, max_requests, Duration::from_secs(window))
}

fn load_number<F>(
    class: &LimitClass,
    setting: &'static str,
    prefix: &str,
    suffix: &str,
    lookup: &F,
) -> Result<u64, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(&format!("{prefix}_{suffix}")).ok_or_else(|| ConfigurationError::Missing {
        class: class.clone(),
        setting,
    })?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigurationError::NotNumeric {
            class: class.clone(),
            setting,
            value: raw.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(
        pairs: &'static [(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    fn builtin() -> [(LimitClass, &'static str); 2] {
        [(LimitClass::BY_IP, "IP"), (LimitClass::BY_TOKEN, "TOKEN")]
    }

    #[test]
    fn test_load_valid() {
        let table = QuotaTable::from_lookup(
            builtin(),
            lookup_from(&[
                ("IP_RATE_LIMIT", "5"),
                ("IP_WINDOW_SECONDS", "1"),
                ("TOKEN_RATE_LIMIT", " 10 "),
                ("TOKEN_WINDOW_SECONDS", "60"),
            ]),
        );
        assert_eq!(
            table.resolve(&LimitClass::BY_IP).unwrap(),
            Quota {
                max_requests: 5,
                window: Duration::from_secs(1)
            }
        );
        assert_eq!(
            table.resolve(&LimitClass::BY_TOKEN).unwrap(),
            Quota {
                max_requests: 10,
                window: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_classes_validate_independently() {
        // A broken token class must not affect the ip class
        let table = QuotaTable::from_lookup(
            builtin(),
            lookup_from(&[
                ("IP_RATE_LIMIT", "5"),
                ("IP_WINDOW_SECONDS", "1"),
                ("TOKEN_RATE_LIMIT", "invalid"),
                ("TOKEN_WINDOW_SECONDS", "1"),
            ]),
        );
        assert!(table.resolve(&LimitClass::BY_IP).is_ok());
        assert_eq!(
            table.resolve(&LimitClass::BY_TOKEN).unwrap_err(),
            ConfigurationError::NotNumeric {
                class: LimitClass::BY_TOKEN,
                setting: "quota",
                value: "invalid".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_window() {
        let table = QuotaTable::from_lookup(
            builtin(),
            lookup_from(&[("IP_RATE_LIMIT", "5"), ("IP_WINDOW_SECONDS", "invalid")]),
        );
        assert!(matches!(
            table.resolve(&LimitClass::BY_IP),
            Err(ConfigurationError::NotNumeric {
                setting: "window",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_and_missing() {
        let table = QuotaTable::from_lookup(
            builtin(),
            lookup_from(&[
                ("IP_RATE_LIMIT", "0"),
                ("IP_WINDOW_SECONDS", "1"),
                ("TOKEN_RATE_LIMIT", "10"),
            ]),
        );
        assert_eq!(
            table.resolve(&LimitClass::BY_IP).unwrap_err(),
            ConfigurationError::NotPositive {
                class: LimitClass::BY_IP,
                setting: "quota",
            }
        );
        assert_eq!(
            table.resolve(&LimitClass::BY_TOKEN).unwrap_err(),
            ConfigurationError::Missing {
                class: LimitClass::BY_TOKEN,
                setting: "window",
            }
        );
    }

    #[test]
    fn test_negative_is_not_numeric() {
        let table = QuotaTable::from_lookup(
            builtin(),
            lookup_from(&[("IP_RATE_LIMIT", "-1"), ("IP_WINDOW_SECONDS", "1")]),
        );
        assert!(matches!(
            table.resolve(&LimitClass::BY_IP),
            Err(ConfigurationError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_unknown_class() {
        let table = QuotaTable::new().with_quota(LimitClass::BY_IP, 5, Duration::from_secs(1));
        let class = LimitClass::new("by-tenant");
        assert_eq!(
            table.resolve(&class).unwrap_err(),
            ConfigurationError::UnknownClass(class)
        );
    }

    #[test]
    fn test_with_quota_zero_window() {
        let table = QuotaTable::new().with_quota(LimitClass::BY_TOKEN, 5, Duration::ZERO);
        assert!(matches!(
            table.resolve(&LimitClass::BY_TOKEN),
            Err(ConfigurationError::NotPositive {
                setting: "window",
                ..
            })
        ));
    }
}
