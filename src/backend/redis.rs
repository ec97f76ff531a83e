use crate::backend::CounterStore;
use actix_web::{HttpResponse, ResponseError};
use redis::aio::ConnectionManager;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(
        #[source]
        #[from]
        redis::RedisError,
    ),
    #[error("Redis did not respond within {0:?}")]
    Timeout(Duration),
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}

/// A [CounterStore] that keeps counters in Redis, so they are shared by every process using the
/// same Redis instance.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: Option<String>,
    timeout: Option<Duration>,
}

impl RedisStore {
    /// Create a RedisStore Builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use quota_gate::backend::redis::RedisStore;
    /// # use redis::aio::ConnectionManager;
    /// # async fn example() {
    /// let client = redis::Client::open("redis://127.0.0.1:6379/").unwrap();
    /// let manager = ConnectionManager::new(client).await.unwrap();
    /// let store = RedisStore::builder(manager).build();
    /// # };
    /// ```
    pub fn builder(connection: ConnectionManager) -> Builder {
        Builder {
            connection,
            key_prefix: None,
            timeout: None,
        }
    }

    fn make_key<'t>(&self, key: &'t str) -> Cow<'t, str> {
        match &self.key_prefix {
            None => Cow::Borrowed(key),
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
        }
    }

    async fn query(&self, key: &str, expiry: Duration) -> Result<u64, Error> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("INCR")
            .arg(key)
            // Always re-arm the expiry, measured from this request
            .cmd("PEXPIRE")
            .arg(key)
            .arg(expiry_millis(expiry))
            .ignore();

        let mut con = self.connection.clone();
        let (count,): (u64,) = pipe.query_async(&mut con).await?;
        Ok(count)
    }
}

pub struct Builder {
    connection: ConnectionManager,
    key_prefix: Option<String>,
    timeout: Option<Duration>,
}

impl Builder {
    /// Apply an optional prefix to all counter keys given to this store.
    ///
    /// This may be useful when the Redis instance is being used for other purposes; the prefix is
    /// used as a 'namespace' to avoid collision with other caches or keys inside Redis.
    pub fn key_prefix(mut self, key_prefix: Option<&str>) -> Self {
        self.key_prefix = key_prefix.map(ToOwned::to_owned);
        self
    }

    /// Fail the increment with [Error::Timeout] if Redis has not answered in time.
    ///
    /// By default there is no timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> RedisStore {
        RedisStore {
            connection: self.connection,
            key_prefix: self.key_prefix,
            timeout: self.timeout,
        }
    }
}

impl CounterStore for RedisStore {
    type Error = Error;

    async fn increment(&self, key: &str, expiry: Duration) -> Result<u64, Self::Error> {
        let key = self.make_key(key);
        match self.timeout {
            None => self.query(&key, expiry).await,
            Some(timeout) => actix_web::rt::time::timeout(timeout, self.query(&key, expiry))
                .await
                .map_err(|_| Error::Timeout(timeout))?,
        }
    }
}

// PEXPIRE rejects 0, and a sub-millisecond window would otherwise round down to it
fn expiry_millis(expiry: Duration) -> u64 {
    u64::try_from(expiry.as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}
