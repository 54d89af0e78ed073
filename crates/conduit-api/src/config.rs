//! Environment-driven server configuration.

use std::str::FromStr;
use std::time::Duration;

use conduit_dispatch::DispatcherConfig;
use conduit_lock::LockBackendKind;

use crate::error::AppError;

/// Settings read from the process environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// PostgreSQL connection string of the default database.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Application id sent to the tenant directory. Tenant routing is off
    /// when unset.
    pub app_id: Option<String>,
    /// Version tag stamped on outbox rows. The outbox is off when unset.
    pub outbox_version: Option<String>,
    /// Backend used for the tenant registration lock.
    pub lock_backend: LockBackendKind,
    /// How long to wait for the registration lock; `None` waits forever.
    pub lock_wait: Option<Duration>,
    /// TTL of the registration lock.
    pub tenant_lock_ttl: Duration,
    /// Dispatcher tunables.
    pub dispatcher: DispatcherConfig,
}

impl ApiConfig {
    /// Default registration lock TTL in seconds.
    pub const DEFAULT_TENANT_LOCK_TTL_SECS: u64 = 30;

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`ApiConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".into())
        })?;
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", var("PORT"), 3000)?;
        let lock_backend = match var("LOCK_BACKEND") {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("LOCK_BACKEND: {e}")))?,
            None => LockBackendKind::default(),
        };
        let lock_wait = var("LOCK_WAIT_MS")
            .map(|raw| parse::<u64>("LOCK_WAIT_MS", &raw))
            .transpose()?
            .map(Duration::from_millis);
        let ttl_secs = parse_or(
            "TENANT_LOCK_TTL_SECS",
            var("TENANT_LOCK_TTL_SECS"),
            Self::DEFAULT_TENANT_LOCK_TTL_SECS,
        )?;
        let max_drain_passes = parse_or(
            "MAX_DRAIN_PASSES",
            var("MAX_DRAIN_PASSES"),
            DispatcherConfig::DEFAULT_MAX_DRAIN_PASSES,
        )?;
        if max_drain_passes == 0 {
            return Err(AppError::Config("MAX_DRAIN_PASSES must be at least 1".into()));
        }

        Ok(Self {
            database_url,
            host,
            port,
            app_id: var("APP_ID"),
            outbox_version: var("OUTBOX_VERSION"),
            lock_backend,
            lock_wait,
            tenant_lock_ttl: Duration::from_secs(ttl_secs),
            dispatcher: DispatcherConfig { max_drain_passes },
        })
    }

    /// The `HOST:PORT` pair to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{name} must be a valid number: {e}")))
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map_or(Ok(default), |raw| parse(name, &raw))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ApiConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/conduit")]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.app_id, None);
        assert_eq!(config.outbox_version, None);
        assert_eq!(config.lock_backend, LockBackendKind::Script);
        assert_eq!(config.lock_wait, None);
        assert_eq!(config.tenant_lock_ttl, Duration::from_secs(30));
        assert_eq!(config.dispatcher, DispatcherConfig::default());
    }

    #[test]
    fn test_every_variable_is_read() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/conduit"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("APP_ID", "storefront"),
            ("OUTBOX_VERSION", "v2"),
            ("LOCK_BACKEND", "native"),
            ("LOCK_WAIT_MS", "250"),
            ("TENANT_LOCK_TTL_SECS", "5"),
            ("MAX_DRAIN_PASSES", "8"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.app_id.as_deref(), Some("storefront"));
        assert_eq!(config.outbox_version.as_deref(), Some("v2"));
        assert_eq!(config.lock_backend, LockBackendKind::Native);
        assert_eq!(config.lock_wait, Some(Duration::from_millis(250)));
        assert_eq!(config.tenant_lock_ttl, Duration::from_secs(5));
        assert_eq!(config.dispatcher.max_drain_passes, 8);
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = config_from(&[("PORT", "3000")]);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let base = ("DATABASE_URL", "postgres://localhost/conduit");

        assert!(matches!(config_from(&[base, ("PORT", "http")]), Err(AppError::Config(_))));
        assert!(matches!(
            config_from(&[base, ("LOCK_BACKEND", "zookeeper")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[base, ("MAX_DRAIN_PASSES", "0")]),
            Err(AppError::Config(_))
        ));
    }
}
