use crate::error::ClientError;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default User-Agent string for requests sent by the default transport
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-client/", env!("CARGO_PKG_VERSION"));

/// Prefix of environment variables read by [`ClientConfig::load`]
pub const ENV_PREFIX: &str = "MODKIT_CLIENT_";

/// Client configuration.
///
/// Durations are humantime strings (`"30s"`, `"1m 30s"`).
///
/// ```yaml
/// base_url: https://users.internal/api/v1
/// request_timeout: 10s
/// max_concurrent_requests: 64
/// default_headers:
///   x-tenant: acme
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the remote service; its path is prefixed to every
    /// operation path
    pub base_url: Option<String>,

    /// Per-request timeout (default: 30 seconds)
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,

    /// User-Agent header value (default: "modkit-client/<version>")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// Accept plain `http://` base URLs. Use only for testing with local
    /// mock servers.
    pub allow_insecure_http: bool,

    /// Timeout for idle pooled connections (default: 90 seconds)
    #[serde(with = "humantime_duration::option")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Concurrency limit; excess requests fail fast as overloaded
    /// (default: unlimited)
    pub max_concurrent_requests: Option<usize>,

    /// Buffer capacity for concurrent request handling (default: 1024)
    pub buffer_capacity: usize,

    /// Headers added to every request unless the request already has them
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            allow_insecure_http: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            max_concurrent_requests: None,
            buffer_capacity: 1024,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Extracts the configuration from `figment`.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] for missing or malformed values.
    pub fn from_figment(figment: &Figment) -> Result<Self, ClientError> {
        figment
            .extract()
            .map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Loads the YAML file at `path`, overridden by `MODKIT_CLIENT_*`
    /// environment variables.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] for malformed values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let figment = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX));
        Self::from_figment(&figment)
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, de};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use super::{Deserialize, Deserializer, Duration, de};

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| humantime::parse_duration(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.user_agent.starts_with("modkit-client/"));
        assert!(!config.allow_insecure_http);
        assert_eq!(config.buffer_capacity, 1024);
    }

    #[test]
    fn test_from_figment_with_humantime_values() {
        let figment = Figment::new().merge(Serialized::defaults(json!({
            "base_url": "https://api.example.com/v1",
            "request_timeout": "1m 30s",
            "pool_idle_timeout": "5s",
            "max_concurrent_requests": 8,
            "default_headers": { "x-tenant": "acme" }
        })));

        let config = ClientConfig::from_figment(&figment).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com/v1"));
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.pool_idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_concurrent_requests, Some(8));
        assert_eq!(config.default_headers["x-tenant"], "acme");
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_unknown_and_malformed_fields_rejected() {
        let unknown = Figment::new().merge(Serialized::defaults(json!({ "retries": 3 })));
        assert!(matches!(
            ClientConfig::from_figment(&unknown),
            Err(ClientError::Config(_))
        ));

        let malformed =
            Figment::new().merge(Serialized::defaults(json!({ "request_timeout": "soon" })));
        assert!(ClientConfig::from_figment(&malformed).is_err());
    }
}
