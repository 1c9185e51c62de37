//! Environment-driven configuration for the three service binaries.
//!
//! Every `Config::from_env` constructor follows the same shape: parse at process
//! startup, fail fast on a missing required variable, fall back to a documented
//! default for everything optional. Nothing in this module is read again once the
//! service loop starts.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use dfm_redis::RedisConfig;
use dfm_registry::SiteConfig;

/// A missing or malformed environment variable at startup.
#[derive(Debug)]
pub struct ConfigError(String);

impl ConfigError {
    fn missing(var: &str) -> Self {
        ConfigError(format!("missing required environment variable {var}"))
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_var_or(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

/// How to reach the Redis substrate, shared by all three services.
#[derive(Clone, Debug)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub password: Option<String>,
    pub use_fake: bool,
}

impl RedisSettings {
    pub fn from_env() -> Result<Self> {
        let use_fake = env_var_or("USE_FAKE_REDIS", "false") == "true";
        let port = env_var("REDIS_PORT")
            .map(|v| v.parse().map_err(|_| ConfigError("REDIS_PORT must be a u16".to_string())))
            .transpose()?
            .unwrap_or(6379);
        let db = env_var("REDIS_DB")
            .map(|v| v.parse().map_err(|_| ConfigError("REDIS_DB must be a u8".to_string())))
            .transpose()?
            .unwrap_or(0);

        Ok(RedisSettings {
            host: env_var_or("REDIS_HOST", "localhost"),
            port,
            db,
            password: env_var("REDIS_PASSWORD"),
            use_fake,
        })
    }

    /// Build the `dfm-redis` connection config this crate's services share.
    #[must_use]
    pub fn to_redis_config(&self) -> RedisConfig {
        if self.use_fake {
            return RedisConfig::fake();
        }
        let auth = match &self.password {
            Some(pw) => format!(":{pw}@"),
            None => String::new(),
        };
        RedisConfig::new(format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db))
    }
}

/// Which header (if any) `auth::require_auth_middleware` checks before letting a
/// request through.
#[derive(Clone, Debug)]
pub enum AuthMethod {
    /// `AUTH_METHOD=none`: every request is treated as authenticated.
    Disabled,
    /// Any other value: the named header must be present and non-empty.
    Header { header_name: String },
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub method: AuthMethod,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let method = match env_var_or("AUTH_METHOD", "none").as_str() {
            "none" => AuthMethod::Disabled,
            _ => AuthMethod::Header {
                header_name: env_var_or("AUTH_HEADER_NAME", "X-DFM-Auth"),
            },
        };
        AuthConfig { method }
    }
}

/// `dfm-process` binary configuration.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    pub site_name: String,
    pub bind_addr: SocketAddr,
    pub redis: RedisSettings,
    pub auth: AuthConfig,
}

impl ProcessConfig {
    pub fn from_env() -> Result<Self> {
        Ok(ProcessConfig {
            site_name: env_var("SITE_NAME").ok_or_else(|| ConfigError::missing("SITE_NAME"))?,
            bind_addr: env_var_or("BIND_ADDR", "0.0.0.0:8080")
                .parse()
                .map_err(|_| ConfigError("BIND_ADDR must be a socket address".to_string()))?,
            redis: RedisSettings::from_env()?,
            auth: AuthConfig::from_env(),
        })
    }
}

/// `dfm-scheduler` binary configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub redis: RedisSettings,
    /// How often the promote loop polls the sorted set for due jobs.
    pub promote_tick: Duration,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let tick_ms: u64 = env_var("SCHEDULER_TICK_MS")
            .map(|v| v.parse().map_err(|_| ConfigError("SCHEDULER_TICK_MS must be an integer".to_string())))
            .transpose()?
            .unwrap_or(500);

        Ok(SchedulerConfig {
            redis: RedisSettings::from_env()?,
            promote_tick: Duration::from_millis(tick_ms),
        })
    }
}

/// `dfm-execute` binary configuration.
#[derive(Clone, Debug)]
pub struct ExecuteConfig {
    pub site_name: String,
    pub consumer_name: String,
    pub redis: RedisSettings,
    pub site: SiteConfig,
    /// Root of the cache filesystem namespace; `None` disables caching entirely.
    pub cache_dir: Option<PathBuf>,
    pub heartbeat_interval: Duration,
}

impl ExecuteConfig {
    pub fn from_env() -> Result<Self> {
        let site_config_path = env_var("SITE_CONFIG").ok_or_else(|| ConfigError::missing("SITE_CONFIG"))?;
        let raw = std::fs::read_to_string(&site_config_path)
            .map_err(|e| ConfigError(format!("reading SITE_CONFIG at {site_config_path}: {e}")))?;
        let site = SiteConfig::from_toml_str(&raw).map_err(|e| ConfigError(format!("parsing SITE_CONFIG: {e}")))?;

        // SITE_SECRETS is optional: a site with no secret-bearing providers has no
        // need for it. When present it is merged by the provider factories that
        // need it (out of scope here; this crate only loads the path for them).
        if let Some(secrets_path) = env_var("SITE_SECRETS") {
            if !PathBuf::from(&secrets_path).exists() {
                return Err(ConfigError(format!("SITE_SECRETS path does not exist: {secrets_path}")));
            }
        }

        let heartbeat_secs = site.heartbeat_interval_secs;

        Ok(ExecuteConfig {
            site_name: env_var_or("SITE_NAME", &site.site),
            consumer_name: env_var_or("EXECUTE_CONSUMER_NAME", &format!("execute-{}", uuid::Uuid::new_v4())),
            redis: RedisSettings::from_env()?,
            site,
            cache_dir: env_var("CACHE_DIR").map(PathBuf::from),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_settings_default_to_local_unauthenticated() {
        let settings = RedisSettings {
            host: "localhost".into(),
            port: 6379,
            db: 0,
            password: None,
            use_fake: false,
        };
        match settings.to_redis_config() {
            cfg if cfg.use_fake => panic!("expected a real config"),
            cfg => assert_eq!(cfg.url, "redis://localhost:6379/0"),
        }
    }

    #[test]
    fn fake_flag_short_circuits_url_construction() {
        let settings = RedisSettings {
            host: "unused".into(),
            port: 1,
            db: 0,
            password: None,
            use_fake: true,
        };
        assert!(settings.to_redis_config().use_fake);
    }

    #[test]
    fn auth_method_none_disables_the_header_check() {
        std::env::set_var("AUTH_METHOD", "none");
        let config = AuthConfig::from_env();
        assert!(matches!(config.method, AuthMethod::Disabled));
        std::env::remove_var("AUTH_METHOD");
    }

    #[test]
    fn any_other_auth_method_enables_a_header_check() {
        std::env::set_var("AUTH_METHOD", "shared-secret");
        let config = AuthConfig::from_env();
        assert!(matches!(config.method, AuthMethod::Header { .. }));
        std::env::remove_var("AUTH_METHOD");
    }
}
