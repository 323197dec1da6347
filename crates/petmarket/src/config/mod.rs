use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the marketplace service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub policy: PolicyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            policy: PolicyConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Limits applied to operator-supplied text and verification resubmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Inclusive bounds, in characters, for block/unblock, role change and
    /// verification rejection justifications.
    pub reason_min_chars: usize,
    pub reason_max_chars: usize,
    /// Cap for adopter messages and adoption rejection reasons.
    pub message_max_chars: usize,
    /// Minimum wait after a rejected verification before resubmission.
    pub reapply_cooldown: Option<Duration>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reason_min_chars: 10,
            reason_max_chars: 500,
            message_max_chars: 500,
            reapply_cooldown: None,
        }
    }
}

impl PolicyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reason_min_chars = read_usize("APP_REASON_MIN_CHARS", defaults.reason_min_chars)?;
        let reason_max_chars = read_usize("APP_REASON_MAX_CHARS", defaults.reason_max_chars)?;
        let message_max_chars = read_usize("APP_MESSAGE_MAX_CHARS", defaults.message_max_chars)?;

        if reason_min_chars == 0 || reason_min_chars > reason_max_chars {
            return Err(ConfigError::InvalidPolicy {
                variable: "APP_REASON_MIN_CHARS",
                reason: format!(
                    "must be between 1 and APP_REASON_MAX_CHARS ({reason_max_chars})"
                ),
            });
        }

        let reapply_cooldown = match env::var("APP_REAPPLY_COOLDOWN_DAYS") {
            Ok(raw) if !raw.trim().is_empty() => {
                let days = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidPolicy {
                        variable: "APP_REAPPLY_COOLDOWN_DAYS",
                        reason: format!("'{raw}' is not a whole number of days"),
                    })?;
                Some(Duration::days(i64::from(days)))
            }
            _ => None,
        };

        Ok(Self {
            reason_min_chars,
            reason_max_chars,
            message_max_chars,
            reapply_cooldown,
        })
    }
}

fn read_usize(variable: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidPolicy {
                variable,
                reason: format!("'{raw}' is not a non-negative integer"),
            }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidPolicy {
        variable: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPolicy { variable, reason } => write!(f, "{variable} {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort | ConfigError::InvalidPolicy { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for variable in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_REASON_MIN_CHARS",
            "APP_REASON_MAX_CHARS",
            "APP_MESSAGE_MAX_CHARS",
            "APP_REAPPLY_COOLDOWN_DAYS",
        ] {
            env::remove_var(variable);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.policy, PolicyConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_cooldown_and_reason_bounds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REASON_MIN_CHARS", "12");
        env::set_var("APP_REAPPLY_COOLDOWN_DAYS", "30");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.policy.reason_min_chars, 12);
        assert_eq!(config.policy.reapply_cooldown, Some(Duration::days(30)));
        reset_env();
    }

    #[test]
    fn rejects_inverted_reason_bounds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REASON_MIN_CHARS", "40");
        env::set_var("APP_REASON_MAX_CHARS", "20");
        match AppConfig::load() {
            Err(ConfigError::InvalidPolicy { variable, .. }) => {
                assert_eq!(variable, "APP_REASON_MIN_CHARS")
            }
            other => panic!("expected policy error, got {other:?}"),
        }
        reset_env();
    }
}
