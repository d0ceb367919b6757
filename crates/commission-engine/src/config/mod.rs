use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::commissions::repository::Page;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub commission: CommissionSettings,
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
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::Compact,
        };

        let defaults = CommissionSettings::default();
        let default_limit = read_usize("COMMISSION_BATCH_LIMIT", defaults.default_limit)?;
        let max_limit = read_usize("COMMISSION_MAX_BATCH_LIMIT", defaults.max_limit)?;
        if default_limit == 0 || default_limit > max_limit {
            return Err(ConfigError::InvalidLimits {
                default: default_limit,
                max: max_limit,
            });
        }

        let admin_roles = match env::var("COMMISSION_ADMIN_ROLES") {
            Ok(raw) => raw
                .split(',')
                .map(|role| role.trim().to_ascii_lowercase())
                .filter(|role| !role.is_empty())
                .collect(),
            Err(_) => defaults.admin_roles,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            commission: CommissionSettings {
                default_limit,
                max_limit,
                calculate_on_upsert: read_flag(
                    "COMMISSION_CALCULATE_ON_UPSERT",
                    defaults.calculate_on_upsert,
                )?,
                admin_roles,
                seed_demo_data: read_flag("COMMISSION_SEED_DEMO_DATA", defaults.seed_demo_data)?,
            },
        })
    }
}

fn read_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn read_flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { var, value: raw }),
        },
        Err(_) => Ok(default),
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Knobs for the commission engine's batch sizes, triggers and API guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Run `ensure_calculated` right after a sale upsert.
    pub calculate_on_upsert: bool,
    pub admin_roles: Vec<String>,
    pub seed_demo_data: bool,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
            calculate_on_upsert: true,
            admin_roles: vec!["admin".to_string(), "ceo".to_string()],
            seed_demo_data: false,
        }
    }
}

impl CommissionSettings {
    /// Clamps a caller-supplied page to `max_limit`.
    pub fn page(&self, limit: Option<usize>, offset: Option<usize>) -> Page {
        let limit = limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit);
        Page {
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    pub fn allows_role(&self, role: &str) -> bool {
        let role = role.trim();
        self.admin_roles
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(role))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidNumber { var: &'static str, value: String },
    InvalidFlag { var: &'static str, value: String },
    InvalidLimits { default: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'pretty' (found '{value}')")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer (found '{value}')")
            }
            ConfigError::InvalidFlag { var, value } => {
                write!(f, "{var} must be true or false (found '{value}')")
            }
            ConfigError::InvalidLimits { default, max } => write!(
                f,
                "COMMISSION_BATCH_LIMIT ({default}) must be between 1 and COMMISSION_MAX_BATCH_LIMIT ({max})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
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
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "COMMISSION_BATCH_LIMIT",
            "COMMISSION_MAX_BATCH_LIMIT",
            "COMMISSION_CALCULATE_ON_UPSERT",
            "COMMISSION_ADMIN_ROLES",
            "COMMISSION_SEED_DEMO_DATA",
        ] {
            env::remove_var(var);
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
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.commission, CommissionSettings::default());
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
    fn reads_commission_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("COMMISSION_BATCH_LIMIT", "250");
        env::set_var("COMMISSION_CALCULATE_ON_UPSERT", "false");
        env::set_var("COMMISSION_ADMIN_ROLES", "Admin, finance ,");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.commission.default_limit, 250);
        assert_eq!(config.commission.max_limit, 1000);
        assert!(!config.commission.calculate_on_upsert);
        assert_eq!(config.commission.admin_roles, vec!["admin", "finance"]);
        reset_env();
    }

    #[test]
    fn rejects_default_limit_above_max() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("COMMISSION_BATCH_LIMIT", "5000");
        match AppConfig::load() {
            Err(ConfigError::InvalidLimits { default, max }) => {
                assert_eq!((default, max), (5000, 1000));
            }
            other => panic!("expected invalid limits, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_unknown_flag_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("COMMISSION_SEED_DEMO_DATA", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag {
                var: "COMMISSION_SEED_DEMO_DATA",
                ..
            })
        ));
        reset_env();
    }

    #[test]
    fn page_is_clamped_to_max_limit() {
        let settings = CommissionSettings::default();
        assert_eq!(settings.page(None, None), Page { limit: 100, offset: 0 });
        assert_eq!(settings.page(Some(5000), Some(20)), Page { limit: 1000, offset: 20 });
        assert_eq!(settings.page(Some(0), None).limit, 100);
        assert!(settings.allows_role("CEO"));
        assert!(!settings.allows_role("sales"));
    }
}
