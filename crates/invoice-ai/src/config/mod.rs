use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::workflows::invoices::{RiskConfig, RiskConfigError};

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
    pub risk: RiskSettings,
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
            risk: RiskSettings::from_env()?,
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Scoring policy plus the optional exported model file.
#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub policy: RiskConfig,
    pub model_path: Option<PathBuf>,
}

impl RiskSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = RiskConfig::default();
        let policy = RiskConfig {
            po_required_amount: parse_var("RISK_PO_REQUIRED_AMOUNT", defaults.po_required_amount)?,
            low_amount_threshold: parse_var("RISK_LOW_AMOUNT", defaults.low_amount_threshold)?,
            high_amount_threshold: parse_var("RISK_HIGH_AMOUNT", defaults.high_amount_threshold)?,
            amount_scale: parse_var::<Decimal>("RISK_AMOUNT_SCALE", defaults.amount_scale)?,
            medium_probability: parse_var("RISK_THRESHOLD_MEDIUM", defaults.medium_probability)?,
            high_probability: parse_var("RISK_THRESHOLD_HIGH", defaults.high_probability)?,
            suspicious_vendor_tokens: list_var(
                "RISK_SUSPICIOUS_VENDOR_TOKENS",
                defaults.suspicious_vendor_tokens,
            ),
            risky_keywords: list_var("RISK_KEYWORDS", defaults.risky_keywords),
        };
        policy.validate().map_err(ConfigError::InvalidRisk)?;

        let model_path = env::var("RISK_MODEL_PATH")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Ok(Self { policy, model_path })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber {
                    name,
                    value: raw.clone(),
                })
        }
        _ => Ok(default),
    }
}

fn list_var(name: &str, default: Vec<String>) -> Vec<String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => default,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    InvalidRisk(RiskConfigError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a number, got '{value}'")
            }
            ConfigError::InvalidRisk(err) => write!(f, "invalid risk policy: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidRisk(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const RISK_VARS: [&str; 9] = [
        "RISK_PO_REQUIRED_AMOUNT",
        "RISK_LOW_AMOUNT",
        "RISK_HIGH_AMOUNT",
        "RISK_AMOUNT_SCALE",
        "RISK_THRESHOLD_MEDIUM",
        "RISK_THRESHOLD_HIGH",
        "RISK_SUSPICIOUS_VENDOR_TOKENS",
        "RISK_KEYWORDS",
        "RISK_MODEL_PATH",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        for name in RISK_VARS {
            env::remove_var(name);
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
        assert_eq!(config.risk.policy, RiskConfig::default());
        assert!(config.risk.model_path.is_none());
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
    fn risk_policy_reads_thresholds_and_lists() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RISK_HIGH_AMOUNT", "75000");
        env::set_var("RISK_THRESHOLD_MEDIUM", "0.25");
        env::set_var("RISK_SUSPICIOUS_VENDOR_TOKENS", " shell co , offshore ,,");
        env::set_var("RISK_MODEL_PATH", "models/risk.json");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.risk.policy.high_amount_threshold, Decimal::from(75_000));
        assert_eq!(config.risk.policy.medium_probability, 0.25);
        assert_eq!(
            config.risk.policy.suspicious_vendor_tokens,
            vec!["shell co".to_string(), "offshore".to_string()]
        );
        assert_eq!(
            config.risk.model_path,
            Some(PathBuf::from("models/risk.json"))
        );
        reset_env();
    }

    #[test]
    fn rejects_unparsable_or_inconsistent_risk_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RISK_LOW_AMOUNT", "ten thousand");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                name: "RISK_LOW_AMOUNT",
                ..
            })
        ));

        env::set_var("RISK_LOW_AMOUNT", "90000");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidRisk(
                RiskConfigError::AmountThresholdOrder { .. }
            ))
        ));
        reset_env();
    }
}
