use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;

use crate::workflows::dispatch::CoveragePolicy;

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
    pub dispatch: DispatchConfig,
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
        let mut telemetry = TelemetryConfig::for_environment(environment, log_level);
        if let Ok(raw) = env::var("APP_LOG_FORMAT") {
            telemetry.format = LogFormat::parse(&raw)
                .ok_or(ConfigError::InvalidLogFormat { value: raw })?;
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry,
            dispatch: DispatchConfig::from_env()?,
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

/// Output shape of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub ansi: bool,
    pub with_target: bool,
}

impl TelemetryConfig {
    /// Colored compact lines for local work, JSON with module targets in production.
    pub fn for_environment(environment: AppEnvironment, log_level: String) -> Self {
        match environment {
            AppEnvironment::Development => Self {
                log_level,
                format: LogFormat::Compact,
                ansi: true,
                with_target: false,
            },
            AppEnvironment::Test => Self {
                log_level,
                format: LogFormat::Compact,
                ansi: false,
                with_target: true,
            },
            AppEnvironment::Production => Self {
                log_level,
                format: LogFormat::Json,
                ansi: false,
                with_target: true,
            },
        }
    }
}

/// Engine knobs: commission rate, unscoped candidate handling and offer lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub commission_rate: Decimal,
    pub unscoped_candidates: CoveragePolicy,
    pub offer_ttl: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(10, 2),
            unscoped_candidates: CoveragePolicy::Include,
            offer_ttl: None,
        }
    }
}

impl DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let commission_rate = match env::var("DISPATCH_COMMISSION_RATE") {
            Ok(raw) => parse_rate(&raw)?,
            Err(_) => defaults.commission_rate,
        };

        let unscoped_candidates = match env::var("DISPATCH_UNSCOPED_CANDIDATES") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "include" => CoveragePolicy::Include,
                "exclude" => CoveragePolicy::Exclude,
                _ => return Err(ConfigError::InvalidCoveragePolicy { value: raw }),
            },
            Err(_) => defaults.unscoped_candidates,
        };

        let offer_ttl = match env::var("DISPATCH_OFFER_TTL_MINUTES") {
            Ok(raw) if raw.trim().is_empty() => None,
            Ok(raw) => {
                let ttl = raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|minutes| *minutes > 0)
                    .and_then(Duration::try_minutes)
                    .ok_or(ConfigError::InvalidOfferTtl { value: raw })?;
                Some(ttl)
            }
            Err(_) => None,
        };

        Ok(Self {
            commission_rate,
            unscoped_candidates,
            offer_ttl,
        })
    }
}

fn parse_rate(raw: &str) -> Result<Decimal, ConfigError> {
    let rate = Decimal::from_str(raw.trim()).map_err(|_| ConfigError::InvalidCommissionRate {
        value: raw.to_string(),
    })?;
    if rate.is_sign_negative() || rate > Decimal::ONE {
        return Err(ConfigError::InvalidCommissionRate {
            value: raw.to_string(),
        });
    }
    Ok(rate)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCommissionRate { value: String },
    InvalidCoveragePolicy { value: String },
    InvalidOfferTtl { value: String },
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCommissionRate { value } => write!(
                f,
                "DISPATCH_COMMISSION_RATE must be a decimal between 0 and 1, got '{}'",
                value
            ),
            ConfigError::InvalidCoveragePolicy { value } => write!(
                f,
                "DISPATCH_UNSCOPED_CANDIDATES must be 'include' or 'exclude', got '{}'",
                value
            ),
            ConfigError::InvalidOfferTtl { value } => write!(
                f,
                "DISPATCH_OFFER_TTL_MINUTES must be a positive number of minutes, got '{}'",
                value
            ),
            ConfigError::InvalidLogFormat { value } => write!(
                f,
                "APP_LOG_FORMAT must be 'compact' or 'json', got '{}'",
                value
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
