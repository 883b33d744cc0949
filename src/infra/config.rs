//! Centralized configuration (environment variables + defaults).

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Stripe credentials. Checkout and webhooks are disabled without them.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub price_basic: Option<String>,
    pub price_pro: Option<String>,
    /// Overrides the Stripe API root (stripe-mock, tests).
    pub api_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub api_key: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub openai_api_key: Option<String>,
    pub openai_url: String,
    pub flag_threshold: f64,
    pub reject_threshold: f64,
    pub poll_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub license_secret: String,
    pub storage_dir: PathBuf,
    pub storage_signing_secret: String,
    pub download_url_ttl_secs: i64,
    pub max_upload_bytes: usize,
    pub quarantine_ttl_secs: i64,
    pub quarantine_sweep_secs: u64,
    pub webhook_tolerance_secs: i64,
    pub bootstrap_admin_email: Option<String>,
    pub stripe: StripeConfig,
    pub binance: Option<BinanceConfig>,
    pub moderation: ModerationConfig,
}

const DEFAULT_MODERATION_URL: &str = "https://api.openai.com/v1/moderations";

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let license_secret = required("LICENSE_SECRET")?;
        let storage_signing_secret =
            get("STORAGE_SIGNING_SECRET").unwrap_or_else(|| license_secret.clone());

        let binance = match (get("BINANCE_PAY_API_KEY"), get("BINANCE_PAY_SECRET")) {
            (Some(api_key), Some(secret)) => Some(BinanceConfig { api_key, secret }),
            _ => None,
        };

        let moderation = ModerationConfig {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_url: get("OPENAI_MODERATION_URL")
                .unwrap_or_else(|| DEFAULT_MODERATION_URL.to_string()),
            flag_threshold: parse_or(&get, "MODERATION_FLAG_THRESHOLD", 0.5)?,
            reject_threshold: parse_or(&get, "MODERATION_REJECT_THRESHOLD", 0.9)?,
            poll_secs: parse_or(&get, "MODERATION_POLL_SECS", 30u64)?.max(1),
        };
        let (flag, reject) = (moderation.flag_threshold, moderation.reject_threshold);
        if !(flag > 0.0 && flag <= reject && reject <= 1.0) {
            return Err(ConfigError::Invalid {
                name: "MODERATION_FLAG_THRESHOLD",
                value: format!("{flag}/{reject}"),
                reason: "thresholds must satisfy 0 < flag <= reject <= 1".to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5u32)?.max(1),
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_secs: parse_or(&get, "JWT_TTL_SECS", 7 * 24 * 3600i64)?,
            license_secret,
            storage_dir: get("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storage")),
            storage_signing_secret,
            download_url_ttl_secs: parse_or(&get, "DOWNLOAD_URL_TTL_SECS", 900i64)?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize)?,
            quarantine_ttl_secs: parse_or(&get, "QUARANTINE_TTL_SECS", 86_400i64)?,
            quarantine_sweep_secs: parse_or(&get, "QUARANTINE_SWEEP_SECS", 300u64)?.max(1),
            webhook_tolerance_secs: parse_or(&get, "WEBHOOK_TOLERANCE_SECS", 300i64)?,
            bootstrap_admin_email: get("BOOTSTRAP_ADMIN_EMAIL").map(|e| e.trim().to_lowercase()),
            stripe: StripeConfig {
                secret_key: get("STRIPE_SECRET_KEY"),
                webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
                price_basic: get("STRIPE_PRICE_BASIC"),
                price_pro: get("STRIPE_PRICE_PRO"),
                api_base: get("STRIPE_API_BASE"),
            },
            binance,
            moderation,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name: key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", "jwt"),
            ("LICENSE_SECRET", "lic"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&base()).unwrap();
        assert_eq!(cfg.bind_addr.port(), 3000);
        assert_eq!(cfg.storage_signing_secret, "lic");
        assert_eq!(cfg.download_url_ttl_secs, 900);
        assert!(cfg.binance.is_none());
        assert!(cfg.moderation.openai_api_key.is_none());
        assert_eq!(cfg.moderation.flag_threshold, 0.5);
    }

    #[test]
    fn missing_required_is_reported() {
        let mut vars = base();
        vars.remove("JWT_SECRET");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut vars = base();
        vars.insert("LICENSE_SECRET", "  ");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("LICENSE_SECRET"))));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let mut vars = base();
        vars.insert("JWT_TTL_SECS", "soon");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "JWT_TTL_SECS", .. })
        ));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut vars = base();
        vars.insert("MODERATION_FLAG_THRESHOLD", "0.95");
        vars.insert("MODERATION_REJECT_THRESHOLD", "0.9");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn binance_needs_both_credentials() {
        let mut vars = base();
        vars.insert("BINANCE_PAY_API_KEY", "key");
        assert!(load(&vars).unwrap().binance.is_none());
        vars.insert("BINANCE_PAY_SECRET", "secret");
        assert!(load(&vars).unwrap().binance.is_some());
    }

    #[test]
    fn public_base_url_is_trimmed() {
        let mut vars = base();
        vars.insert("PUBLIC_BASE_URL", "https://shop.example.com/");
        assert_eq!(load(&vars).unwrap().public_base_url, "https://shop.example.com");
    }
}
