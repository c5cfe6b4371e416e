//! Process configuration (§6). Everything is read from the environment
//! once at startup; nothing here is reloaded at runtime.

use std::env;
use std::fs;
use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use chrono::Duration;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: i64 = 168 * 60 * 60;
const DEFAULT_BCRYPT_COST: u32 = 12;
const DEFAULT_TRUST_TTL_DAYS: i64 = 30;

/// SMS transport settings. Absent `api_key` means OTPs are delivered by
/// the no-op sender (or parked for dev retrieval, if enabled).
#[derive(Debug, Clone, Default)]
pub struct SmsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub sender: Option<String>,
}

impl SmsConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.base_url.is_some()
    }
}

/// Process-wide policy tunables (§9), distinct from the per-org settings
/// stored in `OrgSettingsRepository`. Loaded the same way the scanner
/// config is: an explicit path, then an inline JSON/TOML blob, then a
/// short list of default candidate filenames, else built-in defaults.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PolicyTuningConfig {
    #[serde(default)]
    pub mfa_required_always: bool,
    #[serde(default)]
    pub default_trust_ttl_days: i64,
}

impl PolicyTuningConfig {
    pub fn load_from_env() -> Self {
        if let Ok(path) = env::var("WARDEN_POLICY_CONFIG_PATH") {
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(err) => {
                    tracing::warn!(error = %err, path, "failed to load policy config file, trying fallbacks");
                }
            }
        }

        if let Ok(inline) = env::var("WARDEN_POLICY_CONFIG_JSON") {
            match Self::parse_from_str(&inline) {
                Ok(config) => return config,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to parse WARDEN_POLICY_CONFIG_JSON, using defaults");
                }
            }
        }

        for candidate in ["warden-policy.toml", "warden-policy.json"] {
            if let Ok(config) = Self::load_from_file(candidate) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        if path.ends_with(".json") {
            serde_json::from_str(&content).with_context(|| format!("parsing {path} as json"))
        } else if path.ends_with(".toml") {
            toml::from_str(&content).with_context(|| format!("parsing {path} as toml"))
        } else {
            Self::parse_from_str(&content)
        }
    }

    fn parse_from_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).or_else(|toml_err| {
            serde_json::from_str(raw)
                .with_context(|| format!("not valid toml ({toml_err}) or json"))
        })
    }
}

/// Top-level process configuration assembled once in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: String,
    pub database_url: Option<String>,
    pub jwt_private_key_pem: Vec<u8>,
    pub jwt_public_key_pem: Vec<u8>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_access_ttl: Duration,
    pub jwt_refresh_ttl: Duration,
    pub bcrypt_cost: u32,
    pub default_trust_ttl_days: i64,
    pub otp_return_to_client: bool,
    pub sms: SmsConfig,
    pub policy: PolicyTuningConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let is_production = app_env.eq_ignore_ascii_case("production");

        let addr: SocketAddr = env::var("WARDEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse()
            .context("WARDEN_ADDR is not a valid socket address")?;

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let jwt_private_key_pem = load_key_material("JWT_PRIVATE_KEY")
            .context("loading JWT_PRIVATE_KEY")?;
        let jwt_public_key_pem =
            load_key_material("JWT_PUBLIC_KEY").context("loading JWT_PUBLIC_KEY")?;

        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "warden".to_string());
        let jwt_audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "warden-clients".to_string());

        let jwt_access_ttl = Duration::seconds(
            env::var("JWT_ACCESS_TTL")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_ACCESS_TTL_SECS),
        );
        let jwt_refresh_ttl = Duration::seconds(
            env::var("JWT_REFRESH_TTL")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_REFRESH_TTL_SECS),
        );

        let bcrypt_cost: u32 = env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BCRYPT_COST);
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}");
        }

        let default_trust_ttl_days = env::var("DEFAULT_TRUST_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TRUST_TTL_DAYS);

        let otp_return_to_client = env::var("OTP_RETURN_TO_CLIENT")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if otp_return_to_client && is_production {
            bail!("OTP_RETURN_TO_CLIENT must not be enabled when APP_ENV=production");
        }

        let sms = SmsConfig {
            base_url: env::var("SMS_BASE_URL").ok(),
            api_key: env::var("SMS_API_KEY").ok(),
            sender: env::var("SMS_SENDER").ok(),
        };

        Ok(Self {
            addr,
            app_env,
            database_url,
            jwt_private_key_pem,
            jwt_public_key_pem,
            jwt_issuer,
            jwt_audience,
            jwt_access_ttl,
            jwt_refresh_ttl,
            bcrypt_cost,
            default_trust_ttl_days,
            otp_return_to_client,
            sms,
            policy: PolicyTuningConfig::load_from_env(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn auth_enabled(&self) -> bool {
        self.database_url.is_some()
    }

    #[cfg(feature = "test-support")]
    pub fn test_fixture() -> Self {
        Self {
            addr: DEFAULT_ADDR.parse().expect("valid default addr"),
            app_env: "development".to_string(),
            database_url: None,
            jwt_private_key_pem: Vec::new(),
            jwt_public_key_pem: Vec::new(),
            jwt_issuer: "warden-test".to_string(),
            jwt_audience: "warden-test-clients".to_string(),
            jwt_access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            jwt_refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            bcrypt_cost: 4,
            default_trust_ttl_days: DEFAULT_TRUST_TTL_DAYS,
            otp_return_to_client: true,
            sms: SmsConfig::default(),
            policy: PolicyTuningConfig::default(),
        }
    }
}

/// `JWT_PRIVATE_KEY`/`JWT_PUBLIC_KEY` may hold inline PEM text or a path
/// to a file containing it.
fn load_key_material(var: &str) -> Result<Vec<u8>> {
    let raw = env::var(var).with_context(|| format!("{var} is not set"))?;
    if raw.trim_start().starts_with("-----BEGIN") {
        return Ok(raw.into_bytes());
    }
    fs::read(&raw).with_context(|| format!("reading {var} key file at {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_tuning_parses_toml_or_json() {
        let toml = PolicyTuningConfig::parse_from_str(
            "mfa_required_always = true\ndefault_trust_ttl_days = 7\n",
        )
        .unwrap();
        assert!(toml.mfa_required_always);
        assert_eq!(toml.default_trust_ttl_days, 7);

        let json = PolicyTuningConfig::parse_from_str(
            r#"{"mfa_required_always": false, "default_trust_ttl_days": 14}"#,
        )
        .unwrap();
        assert!(!json.mfa_required_always);
        assert_eq!(json.default_trust_ttl_days, 14);
    }

    #[test]
    fn sms_requires_both_url_and_key() {
        let mut sms = SmsConfig::default();
        assert!(!sms.is_configured());
        sms.base_url = Some("https://example.com".into());
        assert!(!sms.is_configured());
        sms.api_key = Some("key".into());
        assert!(sms.is_configured());
    }
}
