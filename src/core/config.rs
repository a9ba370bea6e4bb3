use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use std::env;
use std::path::{Path, PathBuf};

/// API credentials plus an optional REST base URL override.
///
/// Empty credentials are valid and mean "public endpoints only".
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    #[serde(alias = "api_secret")]
    pub secret_key: Secret<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Serialize)]
struct RedactedConfig<'a> {
    api_key: &'static str,
    secret_key: &'static str,
    base_url: &'a Option<String>,
}

impl Serialize for ExchangeConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RedactedConfig {
            api_key: "[REDACTED]",
            secret_key: "[REDACTED]",
            base_url: &self.base_url,
        }
        .serialize(serializer)
    }
}

impl ExchangeConfig {
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            base_url: None,
        }
    }

    /// No credentials; only public endpoints and the real-time feed work
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Read `<PREFIX>_API_KEY`, `<PREFIX>_SECRET_KEY` and the optional
    /// `<PREFIX>_BASE_URL`, e.g. `from_env("bitflyer")`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let required = |suffix: &str| {
            let name = format!("{}_{}", prefix, suffix);
            env::var(&name).map_err(|_| ConfigError::MissingEnvironmentVariable(name))
        };

        let mut config = Self::new(required("API_KEY")?, required("SECRET_KEY")?);
        config.base_url = env::var(format!("{}_BASE_URL", prefix)).ok();
        Ok(config)
    }

    /// Like [`ExchangeConfig::from_env`], after loading `.env` if it exists
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Load `path` into the process environment, then read it like
    /// [`ExchangeConfig::from_env`]. A missing file is not an error.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, path: &str) -> Result<Self, ConfigError> {
        if let Err(e) = dotenv::from_path(path) {
            if !e.not_found() {
                return Err(ConfigError::ReadFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key().is_empty() && !self.secret_key().is_empty()
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

/// Everything the command-line entry point needs, read once at startup.
///
/// The file layout is:
///
/// ```toml
/// [bitflyer]
/// api_key = "..."
/// api_secret = "..."
/// product_code = "BTC_JPY"
///
/// [logging]
/// log_file = "flyerx.log"
/// ```
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub product_code: String,
    pub log_file: PathBuf,
}

#[derive(Deserialize)]
struct AppConfigFile {
    bitflyer: BitflyerSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Deserialize)]
struct BitflyerSection {
    #[serde(flatten)]
    credentials: ExchangeConfig,
    #[serde(default = "default_product_code")]
    product_code: String,
}

#[derive(Deserialize)]
struct LoggingSection {
    #[serde(default = "default_log_file")]
    log_file: PathBuf,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

fn default_product_code() -> String {
    "BTC_JPY".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("flyerx.log")
}

impl AppConfig {
    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: AppConfigFile =
            toml::from_str(raw).map_err(|e| ConfigError::InvalidConfiguration(e.to_string()))?;

        if file.bitflyer.product_code.trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "product_code must not be empty".to_string(),
            ));
        }

        Ok(Self {
            exchange: file.bitflyer.credentials,
            product_code: file.bitflyer.product_code,
            log_file: file.logging.log_file,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnvironmentVariable(String),

    #[error("cannot read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
