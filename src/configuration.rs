use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;

pub const DEFAULT_ACCESS_TOKEN_EXPIRY: i64 = 7200;
pub const DEFAULT_REFRESH_TOKEN_EXPIRY: i64 = 31_536_000;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub cookie: CookieSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Header carrying the subject id established by the upstream session layer
    #[serde(default = "default_subject_header")]
    pub subject_header: String,
    /// Peers allowed to set `subject_header`; an empty list trusts every peer
    #[serde(default = "default_trusted_peers")]
    pub trusted_peers: Vec<IpAddr>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_subject_header() -> String {
    "X-Subject-Id".to_string()
}

pub fn default_trusted_peers() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(Ipv6Addr::LOCALHOST),
    ]
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// What to do when the stored refresh token has expired
#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshExpiryPolicy {
    /// Silently mint a fresh access/refresh pair
    #[default]
    Reissue,
    /// Refuse the request so the caller logs the user out
    ForceLogout,
}

/// JWT settings
///
/// Key material comes from `secret` or, when set, from the file at
/// `secret_file`. It is read once by `signing_key` at startup.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: i64, // seconds
    #[serde(default)]
    pub refresh_expiry_policy: RefreshExpiryPolicy,
}

fn default_access_expiry() -> i64 {
    DEFAULT_ACCESS_TOKEN_EXPIRY
}

fn default_refresh_expiry() -> i64 {
    DEFAULT_REFRESH_TOKEN_EXPIRY
}

impl JwtSettings {
    /// Settings with the default lifetimes and an inline secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            secret_file: None,
            access_token_expiry: DEFAULT_ACCESS_TOKEN_EXPIRY,
            refresh_token_expiry: DEFAULT_REFRESH_TOKEN_EXPIRY,
            refresh_expiry_policy: RefreshExpiryPolicy::default(),
        }
    }

    /// Load the HMAC key material
    ///
    /// # Errors
    /// Returns error if no key source is configured, the key file cannot be
    /// read, or the key is empty
    pub fn signing_key(&self) -> Result<Vec<u8>, ConfigError> {
        let key = match (&self.secret_file, &self.secret) {
            (Some(path), _) => std::fs::read(path).map_err(|e| {
                ConfigError::InvalidValue(format!("jwt.secret_file {}: {}", path.display(), e))
            })?,
            (None, Some(secret)) => secret.as_bytes().to_vec(),
            (None, None) => {
                return Err(ConfigError::MissingRequired(
                    "jwt.secret or jwt.secret_file".to_string(),
                ))
            }
        };

        if key.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigError::InvalidValue("jwt signing key is empty".to_string()));
        }
        Ok(key)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_lifetime("jwt.access_token_expiry", self.access_token_expiry)?;
        check_lifetime("jwt.refresh_token_expiry", self.refresh_token_expiry)
    }
}

// Tokens issued now must expire within chrono's (and Postgres') time range
fn check_lifetime(name: &str, seconds: i64) -> Result<(), ConfigError> {
    if seconds <= 0 {
        return Err(ConfigError::InvalidValue(format!("{} must be positive", name)));
    }
    let max = DateTime::<Utc>::MAX_UTC.timestamp() - Utc::now().timestamp();
    if seconds > max {
        return Err(ConfigError::InvalidValue(format!(
            "{} must not exceed {} seconds",
            name, max
        )));
    }
    Ok(())
}

/// Where the access token is handed back to the client
#[derive(serde::Deserialize, Clone, Debug)]
pub struct CookieSettings {
    #[serde(default = "default_cookie_name")]
    pub name: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
}

fn default_cookie_name() -> String {
    "Authorization".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            path: default_cookie_path(),
            secure: false,
        }
    }
}

/// Read `configuration.{yaml,toml,json}` if present, then `APP_*` environment
/// variables (`APP_JWT__SECRET`, `APP_APPLICATION__PORT`, ...)
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.jwt.validate()?;
    Ok(settings)
}
