use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Where session records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    Redis,
}

impl FromStr for SessionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(SessionBackend::Memory),
            "redis" => Ok(SessionBackend::Redis),
            other => Err(format!("expected memory or redis, got {}", other)),
        }
    }
}

/// How the session id travels between client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransport {
    /// HttpOnly `SameSite=Strict` cookie.
    Cookie,
    /// `x-session-token` response header, `Authorization: Bearer` on requests.
    Bearer,
}

impl FromStr for SessionTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cookie" => Ok(SessionTransport::Cookie),
            "bearer" => Ok(SessionTransport::Bearer),
            other => Err(format!("expected cookie or bearer, got {}", other)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    // Server
    pub bind_addr: SocketAddr,
    pub allowed_origin: String,

    // Session storage
    pub session_backend: SessionBackend,
    pub redis_url: Option<String>,

    // Session transport
    pub session_transport: SessionTransport,
    pub session_cookie_name: String,
    pub cookie_secure: bool,

    // TTLs (in seconds)
    pub session_ttl_secs: u64,
    pub nonce_ttl_secs: u64,
    pub cleanup_interval_secs: u64,

    // Verification policy
    pub expected_domain: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("allowed_origin", &self.allowed_origin)
            .field("session_backend", &self.session_backend)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("session_transport", &self.session_transport)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("cookie_secure", &self.cookie_secure)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("cleanup_interval_secs", &self.cleanup_interval_secs)
            .field("expected_domain", &self.expected_domain)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            allowed_origin: "http://localhost:8080".to_string(),
            session_backend: SessionBackend::Memory,
            redis_url: None,
            session_transport: SessionTransport::Cookie,
            session_cookie_name: "siwe-session".to_string(),
            cookie_secure: false,
            session_ttl_secs: 86_400,
            nonce_ttl_secs: 300,
            cleanup_interval_secs: 60,
            expected_domain: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        let bind_addr = parse_env_or_default("BIND_ADDR", defaults.bind_addr)?;

        let allowed_origin = env::var("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin);
        if !(allowed_origin.starts_with("http://") || allowed_origin.starts_with("https://"))
            || HeaderValue::from_str(&allowed_origin).is_err()
        {
            return Err(ConfigError::InvalidValue(
                "ALLOWED_ORIGIN".to_string(),
                "must be an http(s) origin".to_string(),
            ));
        }

        let session_backend = parse_env_or_default("SESSION_BACKEND", defaults.session_backend)?;
        let redis_url = non_empty_var("REDIS_URL");
        if session_backend == SessionBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::MissingVar("REDIS_URL".to_string()));
        }

        let session_transport =
            parse_env_or_default("SESSION_TRANSPORT", defaults.session_transport)?;

        let session_cookie_name =
            env::var("SESSION_COOKIE_NAME").unwrap_or(defaults.session_cookie_name);
        if session_cookie_name.is_empty()
            || !session_cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidValue(
                "SESSION_COOKIE_NAME".to_string(),
                "may only contain alphanumeric characters, hyphens, and underscores".to_string(),
            ));
        }

        let cookie_secure = parse_env_or_default("COOKIE_SECURE", defaults.cookie_secure)?;

        let session_ttl_secs = parse_positive("SESSION_TTL_SECS", defaults.session_ttl_secs)?;
        let nonce_ttl_secs = parse_positive("NONCE_TTL_SECS", defaults.nonce_ttl_secs)?;
        let cleanup_interval_secs =
            parse_positive("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval_secs)?;

        let expected_domain = non_empty_var("EXPECTED_DOMAIN");

        Ok(Config {
            bind_addr,
            allowed_origin,
            session_backend,
            redis_url,
            session_transport,
            session_cookie_name,
            cookie_secure,
            session_ttl_secs,
            nonce_ttl_secs,
            cleanup_interval_secs,
            expected_domain,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}

fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_env_or_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}
