use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub auth: AuthConfig,
    pub links: LinkConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted API keys. Empty disables authentication.
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Public origin short links are served from, e.g. `https://sho.rt`
    pub redirect_base_url: String,
    /// Where unknown keys are sent
    pub default_redirect_url: String,
    pub cache_max_entries: u64,
    pub cache_ttl_secs: u64,
}

impl LinkConfig {
    pub fn short_url(&self, key: &str) -> String {
        format!("{}/{}", self.redirect_base_url.trim_end_matches('/'), key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub query_timeout_secs: u64,
    pub export_dir: PathBuf,
    pub degrade_invalid_referrer: bool,
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 30,
            export_dir: std::env::temp_dir(),
            degrade_invalid_referrer: false,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

/// How the client address of a redirect is determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Socket peer address only
    #[default]
    None,
    /// `Forwarded` / `X-Forwarded-For`, validated against the trusted proxy list
    Standard,
    /// `CF-Connecting-IP`
    Cloudflare,
}

impl FromStr for TrustedProxyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "standard" => Ok(Self::Standard),
            "cloudflare" => Ok(Self::Cloudflare),
            other => Err(format!(
                "Unknown TRUSTED_PROXY_MODE '{other}'. Supported values: none, standard, cloudflare"
            )),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {name} '{raw}', falling back to the default");
            default
        }),
        Err(_) => default,
    }
}

/// Split a comma separated list, dropping blanks
fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = env_or("DATABASE_URL", "sqlite://./linkstat.db");

        let api_port = env_or("API_PORT", "8080")
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;
        let redirect_port = env_or("REDIRECT_PORT", "3000")
            .parse::<u16>()
            .context("REDIRECT_PORT must be a valid port number")?;

        let redirect_host = env_or("REDIRECT_HOST", "127.0.0.1");
        let redirect_base_url = std::env::var("REDIRECT_BASE_URL")
            .unwrap_or_else(|_| format!("http://{redirect_host}:{redirect_port}"));

        let trusted_proxy_mode = std::env::var("TRUSTED_PROXY_MODE")
            .ok()
            .map(|v| {
                v.parse::<TrustedProxyMode>().unwrap_or_else(|msg| {
                    tracing::warn!("{msg}, falling back to 'none'");
                    TrustedProxyMode::None
                })
            })
            .unwrap_or_default();

        let trusted_proxies = env_list("TRUSTED_PROXIES")
            .iter()
            .map(|cidr| {
                cidr.parse::<IpNet>()
                    .with_context(|| format!("TRUSTED_PROXIES contains invalid CIDR '{cidr}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok());

        let export_dir = std::env::var("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
            },
            api_server: ServerConfig {
                host: env_or("API_HOST", "127.0.0.1"),
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            auth: AuthConfig {
                api_keys: env_list("API_KEYS"),
            },
            links: LinkConfig {
                redirect_base_url,
                default_redirect_url: env_or("DEFAULT_REDIRECT_URL", "https://example.com"),
                cache_max_entries: env_parse("LINK_CACHE_MAX_ENTRIES", 10_000),
                cache_ttl_secs: env_parse("LINK_CACHE_TTL_SECS", 60),
            },
            analytics: AnalyticsConfig {
                query_timeout_secs: env_parse("STATS_QUERY_TIMEOUT_SECS", 30),
                export_dir,
                degrade_invalid_referrer: env_flag("DEGRADE_INVALID_REFERRER"),
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
        })
    }
}
