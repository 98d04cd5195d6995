/// Configuration management for the API server
///
/// Everything comes from environment variables; a `.env` file is loaded
/// first when present.
///
/// # Environment Variables
///
/// | Variable | Default |
/// |---|---|
/// | `API_HOST` | `0.0.0.0` |
/// | `API_PORT` | `8080` |
/// | `PUBLIC_BASE_URL` | `http://localhost:{API_PORT}` |
/// | `CORS_ORIGINS` | `*` (comma-separated list) |
/// | `PRODUCTION` | `false` |
/// | `DATABASE_URL` | required |
/// | `DATABASE_MAX_CONNECTIONS` | `10` |
/// | `JWT_SECRET` | required, at least 32 characters |
/// | `STORAGE_BACKEND` | `local` (`local` or `memory`) |
/// | `STORAGE_ROOT` | `./data/blobs` |
/// | `STORAGE_KEY_PREFIX` | `uploads/` |
/// | `STORAGE_URL_SECRET` | `JWT_SECRET`; at least 32 characters |
/// | `PRESIGN_TTL_SECONDS` | `3600` |
/// | `BLOB_DELETE_TIMEOUT_MS` | `5000` |
/// | `MAX_UPLOAD_BYTES` | `10485760` |
/// | `MAX_IMAGES` | `4` |
///
/// # Example
///
/// ```no_run
/// use profilehub_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use profilehub_shared::db::pool::DatabaseConfig as PoolConfig;
use profilehub_shared::storage::{key::normalize_prefix, signer::UrlSigner};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Shortest secret accepted for JWT and URL signing
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Origin used when building signed blob URLs
    pub public_base_url: String,

    /// Allowed CORS origins; `*` means permissive
    pub cors_origins: Vec<String>,

    /// Enables HSTS
    pub production: bool,

    pub max_upload_bytes: usize,

    /// Longest image list a profile may hold
    pub max_images: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Pool settings for the shared pool builder, default timeouts included.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            ..PoolConfig::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing secret. Generate with `openssl rand -hex 32`.
    pub secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("Unknown STORAGE_BACKEND '{}', expected 'local' or 'memory'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Root directory of the local backend
    pub root: PathBuf,

    /// Namespace every image key must live under, ending in `/`
    pub key_prefix: String,

    pub url_secret: String,

    pub presign_ttl_seconds: u64,

    pub delete_timeout_ms: u64,
}

impl StorageConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_seconds)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms)
    }
}

fn parse_or<T>(vars: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match vars(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        _ => Ok(default),
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing, a number does not parse,
    /// or a secret is shorter than [`MIN_SECRET_LENGTH`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_vars(vars: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = vars("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&vars, "API_PORT", 8080)?;

        let public_base_url = vars("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let cors_origins: Vec<String> = vars("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let production: bool = parse_or(&vars, "PRODUCTION", false)?;

        let database_url = vars("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let max_connections: u32 = parse_or(&vars, "DATABASE_MAX_CONNECTIONS", 10)?;

        let jwt_secret = vars("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < MIN_SECRET_LENGTH {
            anyhow::bail!("JWT_SECRET must be at least {} characters long", MIN_SECRET_LENGTH);
        }

        let url_secret = vars("STORAGE_URL_SECRET").unwrap_or_else(|| jwt_secret.clone());
        if url_secret.len() < MIN_SECRET_LENGTH {
            anyhow::bail!(
                "STORAGE_URL_SECRET must be at least {} characters long",
                MIN_SECRET_LENGTH
            );
        }

        let backend: StorageBackend = match vars("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::Local,
        };

        let key_prefix = normalize_prefix(
            &vars("STORAGE_KEY_PREFIX").unwrap_or_else(|| "uploads/".to_string()),
        );

        let max_images: usize = parse_or(&vars, "MAX_IMAGES", profilehub_shared::MAX_IMAGES)?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                public_base_url,
                cors_origins,
                production,
                max_upload_bytes: parse_or(&vars, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
                max_images,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig { secret: jwt_secret },
            storage: StorageConfig {
                backend,
                root: PathBuf::from(vars("STORAGE_ROOT").unwrap_or_else(|| "./data/blobs".to_string())),
                key_prefix,
                url_secret,
                presign_ttl_seconds: parse_or(&vars, "PRESIGN_TTL_SECONDS", 3600)?,
                delete_timeout_ms: parse_or(&vars, "BLOB_DELETE_TIMEOUT_MS", 5000)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Signer for blob URLs, keyed with `STORAGE_URL_SECRET`.
    pub fn url_signer(&self) -> anyhow::Result<UrlSigner> {
        UrlSigner::new(self.storage.url_secret.as_bytes(), self.api.public_base_url.clone())
            .context("Invalid STORAGE_URL_SECRET")
    }
}
