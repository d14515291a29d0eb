use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Largest accepted upload, in bytes.
    pub max_file_size: u64,
    /// Base of the signed download URLs handed to clients.
    pub public_url: String,
    pub signing_secret: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("max_file_size", &self.max_file_size)
            .field("public_url", &self.public_url)
            .field("signing_secret", &"<redacted>")
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Per-user file tree service with share links")]
pub struct Args {
    /// Host to bind to (overrides FILE_TREE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_TREE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where file content is stored (overrides FILE_TREE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILE_TREE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum upload size in bytes (overrides FILE_TREE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Public base URL for download links (overrides FILE_TREE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("FILE_TREE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("FILE_TREE_PORT", 3000u16)?;
        let env_storage =
            env::var("FILE_TREE_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".into());
        let env_db = env::var("FILE_TREE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/file_tree.db".into());
        let env_max = parse_env("FILE_TREE_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let env_public =
            env::var("FILE_TREE_PUBLIC_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".into());
        let signing_secret = match env::var("FILE_TREE_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "FILE_TREE_SIGNING_SECRET not set, download links will not survive a restart"
                );
                Uuid::new_v4().simple().to_string()
            }
        };

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_file_size: args.max_file_size.unwrap_or(env_max),
            public_url: args.public_url.unwrap_or(env_public),
            signing_secret,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read `key` as a `T`, using `default` when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
