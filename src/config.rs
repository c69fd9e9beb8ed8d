use crate::services::file_id::AddressingScheme;
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Which object store implementation backs the gateway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// SQLite metadata plus sharded files on disk.
    #[default]
    Local,
    /// Process memory; lost on restart.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub database_url: String,
    pub addressing: AddressingScheme,
    pub default_bucket: String,
    pub default_category: String,
    pub region: String,
    pub upload_concurrency: usize,
    pub max_file_size: usize,
    pub max_batch_files: usize,
    pub allowed_mime_types: Vec<String>,
    pub body_limit: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File gateway over an S3-style object store")]
pub struct Args {
    /// Host to bind to (overrides FILE_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides FILE_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory where object payloads are stored (overrides FILE_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILE_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// How file ids map to object keys (overrides FILE_GATEWAY_ADDRESSING)
    #[arg(long, value_enum)]
    pub addressing: Option<AddressingScheme>,

    /// Default bucket (overrides FILE_GATEWAY_BUCKET)
    #[arg(long = "bucket")]
    pub default_bucket: Option<String>,

    /// Category used when an upload names none (overrides FILE_GATEWAY_DEFAULT_CATEGORY)
    #[arg(long)]
    pub default_category: Option<String>,

    /// Region recorded on new buckets (overrides FILE_GATEWAY_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Simultaneous uploads per batch (overrides FILE_GATEWAY_UPLOAD_CONCURRENCY)
    #[arg(long)]
    pub upload_concurrency: Option<usize>,

    /// Largest accepted file in bytes (overrides FILE_GATEWAY_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<usize>,

    /// Most files per multipart batch (overrides FILE_GATEWAY_MAX_BATCH_FILES)
    #[arg(long)]
    pub max_batch_files: Option<usize>,

    /// Comma separated allow-list, e.g. `image/*,application/pdf`
    /// (overrides FILE_GATEWAY_ALLOWED_MIME_TYPES)
    #[arg(long)]
    pub allowed_mime_types: Option<String>,

    /// Request body limit in bytes (overrides FILE_GATEWAY_BODY_LIMIT)
    #[arg(long)]
    pub body_limit: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        let backend = match args.backend {
            Some(backend) => backend,
            None => env_value_enum("FILE_GATEWAY_BACKEND")?.unwrap_or_default(),
        };
        let addressing = match args.addressing {
            Some(scheme) => scheme,
            None => env_value_enum("FILE_GATEWAY_ADDRESSING")?.unwrap_or_default(),
        };
        let allowed = match args.allowed_mime_types {
            Some(list) => list,
            None => env::var("FILE_GATEWAY_ALLOWED_MIME_TYPES").unwrap_or_default(),
        };

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("FILE_GATEWAY_HOST", "0.0.0.0")),
            port: or_env(args.port, "FILE_GATEWAY_PORT", 3000)?,
            backend,
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("FILE_GATEWAY_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "FILE_GATEWAY_DATABASE_URL",
                    "sqlite://./data/meta/file_gateway.db",
                )
            }),
            addressing,
            default_bucket: args
                .default_bucket
                .unwrap_or_else(|| env_or("FILE_GATEWAY_BUCKET", "mybucket")),
            default_category: args
                .default_category
                .unwrap_or_else(|| env_or("FILE_GATEWAY_DEFAULT_CATEGORY", "uncategorized")),
            region: args
                .region
                .unwrap_or_else(|| env_or("FILE_GATEWAY_REGION", "local")),
            upload_concurrency: or_env(
                args.upload_concurrency,
                "FILE_GATEWAY_UPLOAD_CONCURRENCY",
                8,
            )?,
            max_file_size: or_env(args.max_file_size, "FILE_GATEWAY_MAX_FILE_SIZE", 10 * 1024 * 1024)?,
            max_batch_files: or_env(args.max_batch_files, "FILE_GATEWAY_MAX_BATCH_FILES", 10)?,
            allowed_mime_types: parse_mime_list(&allowed),
            body_limit: or_env(args.body_limit, "FILE_GATEWAY_BODY_LIMIT", 50 * 1024 * 1024)?,
        };

        if cfg.upload_concurrency == 0 {
            return Err(anyhow!("upload concurrency must be at least 1"));
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

/// CLI value if given, else the parsed environment variable, else `default`.
fn or_env<T>(cli: Option<T>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_value_enum<T: ValueEnum>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => T::from_str(value.trim(), true)
            .map(Some)
            .map_err(|err| anyhow!("parsing {} value `{}`: {}", key, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn parse_mime_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win_and_lists_are_normalized() {
        let args = Args::parse_from([
            "file-gateway",
            "--port",
            "8080",
            "--backend",
            "memory",
            "--addressing",
            "direct",
            "--bucket",
            "uploads",
            "--allowed-mime-types",
            " Image/*, application/pdf ,,",
        ]);
        let cfg = AppConfig::merge(args).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.addressing, AddressingScheme::Direct);
        assert_eq!(cfg.default_bucket, "uploads");
        assert_eq!(cfg.allowed_mime_types, vec!["image/*", "application/pdf"]);
        assert_eq!(cfg.addr(), format!("{}:8080", cfg.host));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let args = Args::parse_from(["file-gateway", "--upload-concurrency", "0"]);
        assert!(AppConfig::merge(args).is_err());
    }

    #[test]
    fn migrate_flag_is_parsed() {
        let args = Args::parse_from(["file-gateway", "--migrate"]);
        assert!(args.migrate);
    }
}
