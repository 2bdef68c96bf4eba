use crate::{size::parse_size, validation::DEFAULT_ALLOWED_EXTENSIONS};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1_048_576;
pub const DEFAULT_MAX_LABEL_LEN: usize = 500;
/// Ten years.
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Where multipart uploads are spooled before validation.
    pub upload_dir: PathBuf,
    /// Overrides the `http://{Host}` origin used in object URLs.
    pub public_base_url: Option<String>,
    pub token_ttl: Duration,
    pub objects: ObjectStoreConfig,
}

/// Construction-time settings of one mounted object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket_name: String,
    pub route_prefix: String,
    /// The ceiling as written by the operator, e.g. `5MB`.
    pub max_file_size: String,
    pub max_file_size_bytes: u64,
    pub chunk_size_bytes: usize,
    pub max_label_len: usize,
    pub allowed_extensions: Vec<String>,
    /// Orphans younger than this are left alone by reconciliation.
    pub orphan_grace: Duration,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            bucket_name: "image".into(),
            route_prefix: "/image".into(),
            max_file_size: "5MB".into(),
            max_file_size_bytes: 5 * 1024 * 1024,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            max_label_len: DEFAULT_MAX_LABEL_LEN,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            orphan_grace: Duration::from_secs(3600),
        }
    }
}

impl ObjectStoreConfig {
    /// Validate and normalize the object store settings.
    pub fn new(
        bucket_name: impl Into<String>,
        route_prefix: &str,
        max_file_size: &str,
        chunk_size_bytes: usize,
        max_label_len: usize,
    ) -> Result<Self> {
        let bucket_name = bucket_name.into();
        if bucket_name.trim().is_empty() {
            bail!("bucket name must not be empty");
        }
        if chunk_size_bytes == 0 {
            bail!("chunk size must be greater than zero");
        }
        let max_file_size_bytes = parse_size(max_file_size)
            .with_context(|| format!("parsing max file size `{}`", max_file_size))?;

        Ok(Self {
            bucket_name,
            route_prefix: normalize_prefix(route_prefix)?,
            max_file_size: max_file_size.to_string(),
            max_file_size_bytes,
            chunk_size_bytes,
            max_label_len,
            ..Self::default()
        })
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Content admin backend with a chunked image store")]
pub struct Args {
    /// Host to bind to (overrides CONTENT_ADMIN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CONTENT_ADMIN_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CONTENT_ADMIN_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for spooled uploads (overrides CONTENT_ADMIN_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Bucket name of the object store (overrides CONTENT_ADMIN_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Route prefix the object store is mounted at (overrides CONTENT_ADMIN_ROUTE_PREFIX)
    #[arg(long)]
    pub route_prefix: Option<String>,

    /// Upload ceiling such as `5MB` (overrides CONTENT_ADMIN_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<String>,

    /// Chunk size in bytes (overrides CONTENT_ADMIN_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum label length in characters (overrides CONTENT_ADMIN_MAX_LABEL_LEN)
    #[arg(long)]
    pub max_label_len: Option<usize>,

    /// Public origin for object URLs (overrides CONTENT_ADMIN_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Bearer token lifetime in seconds (overrides CONTENT_ADMIN_TOKEN_TTL_SECS)
    #[arg(long)]
    pub token_ttl_secs: Option<u64>,

    /// Minimum orphan age before reconciliation removes it (overrides CONTENT_ADMIN_ORPHAN_GRACE_SECS)
    #[arg(long)]
    pub orphan_grace_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed CLI args over the environment over defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        let host = args.host.unwrap_or(env_or("CONTENT_ADMIN_HOST", "0.0.0.0"));
        let port = pick(args.port, "CONTENT_ADMIN_PORT", 5000)?;
        let database_url = args.database_url.unwrap_or(env_or(
            "CONTENT_ADMIN_DATABASE_URL",
            "sqlite://./data/meta/content_admin.db",
        ));
        let upload_dir = args
            .upload_dir
            .unwrap_or_else(|| env_or("CONTENT_ADMIN_UPLOAD_DIR", "./data/uploads").into());
        let public_base_url = args
            .public_base_url
            .or_else(|| env::var("CONTENT_ADMIN_PUBLIC_BASE_URL").ok())
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let token_ttl_secs = pick(args.token_ttl_secs, "CONTENT_ADMIN_TOKEN_TTL_SECS", 3600)?;
        if token_ttl_secs > MAX_TOKEN_TTL_SECS {
            bail!(
                "token TTL of {}s exceeds the maximum of {}s",
                token_ttl_secs,
                MAX_TOKEN_TTL_SECS
            );
        }

        let bucket = args.bucket.unwrap_or(env_or("CONTENT_ADMIN_BUCKET", "image"));
        let prefix = args
            .route_prefix
            .unwrap_or(env_or("CONTENT_ADMIN_ROUTE_PREFIX", "/image"));
        let max_file_size = args
            .max_file_size
            .unwrap_or(env_or("CONTENT_ADMIN_MAX_FILE_SIZE", "5MB"));
        let chunk_size = pick(
            args.chunk_size,
            "CONTENT_ADMIN_CHUNK_SIZE",
            DEFAULT_CHUNK_SIZE_BYTES,
        )?;
        let max_label_len = pick(
            args.max_label_len,
            "CONTENT_ADMIN_MAX_LABEL_LEN",
            DEFAULT_MAX_LABEL_LEN,
        )?;
        let orphan_grace_secs =
            pick(args.orphan_grace_secs, "CONTENT_ADMIN_ORPHAN_GRACE_SECS", 3600)?;

        let mut objects =
            ObjectStoreConfig::new(bucket, &prefix, &max_file_size, chunk_size, max_label_len)?;
        objects.orphan_grace = Duration::from_secs(orphan_grace_secs);

        Ok(Self {
            host,
            port,
            database_url,
            upload_dir,
            public_base_url,
            token_ttl: Duration::from_secs(token_ttl_secs),
            objects,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

/// CLI value, else parsed environment value, else `default`.
fn pick<T>(cli: Option<T>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

/// `image`, `/image/` and `/image` all become `/image`.
fn normalize_prefix(prefix: &str) -> Result<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        bail!("route prefix must name at least one path segment");
    }
    if trimmed.contains(['{', '}', '*']) {
        bail!("route prefix `{}` must not contain route parameters", prefix);
    }
    Ok(format!("/{}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("image").unwrap(), "/image");
        assert_eq!(normalize_prefix("/slider/").unwrap(), "/slider");
        assert_eq!(normalize_prefix("/api/images").unwrap(), "/api/images");
        assert!(normalize_prefix("/").is_err());
        assert!(normalize_prefix("/{bucket}").is_err());
    }

    #[test]
    fn object_store_config_parses_size() {
        let cfg = ObjectStoreConfig::new("slider", "/slider", "2kb", 512, 100).unwrap();
        assert_eq!(cfg.max_file_size_bytes, 2048);
        assert_eq!(cfg.max_file_size, "2kb");
        assert_eq!(cfg.allowed_extensions.len(), 6);
    }

    #[test]
    fn object_store_config_rejects_bad_values() {
        assert!(ObjectStoreConfig::new("image", "/image", "5 MB", 1024, 10).is_err());
        assert!(ObjectStoreConfig::new("image", "/image", "5MB", 0, 10).is_err());
        assert!(ObjectStoreConfig::new(" ", "/image", "5MB", 1024, 10).is_err());
    }

    #[test]
    fn token_ttl_is_bounded() {
        let too_long = AppConfig::from_args(Args {
            token_ttl_secs: Some(10u64.pow(15)),
            ..Args::default()
        });
        assert!(too_long.is_err());

        let cfg = AppConfig::from_args(Args {
            token_ttl_secs: Some(MAX_TOKEN_TTL_SECS),
            ..Args::default()
        })
        .unwrap();
        assert_eq!(cfg.token_ttl, Duration::from_secs(MAX_TOKEN_TTL_SECS));
    }

    #[test]
    fn cli_values_win() {
        let cfg = AppConfig::from_args(Args {
            port: Some(8080),
            bucket: Some("slider".into()),
            route_prefix: Some("slider".into()),
            max_file_size: Some("1MB".into()),
            chunk_size: Some(4096),
            ..Args::default()
        })
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.objects.bucket_name, "slider");
        assert_eq!(cfg.objects.route_prefix, "/slider");
        assert_eq!(cfg.objects.max_file_size_bytes, 1024 * 1024);
        assert_eq!(cfg.objects.chunk_size_bytes, 4096);
    }
}
