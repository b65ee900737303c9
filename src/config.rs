use crate::services::sigv4::Credentials;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, net::SocketAddr, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables (optionally from `.env`) and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub bucket: String,
    /// Remote S3-compatible endpoint; the on-disk store is used when unset.
    pub object_store_endpoint: Option<String>,
    /// Signing region for the remote store.
    pub region: String,
    /// Remote store credentials; requests go unsigned when absent.
    pub credentials: Option<Credentials>,
    pub storage_dir: String,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    /// Prometheus scrape listener; metrics are not exported when unset.
    pub metrics_addr: Option<SocketAddr>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File registry API backed by SQLite and an object store")]
pub struct Args {
    /// Host to bind to (overrides FILE_REGISTRY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_REGISTRY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides FILE_REGISTRY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store bucket (overrides FILE_REGISTRY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3-compatible endpoint URL (overrides FILE_REGISTRY_OBJECT_STORE_ENDPOINT)
    #[arg(long)]
    pub object_store_endpoint: Option<String>,

    /// Remote store signing region (overrides FILE_REGISTRY_REGION / AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Directory for the on-disk object store (overrides FILE_REGISTRY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Object store request timeout in seconds (overrides FILE_REGISTRY_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Largest accepted upload body (overrides FILE_REGISTRY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Prometheus listen address, e.g. 0.0.0.0:9000 (overrides FILE_REGISTRY_METRICS_ADDR)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, Self::from_env()?);
        Ok((cfg, migrate))
    }

    /// Environment values with defaults applied.
    fn from_env() -> Result<Self> {
        let endpoint = non_empty_env("FILE_REGISTRY_OBJECT_STORE_ENDPOINT");
        let metrics_addr = match non_empty_env("FILE_REGISTRY_METRICS_ADDR") {
            Some(addr) => Some(
                addr.parse()
                    .with_context(|| format!("parsing FILE_REGISTRY_METRICS_ADDR `{}`", addr))?,
            ),
            None => None,
        };

        Ok(Self {
            host: env::var("FILE_REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("FILE_REGISTRY_PORT", 8080)?,
            database_url: env::var("FILE_REGISTRY_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/meta/file_registry.db".into()),
            bucket: env::var("FILE_REGISTRY_BUCKET").unwrap_or_else(|_| "file-registry".into()),
            object_store_endpoint: endpoint,
            region: non_empty_env("FILE_REGISTRY_REGION")
                .or_else(|| non_empty_env("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            credentials: credentials_from(
                non_empty_env("AWS_ACCESS_KEY_ID"),
                non_empty_env("AWS_SECRET_ACCESS_KEY"),
                non_empty_env("AWS_SESSION_TOKEN"),
            )?,
            storage_dir: env::var("FILE_REGISTRY_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/objects".into()),
            request_timeout: Duration::from_secs(parse_env(
                "FILE_REGISTRY_REQUEST_TIMEOUT_SECS",
                30,
            )?),
            max_upload_bytes: parse_env("FILE_REGISTRY_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            metrics_addr,
        })
    }

    /// CLI flags win over environment values.
    fn merge(args: Args, env_cfg: Self) -> Self {
        Self {
            host: args.host.unwrap_or(env_cfg.host),
            port: args.port.unwrap_or(env_cfg.port),
            database_url: args.database_url.unwrap_or(env_cfg.database_url),
            bucket: args.bucket.unwrap_or(env_cfg.bucket),
            object_store_endpoint: args.object_store_endpoint.or(env_cfg.object_store_endpoint),
            region: args.region.unwrap_or(env_cfg.region),
            credentials: env_cfg.credentials,
            storage_dir: args.storage_dir.unwrap_or(env_cfg.storage_dir),
            request_timeout: args
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(env_cfg.request_timeout),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_cfg.max_upload_bytes),
            metrics_addr: args.metrics_addr.or(env_cfg.metrics_addr),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Static credentials, in the standard AWS variables. Both halves of the
/// key pair must be present, or neither.
fn credentials_from(
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
) -> Result<Option<Credentials>> {
    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Credentials {
            access_key_id,
            secret_access_key,
            session_token,
        })),
        (None, None) => Ok(None),
        _ => bail!("AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together"),
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
