use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Which object-store implementation backs file payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Payloads on local disk, signed URLs served by this process.
    Local,
    /// Payloads in an S3 bucket, signed URLs presigned by the SDK.
    S3,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "s3" => Ok(Backend::S3),
            other => bail!("unknown backend `{}` (expected `local` or `s3`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub backend: Backend,
    pub storage_dir: String,
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub public_url: String,
    pub signing_secret: String,
    pub max_upload_bytes: usize,
    pub compensate_orphans: bool,
    /// Browser origins allowed by CORS; empty allows any origin.
    pub cors_origins: Vec<String>,
}

// Secrets stay out of the startup log line.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("public_url", &self.public_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("compensate_orphans", &self.compensate_orphans)
            .field("cors_origins", &self.cors_origins)
            .finish_non_exhaustive()
    }
}

/// One-shot modes that run instead of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Migrate,
    IssueToken(String),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Authenticated file storage API")]
pub struct Args {
    /// Host to bind to (overrides FILEBOX_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEBOX_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Metadata database URL (overrides FILEBOX_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// HS256 secret for bearer tokens (overrides FILEBOX_JWT_SECRET)
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// Object-store backend (overrides FILEBOX_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory for the local backend (overrides FILEBOX_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Bucket name (overrides FILEBOX_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 region (overrides FILEBOX_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3 endpoint, e.g. a MinIO server (overrides FILEBOX_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Externally visible base URL used in local signed URLs (overrides FILEBOX_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Secret for local signed URLs (overrides FILEBOX_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Maximum accepted upload body in bytes (overrides FILEBOX_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Delete the stored object when the metadata insert fails (overrides FILEBOX_COMPENSATE_ORPHANS)
    #[arg(long)]
    pub compensate_orphans: bool,

    /// Comma-separated CORS origins (overrides FILEBOX_CORS_ORIGINS)
    #[arg(long, value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Print a bearer token for the given user id and exit
    #[arg(long, value_name = "USER_ID")]
    pub issue_token: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        let args = Args::parse();
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge parsed arguments over values looked up through `lookup`.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, Mode)> {
        let env_host = lookup("FILEBOX_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "FILEBOX_PORT")?.unwrap_or(5000);
        let env_db = lookup("FILEBOX_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/filebox.db".into());
        let env_backend = parse_var(&lookup, "FILEBOX_BACKEND")?.unwrap_or(Backend::Local);
        let env_storage =
            lookup("FILEBOX_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_bucket = lookup("FILEBOX_BUCKET").unwrap_or_else(|| "filebox".into());
        let env_region = lookup("FILEBOX_REGION").unwrap_or_else(|| "us-east-1".into());
        let env_max_upload =
            parse_var(&lookup, "FILEBOX_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let env_compensate = parse_var(&lookup, "FILEBOX_COMPENSATE_ORPHANS")?.unwrap_or(false);
        let env_cors: Vec<String> = lookup("FILEBOX_CORS_ORIGINS")
            .map(|value| value.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);

        let jwt_secret = args
            .jwt_secret
            .or_else(|| lookup("FILEBOX_JWT_SECRET"))
            .filter(|secret| !secret.is_empty())
            .context("a JWT secret is required (--jwt-secret or FILEBOX_JWT_SECRET)")?;
        let signing_secret = args
            .signing_secret
            .or_else(|| lookup("FILEBOX_SIGNING_SECRET"))
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(|| jwt_secret.clone());
        let public_url = args
            .public_url
            .or_else(|| lookup("FILEBOX_PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let cfg = Self {
            host,
            port,
            database_url: args.database_url.unwrap_or(env_db),
            jwt_secret,
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            bucket: args.bucket.unwrap_or(env_bucket),
            region: args.region.unwrap_or(env_region),
            endpoint_url: args.endpoint_url.or_else(|| lookup("FILEBOX_ENDPOINT_URL")),
            public_url: public_url.trim_end_matches('/').to_string(),
            signing_secret,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            compensate_orphans: args.compensate_orphans || env_compensate,
            cors_origins: args
                .cors_origins
                .unwrap_or(env_cors)
                .into_iter()
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        };

        let mode = if args.migrate {
            Mode::Migrate
        } else if let Some(user) = args.issue_token {
            Mode::IssueToken(user)
        } else {
            Mode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", name, value, err)),
        None => Ok(None),
    }
}
