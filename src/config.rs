use crate::services::video_service::{DecodeFailurePolicy, ServiceOptions};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub max_concurrent_fetches: usize,
    pub request_timeout: Duration,
    pub decode_failure: DecodeFailurePolicy,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Video summaries API")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_SUMMARIES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_SUMMARIES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory of the object store (overrides VIDEO_SUMMARIES_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Flag store database URL (overrides VIDEO_SUMMARIES_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Concurrent object fetches per listing (overrides VIDEO_SUMMARIES_MAX_CONCURRENT_FETCHES)
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,

    /// Per-request deadline in seconds (overrides VIDEO_SUMMARIES_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// `abort` or `skip` on malformed metadata (overrides VIDEO_SUMMARIES_DECODE_FAILURE)
    #[arg(long)]
    pub decode_failure: Option<DecodeFailurePolicy>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name))?;
        Ok((cfg, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let env_host = lookup("VIDEO_SUMMARIES_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_storage =
            lookup("VIDEO_SUMMARIES_STORAGE_DIR").unwrap_or_else(|_| "./data".into());
        let env_db = lookup("VIDEO_SUMMARIES_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/video_properties.db".into());

        let port = match args.port {
            Some(port) => port,
            None => parse_env(&lookup, "VIDEO_SUMMARIES_PORT", 3000)?,
        };
        let max_concurrent_fetches = match args.max_concurrent_fetches {
            Some(n) => n,
            None => parse_env(&lookup, "VIDEO_SUMMARIES_MAX_CONCURRENT_FETCHES", 16)?,
        };
        let request_timeout_secs = match args.request_timeout_secs {
            Some(secs) => secs,
            None => parse_env(&lookup, "VIDEO_SUMMARIES_REQUEST_TIMEOUT_SECS", 30)?,
        };
        let decode_failure = match args.decode_failure {
            Some(policy) => policy,
            None => parse_env(
                &lookup,
                "VIDEO_SUMMARIES_DECODE_FAILURE",
                DecodeFailurePolicy::Abort,
            )?,
        };

        anyhow::ensure!(
            max_concurrent_fetches > 0,
            "max concurrent fetches must be at least 1"
        );
        anyhow::ensure!(request_timeout_secs > 0, "request timeout must be at least 1s");

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_concurrent_fetches,
            request_timeout: Duration::from_secs(request_timeout_secs),
            decode_failure,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            max_concurrent_fetches: self.max_concurrent_fetches,
            request_timeout: self.request_timeout,
            decode_failure: self.decode_failure,
        }
    }
}

/// Parse an optional environment value, falling back to `default` when unset.
fn parse_env<T>(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    name: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
