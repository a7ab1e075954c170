//! Command-line and environment configuration.
//!
//! Every tunable is a flag with an environment fallback; `.env` is loaded
//! before parsing. [`RunConfig::from_args`] validates everything that can be
//! checked without touching the network.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use iscr_ai::{ClassifierConfig, DEFAULT_ENDPOINT, Taxonomy};
use iscr_core::{ArchiveYear, InvalidYear, RetryPolicy};
use iscr_fetch::DEFAULT_ARCHIVE_URL;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "iscr", version, about = "Ingest and classify ISCR hearing decisions")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Root of the cache and output directories.
    #[arg(long, env = "ISCR_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Archive root page listing the decision years.
    #[arg(long, env = "ISCR_ARCHIVE_URL", default_value = DEFAULT_ARCHIVE_URL, global = true)]
    pub archive_url: String,

    /// Per-request timeout for archive and LLM requests.
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the years published on the archive.
    Years,

    /// Show manifest counts and failed cases for a year.
    Status {
        #[arg(long)]
        year: i32,
    },

    /// Fetch, extract, and classify a year's decisions.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Archive year; prompts with the published years if omitted.
    #[arg(long)]
    pub year: Option<i32>,

    /// Re-run every case and replace existing rows.
    #[arg(long)]
    pub force: bool,

    /// Process at most N cases (0 = all).
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    #[arg(long, env = "ISCR_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    #[arg(long, default_value_t = 3)]
    pub fetch_attempts: u32,

    #[arg(long, env = "LLM_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub llm_endpoint: String,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    #[arg(long, env = "LLM_RPM", default_value_t = 30)]
    pub requests_per_minute: u32,

    #[arg(long, default_value_t = 3000)]
    pub max_input_tokens: usize,

    #[arg(long, default_value_t = 512)]
    pub max_output_tokens: u32,

    /// Corrective follow-ups after a reply that fails validation.
    #[arg(long, default_value_t = 2)]
    pub schema_retries: u32,

    /// Replacement guideline list, one `Letter|Name` per line.
    #[arg(long)]
    pub guidelines_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no LLM API key: set LLM_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,

    #[error("LLM API key was rejected: {0}")]
    ApiKeyRejected(String),

    #[error("--{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid URL for --{flag}: {url}")]
    InvalidUrl { flag: &'static str, url: String },

    #[error(transparent)]
    InvalidYear(#[from] InvalidYear),

    #[error("{0}")]
    Guidelines(String),

    #[error("no year selected: {0}")]
    YearPrompt(String),
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

/// Validated settings for `iscr run`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub archive_url: String,
    pub timeout: Duration,
    pub year: Option<ArchiveYear>,
    pub force: bool,
    pub limit: Option<usize>,
    pub concurrency: usize,
    pub fetch_retry: RetryPolicy,
    pub llm: LlmConfig,
    pub classifier: ClassifierConfig,
    pub taxonomy: Taxonomy,
}

fn api_key_from_env() -> Option<String> {
    ["LLM_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

fn check_url(flag: &'static str, url: &str) -> Result<(), ConfigError> {
    let ok = url.starts_with("http://") || url.starts_with("https://");
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            flag,
            url: url.to_string(),
        })
    }
}

fn non_zero(flag: &'static str, value: u32) -> Result<NonZeroU32, ConfigError> {
    NonZeroU32::new(value).ok_or(ConfigError::Zero(flag))
}

impl RunConfig {
    pub fn from_args(global: &GlobalArgs, args: &RunArgs) -> Result<Self, ConfigError> {
        Self::build(global, args, api_key_from_env())
    }

    fn build(
        global: &GlobalArgs,
        args: &RunArgs,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.ok_or(ConfigError::MissingApiKey)?;
        check_url("archive-url", &global.archive_url)?;
        check_url("llm-endpoint", &args.llm_endpoint)?;

        if args.concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if args.max_input_tokens == 0 {
            return Err(ConfigError::Zero("max-input-tokens"));
        }
        non_zero("max-output-tokens", args.max_output_tokens)?;
        non_zero("fetch-attempts", args.fetch_attempts)?;
        non_zero("timeout-secs", u32::try_from(global.timeout_secs).unwrap_or(u32::MAX))?;
        let requests_per_minute = non_zero("requests-per-minute", args.requests_per_minute)?;

        let year = args.year.map(ArchiveYear::new).transpose()?;
        let taxonomy = match &args.guidelines_file {
            Some(path) => {
                Taxonomy::from_file(path).map_err(|e| ConfigError::Guidelines(e.to_string()))?
            }
            None => Taxonomy::sead4(),
        };
        let timeout = Duration::from_secs(global.timeout_secs);

        Ok(Self {
            data_dir: global.data_dir.clone(),
            archive_url: global.archive_url.clone(),
            timeout,
            year,
            force: args.force,
            limit: (args.limit > 0).then_some(args.limit),
            concurrency: args.concurrency,
            fetch_retry: RetryPolicy::new(args.fetch_attempts, Duration::from_secs(1)),
            llm: LlmConfig {
                endpoint: args.llm_endpoint.clone(),
                model: args.llm_model.clone(),
                api_key,
                max_output_tokens: args.max_output_tokens,
                timeout,
            },
            classifier: ClassifierConfig {
                max_input_tokens: args.max_input_tokens,
                schema_retries: args.schema_retries,
                requests_per_minute,
                ..ClassifierConfig::default()
            },
            taxonomy,
        })
    }
}
