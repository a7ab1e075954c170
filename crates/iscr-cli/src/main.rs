mod config;
mod pipeline;
mod summary;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use iscr_ai::{Classifier, OpenAiChat};
use iscr_core::ArchiveYear;
use iscr_extract::{Extractor, PdfExtractBackend};
use iscr_fetch::{Fetcher, HttpSource, YearLink};
use iscr_store::{CacheLayout, ManifestStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::{Cli, Command, ConfigError, GlobalArgs, RunArgs, RunConfig};
use pipeline::{Orchestrator, RunError, RunOptions};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` never overrides variables already set in the process.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    tracing::debug!("iscr v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Command::Years => cmd_years(&cli.global).await,
        Command::Status { year } => cmd_status(&cli.global, year),
        Command::Run(args) => cmd_run(&cli.global, &args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            eprintln!("configuration error: {e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn fetcher(layout: CacheLayout, archive_url: &str, timeout: Duration) -> anyhow::Result<Fetcher> {
    let source = HttpSource::new(timeout)?;
    Ok(Fetcher::new(Arc::new(source), layout, archive_url)?)
}

async fn cmd_years(global: &GlobalArgs) -> anyhow::Result<()> {
    let layout = CacheLayout::new(&global.data_dir);
    let timeout = Duration::from_secs(global.timeout_secs);
    let years = fetcher(layout, &global.archive_url, timeout)?
        .list_years()
        .await
        .context("listing archive years")?;
    print!("{}", summary::render_years(&years));
    Ok(())
}

fn cmd_status(global: &GlobalArgs, year: i32) -> anyhow::Result<()> {
    let year = ArchiveYear::new(year).map_err(ConfigError::from)?;
    let manifest = ManifestStore::new(CacheLayout::new(&global.data_dir))
        .load(year.get())
        .context("reading run manifest")?;
    if manifest.is_empty() {
        println!("No run recorded for {year}.");
    } else {
        print!("{}", summary::render_status(&manifest));
    }
    Ok(())
}

/// Ask the user to pick one of the published years.
fn prompt_year(years: &[YearLink]) -> Result<ArchiveYear, ConfigError> {
    if years.is_empty() {
        return Err(ConfigError::YearPrompt("the archive lists no years".into()));
    }
    let labels: Vec<String> = years.iter().map(|y| y.year.to_string()).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Which year should be processed?")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| ConfigError::YearPrompt(e.to_string()))?;
    Ok(ArchiveYear::new(years[selection].year)?)
}

async fn cmd_run(global: &GlobalArgs, args: &RunArgs) -> anyhow::Result<()> {
    let config = RunConfig::from_args(global, args)?;
    let layout = CacheLayout::new(&config.data_dir);
    let fetcher = fetcher(layout.clone(), &config.archive_url, config.timeout)?
        .with_retry(config.fetch_retry);

    let year = match config.year {
        Some(year) => year,
        None => {
            let years = fetcher.list_years().await.context("listing archive years")?;
            prompt_year(&years)?
        }
    };

    let model = OpenAiChat::new(
        config.llm.endpoint.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm.max_output_tokens,
        config.llm.timeout,
    )?;
    let classifier = Classifier::new(
        Arc::new(model),
        config.taxonomy.clone(),
        config.classifier.clone(),
    );
    let extractor = Extractor::new(Arc::new(PdfExtractBackend));
    let orchestrator = Orchestrator::new(fetcher, extractor, classifier, layout);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupt received; finishing in-flight cases...");
            on_signal.cancel();
        }
    });

    eprintln!(
        "  Processing {year} with {} (concurrency {})",
        config.llm.model, config.concurrency
    );
    let start = Instant::now();
    let opts = RunOptions {
        year: year.get(),
        force: config.force,
        limit: config.limit,
        concurrency: config.concurrency,
    };
    let report = match orchestrator.run(&opts, &cancel).await {
        Ok(report) => report,
        Err(RunError::InvalidYear(e)) => return Err(ConfigError::from(e).into()),
        Err(RunError::Unauthorized(detail)) => {
            return Err(ConfigError::ApiKeyRejected(detail).into());
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", summary::render_report(&report));
    eprintln!("  Done in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_year_list_cannot_be_prompted() {
        assert!(matches!(prompt_year(&[]), Err(ConfigError::YearPrompt(_))));
    }
}
