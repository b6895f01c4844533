use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::enrich::{tracing_observer, EnrichOptions, Enricher};
use crate::errors::{AppError, AppResult};
use crate::geocode::GeocodingService;
use crate::pipeline::{GeocodeJob, JobSummary};

#[derive(Parser, Debug)]
#[command(name = "icewatch")]
#[command(about = "Geocode ICE detention facility statistics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Geocode a facilities JSON file, reusing an on-disk coordinate cache
    Geocode(GeocodeArgs),
}

#[derive(clap::Args, Debug)]
pub struct GeocodeArgs {
    /// Input facilities JSON file
    #[arg(long)]
    pub input: PathBuf,

    /// Output JSON file (default: facilities_geocoded_TIMESTAMP.json next to the input)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Geocode cache file (default: geocode_cache.json next to the input)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Seconds to wait between provider requests (default: 2)
    #[arg(long, value_parser = parse_delay)]
    pub delay: Option<f64>,

    /// Look up every address again instead of trusting cached coordinates
    #[arg(long)]
    pub refresh: bool,
}

fn parse_delay(value: &str) -> Result<f64, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    if secs.is_finite() && secs >= 0.0 {
        Ok(secs)
    } else {
        Err(format!("delay must be a non-negative number, got {value}"))
    }
}

pub async fn run(cli: Cli, config: &AppConfig) -> AppResult<()> {
    match cli.command {
        Command::Geocode(args) => {
            let summary = geocode(args, config).await?;
            info!(
                total = summary.stats.total,
                cache_hits = summary.stats.cache_hits,
                provider_calls = summary.stats.provider_calls,
                resolved = summary.stats.resolved,
                unresolved = summary.stats.unresolved,
                skipped = summary.stats.skipped,
                "done"
            );
            Ok(())
        }
    }
}

pub async fn geocode(args: GeocodeArgs, config: &AppConfig) -> AppResult<JobSummary> {
    let delay = match args.delay {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|err| AppError::Config(format!("invalid delay {secs}: {err}")))?,
        None => config.request_delay(),
    };
    let options = EnrichOptions {
        delay,
        refresh: args.refresh,
    };
    let geocoder = GeocodingService::from_config(config)?;
    let enricher = Enricher::new(geocoder, options).with_observer(tracing_observer());

    let job = GeocodeJob {
        input: args.input,
        output: args.output,
        cache: args.cache,
    };
    job.run(&enricher).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verifies_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_geocode_flags() {
        let cli = Cli::try_parse_from([
            "icewatch",
            "geocode",
            "--input",
            "data/ice.json",
            "--cache",
            "data/cache.json",
            "--delay",
            "0.5",
            "--refresh",
        ])
        .unwrap();
        let Command::Geocode(args) = cli.command;
        assert_eq!(args.input, PathBuf::from("data/ice.json"));
        assert_eq!(args.cache, Some(PathBuf::from("data/cache.json")));
        assert_eq!(args.output, None);
        assert_eq!(args.delay, Some(0.5));
        assert!(args.refresh);
    }

    #[test]
    fn rejects_negative_delay() {
        let result = Cli::try_parse_from([
            "icewatch", "geocode", "--input", "x.json", "--delay", "-1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["icewatch", "geocode"]).is_err());
    }
}
