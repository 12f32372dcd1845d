use crate::logic::epss_api_client::EPSSAPIClient;
use crate::logic::epss_api_structs::{ScoreDelta, ScoreRecord};
use crate::logic::error::EPSSError;
use crate::logic::interface::{self, DeltaStrategy, ThresholdField};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

pub const DEFAULT_BASE_URL: &str = "https://api.first.org/data/v1/epss";

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("'{}' is not a YYYY-MM-DD date: {}", s, e))
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if !value.is_finite() {
        return Err(format!("'{}' is not a finite number", s));
    }
    Ok(value)
}

/// EPSS CLI tool for CVE vulnerability scoring
#[derive(Parser, Debug)]
#[command(name = "epss", version, about = "EPSS CLI tool for CVE vulnerability scoring")]
pub struct Cli {
    /// EPSS API endpoint
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Print one JSON object per line instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Get EPSS score for a CVE
    Score {
        /// CVE ID (e.g., CVE-2020-23151)
        #[arg(long)]
        cve: String,

        /// Date in YYYY-MM-DD format (default: latest)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Get the top N CVEs by EPSS score
    #[command(alias = "topn")]
    Top {
        /// Number of top CVEs
        #[arg(long, alias = "n")]
        limit: usize,
    },

    /// Get the highest increases in EPSS score
    Highest {
        /// Number of days to look back
        #[arg(long)]
        days: u32,

        /// Number of highest increases to return
        #[arg(long)]
        limit: usize,

        /// How an increase is measured across the window
        #[arg(long, value_enum, default_value_t = StrategyArg::Literal)]
        strategy: StrategyArg,
    },

    /// Get all CVEs scored on a specific date
    Date {
        /// Date in YYYY-MM-DD format
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Get time series data for a CVE
    Timeseries {
        /// CVE ID
        #[arg(long)]
        cve: String,
    },

    /// Get CVEs above a specific threshold
    Threshold {
        /// Threshold value
        #[arg(long, value_parser = parse_threshold)]
        threshold: f64,

        /// Field to check
        #[arg(long, value_enum)]
        field: FieldArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldArg {
    #[value(alias = "epss")]
    Score,
    Percentile,
}

impl From<FieldArg> for ThresholdField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Score => ThresholdField::Score,
            FieldArg::Percentile => ThresholdField::Percentile,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    /// Seed with the first score, keep the larger of slot and rise over slot
    Literal,
    /// Largest rise over the first observed score
    FirstSeen,
}

impl From<StrategyArg> for DeltaStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Literal => DeltaStrategy::Literal,
            StrategyArg::FirstSeen => DeltaStrategy::FirstSeen,
        }
    }
}

fn record_line(record: &ScoreRecord, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string(record)?);
    }

    Ok(format!(
        "CVE ID: {}, EPSS Score: {:.6}, Percentile: {:.6}, Date: {}",
        record.id, record.score, record.percentile, record.date
    ))
}

fn delta_line(delta: &ScoreDelta, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string(delta)?);
    }

    Ok(format!(
        "CVE ID: {}, Date: {}, Score Change: {:.6}",
        delta.id,
        delta.date.format("%Y-%m-%d %H:%M:%S"),
        delta.delta
    ))
}

fn score_block(record: &ScoreRecord, json: bool) -> Result<String> {
    if json {
        return record_line(record, json);
    }

    Ok(format!(
        "CVE ID: {}\nEPSS Score: {:.6}\nPercentile: {:.6}\nDate: {}",
        record.id, record.score, record.percentile, record.date
    ))
}

fn print_records(records: &[ScoreRecord], json: bool) -> Result<()> {
    for record in records {
        println!("{}", record_line(record, json)?);
    }
    Ok(())
}

pub async fn run(cli: Cli) -> Result<()> {
    let client = EPSSAPIClient::new(cli.base_url);
    let json = cli.json;

    match cli.command {
        Commands::Score { cve, date } => {
            let record = interface::cve_score(&client, &cve, date)
                .await
                .context("failed to get CVE score")?;
            println!("{}", score_block(&record, json)?);
        }
        Commands::Top { limit } => {
            let records = interface::top_cves(&client, limit)
                .await
                .context("failed to get top N CVEs")?;
            print_records(&records, json)?;
        }
        Commands::Highest { days, limit, strategy } => {
            let strategy = DeltaStrategy::from(strategy);
            tracing::info!("Ranking score increases over {} days using the {} strategy", days, strategy);

            let deltas = interface::highest_increases(&client, days, limit, strategy)
                .await
                .context("failed to get highest increases")?;
            for delta in &deltas {
                println!("{}", delta_line(delta, json)?);
            }
        }
        Commands::Date { date } => {
            let records = interface::cves_for_date(&client, date)
                .await
                .context("failed to get CVEs for date")?;
            print_records(&records, json)?;
        }
        Commands::Timeseries { cve } => {
            let records = interface::time_series(&client, &cve)
                .await
                .context("failed to get time series for CVE")?;
            print_records(&records, json)?;
        }
        Commands::Threshold { threshold, field } => {
            let records = interface::cves_above_threshold(&client, threshold, field.into())
                .await
                .context("failed to get CVEs above threshold")?;
            print_records(&records, json)?;
        }
    }

    Ok(())
}

/// Lookups that matched nothing get a plain message; everything else is
/// logged with its full context chain.
pub fn report_failure(error: &anyhow::Error) {
    match error.downcast_ref::<EPSSError>() {
        Some(e) if e.is_not_found() => eprintln!("{}", e),
        _ => tracing::error!("{:#}", error),
    }
}
