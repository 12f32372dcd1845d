use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Days, Local, NaiveDate};

use super::epss_api_client::ScoreSource;
use super::epss_api_structs::{ScoreDelta, ScoreRecord};
use super::error::{EPSSError, EPSSResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Record field a threshold query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdField {
    Score,
    Percentile,
}

impl ThresholdField {
    /// Name the API uses for the field in `<field>-gt`.
    pub fn api_name(self) -> &'static str {
        match self {
            ThresholdField::Score => "epss",
            ThresholdField::Percentile => "percentile",
        }
    }

    fn value_of(self, record: &ScoreRecord) -> f64 {
        match self {
            ThresholdField::Score => record.score,
            ThresholdField::Percentile => record.percentile,
        }
    }
}

/// How a CVE's increase is measured across the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeltaStrategy {
    /// One slot per CVE, seeded with the first raw score and replaced by
    /// `current - slot` whenever that is larger. Matches the historical tool.
    #[default]
    Literal,
    /// Largest `current - first_seen` over the window; zero for a CVE seen once.
    FirstSeen,
}

impl fmt::Display for DeltaStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeltaStrategy::Literal => write!(f, "literal"),
            DeltaStrategy::FirstSeen => write!(f, "first-seen"),
        }
    }
}

enum Tracker {
    Literal(f64),
    FirstSeen { first: f64, max_delta: f64 },
}

impl Tracker {
    fn seed(strategy: DeltaStrategy, score: f64) -> Tracker {
        match strategy {
            DeltaStrategy::Literal => Tracker::Literal(score),
            DeltaStrategy::FirstSeen => Tracker::FirstSeen { first: score, max_delta: 0.0 },
        }
    }

    fn observe(&mut self, score: f64) {
        match self {
            Tracker::Literal(slot) => {
                let change = score - *slot;
                if change > *slot {
                    *slot = change;
                }
            }
            Tracker::FirstSeen { first, max_delta } => {
                let change = score - *first;
                if change > *max_delta {
                    *max_delta = change;
                }
            }
        }
    }

    fn delta(&self) -> f64 {
        match self {
            Tracker::Literal(slot) => *slot,
            Tracker::FirstSeen { max_delta, .. } => *max_delta,
        }
    }
}

pub async fn cve_score(source: &impl ScoreSource, cve: &str, date: Option<NaiveDate>) -> EPSSResult<ScoreRecord> {
    let mut params = vec![("cve", cve.to_owned())];
    if let Some(date) = date {
        params.push(("date", date.format(DATE_FORMAT).to_string()));
    }

    let records = source.fetch(&params).await?;

    match records.into_iter().next() {
        Some(record) => Ok(record),
        None => Err(EPSSError::NotFound(match date {
            Some(date) => format!("no EPSS score found for {} on {}", cve, date.format(DATE_FORMAT)),
            None => format!("no EPSS score found for {}", cve),
        })),
    }
}

pub async fn top_cves(source: &impl ScoreSource, n: usize) -> EPSSResult<Vec<ScoreRecord>> {
    source
        .fetch(&[("order", "!epss".to_owned()), ("limit", n.to_string())])
        .await
}

pub async fn cves_above_threshold(source: &impl ScoreSource, threshold: f64, field: ThresholdField) -> EPSSResult<Vec<ScoreRecord>> {
    let key = format!("{}-gt", field.api_name());
    let mut records = source.fetch(&[(key.as_str(), threshold.to_string())]).await?;

    records.retain(|record| field.value_of(record) > threshold);
    Ok(records)
}

pub async fn cves_for_date(source: &impl ScoreSource, date: NaiveDate) -> EPSSResult<Vec<ScoreRecord>> {
    source
        .fetch(&[("date", date.format(DATE_FORMAT).to_string())])
        .await
}

pub async fn time_series(source: &impl ScoreSource, cve: &str) -> EPSSResult<Vec<ScoreRecord>> {
    source
        .fetch(&[("cve", cve.to_owned()), ("scope", "time-series".to_owned())])
        .await
}

/// Folds per-day listings (oldest first) into the `limit` largest increases.
pub fn rank_increases(
    days: impl IntoIterator<Item = Vec<ScoreRecord>>,
    limit: usize,
    strategy: DeltaStrategy,
    as_of: DateTime<Local>,
) -> Vec<ScoreDelta> {
    let mut trackers: HashMap<String, Tracker> = HashMap::new();

    for day in days {
        for record in day {
            trackers
                .entry(record.id)
                .and_modify(|tracker| tracker.observe(record.score))
                .or_insert_with(|| Tracker::seed(strategy, record.score));
        }
    }

    let mut deltas: Vec<ScoreDelta> = trackers
        .into_iter()
        .map(|(id, tracker)| ScoreDelta {
            id,
            date: as_of,
            delta: tracker.delta(),
        })
        .collect();

    deltas.sort_by(|a, b| b.delta.total_cmp(&a.delta).then_with(|| a.id.cmp(&b.id)));
    deltas.truncate(limit);
    deltas
}

/// Fetches each day from `today - days` through `today`, one request at a
/// time, and ranks the increases. The first failing day aborts the window.
pub async fn highest_increases_until(
    source: &impl ScoreSource,
    today: NaiveDate,
    days: u32,
    limit: usize,
    strategy: DeltaStrategy,
    as_of: DateTime<Local>,
) -> EPSSResult<Vec<ScoreDelta>> {
    let start = today
        .checked_sub_days(Days::new(u64::from(days)))
        .ok_or_else(|| EPSSError::Validation(format!("failed to get date {} days before {}", days, today)))?;

    let mut listings = Vec::with_capacity(days as usize + 1);
    for offset in 0..=days {
        let date = start
            .checked_add_days(Days::new(u64::from(offset)))
            .ok_or_else(|| EPSSError::Validation(format!("failed to get date {} days after {}", offset, start)))?;

        let records = cves_for_date(source, date).await?;
        tracing::debug!("Fetched {} records for {}", records.len(), date);
        listings.push(records);
    }

    Ok(rank_increases(listings, limit, strategy, as_of))
}

pub async fn highest_increases(source: &impl ScoreSource, days: u32, limit: usize, strategy: DeltaStrategy) -> EPSSResult<Vec<ScoreDelta>> {
    let now = Local::now();
    highest_increases_until(source, now.date_naive(), days, limit, strategy, now).await
}
