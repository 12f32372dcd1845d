use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::error::{EPSSError, EPSSResult};

/// Envelope returned by the EPSS API. Keys such as `status`, `total` and
/// `offset` are not needed and are skipped.
#[derive(Serialize, Deserialize)]
pub struct EPSSResponse {
    pub data: Option<Vec<EPSSEntry>>,
}

/// One element of `data`. Every field is optional on the wire so that a
/// missing one can be reported by name instead of as a generic serde error.
#[derive(Serialize, Deserialize)]
pub struct EPSSEntry {
    pub cve: Option<String>,
    pub epss: Option<String>,
    pub percentile: Option<String>,
    pub date: Option<String>,

    #[serde(rename = "time-series")]
    pub time_series: Option<Vec<EPSSPoint>>,
}

/// Historical observation nested under `time-series`; the CVE id is
/// inherited from the enclosing entry.
#[derive(Serialize, Deserialize)]
pub struct EPSSPoint {
    pub epss: Option<String>,
    pub percentile: Option<String>,
    pub date: Option<String>,
}

/// One (CVE, date) observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub id: String,
    pub score: f64,
    pub percentile: f64,
    pub date: String,
}

/// Change in score for one CVE, as of `date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreDelta {
    pub id: String,
    pub date: DateTime<Local>,
    pub delta: f64,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> EPSSResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| EPSSError::decode(field, format!("missing {} field", field)))
}

fn parse_decimal(value: &str, field: &str) -> EPSSResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| EPSSError::decode(field, format!("'{}' is not a number: {}", value, e)))
}

fn to_record(id: &str, epss: &Option<String>, percentile: &Option<String>, date: &Option<String>) -> EPSSResult<ScoreRecord> {
    let score = parse_decimal(required(epss, "epss")?, "epss")?;
    let percentile = parse_decimal(required(percentile, "percentile")?, "percentile")?;
    let date = required(date, "date")?;

    Ok(ScoreRecord {
        id: id.to_owned(),
        score,
        percentile,
        date: date.to_owned(),
    })
}

impl EPSSEntry {
    /// The entry itself followed by any nested time-series points.
    pub fn into_records(self) -> EPSSResult<Vec<ScoreRecord>> {
        let id = required(&self.cve, "cve")?;
        let mut records = vec![to_record(id, &self.epss, &self.percentile, &self.date)?];

        if let Some(points) = &self.time_series {
            records.reserve(points.len());
            for point in points {
                records.push(to_record(id, &point.epss, &point.percentile, &point.date)?);
            }
        }

        Ok(records)
    }
}

impl EPSSResponse {
    pub fn into_records(self) -> EPSSResult<Vec<ScoreRecord>> {
        let entries = self
            .data
            .ok_or_else(|| EPSSError::decode("data", "missing data field"))?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            records.extend(entry.into_records()?);
        }

        Ok(records)
    }
}

/// Decodes a raw response body. Any failure discards the whole body.
pub fn decode_records(body: &str) -> EPSSResult<Vec<ScoreRecord>> {
    let response: EPSSResponse = serde_json::from_str(body)
        .map_err(|e| EPSSError::decode("body", format!("failed to unmarshal JSON response: {}", e)))?;

    response.into_records()
}

#[cfg(test)]
mod unit_tests {
    use super::decode_records;
    use crate::logic::error::EPSSError;

    fn decode_field(body: &str) -> String {
        match decode_records(body) {
            Err(EPSSError::Decode { field, .. }) => field,
            other => panic!("expected a decode error, got {:?}", other),
        }
    }

    #[test]
    fn decodes_single_record_test() {
        let body = r#"{"status":"OK","total":1,"data":[{"cve":"CVE-2023-0001","epss":"0.00044","percentile":"0.13","date":"2024-10-18"}]}"#;
        let records = decode_records(body).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "CVE-2023-0001");
        assert_eq!(records[0].score, 0.00044);
        assert_eq!(records[0].percentile, 0.13);
        assert_eq!(records[0].date, "2024-10-18");
    }

    #[test]
    fn keeps_full_decimal_precision_test() {
        let body = r#"{"data":[{"cve":"CVE-2021-44228","epss":"0.974590000","percentile":"0.999610000","date":"2024-10-18"}]}"#;
        let records = decode_records(body).unwrap();

        assert_eq!(records[0].score, 0.97459);
        assert_eq!(records[0].percentile, 0.99961);
    }

    #[test]
    fn empty_data_is_not_an_error_test() {
        assert!(decode_records(r#"{"data":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn missing_fields_are_named_test() {
        assert_eq!(decode_field(r#"{"data":[{"epss":"0.1","percentile":"0.2","date":"2024-10-18"}]}"#), "cve");
        assert_eq!(decode_field(r#"{"data":[{"cve":"CVE-1","percentile":"0.2","date":"2024-10-18"}]}"#), "epss");
        assert_eq!(decode_field(r#"{"data":[{"cve":"CVE-1","epss":"0.1","date":"2024-10-18"}]}"#), "percentile");
        assert_eq!(decode_field(r#"{"data":[{"cve":"CVE-1","epss":"0.1","percentile":"0.2"}]}"#), "date");
        assert_eq!(decode_field(r#"{"status":"OK"}"#), "data");
    }

    #[test]
    fn bad_record_fails_whole_body_test() {
        let body = r#"{"data":[
            {"cve":"CVE-1","epss":"0.1","percentile":"0.2","date":"2024-10-18"},
            {"cve":"CVE-2","epss":"high","percentile":"0.2","date":"2024-10-18"}
        ]}"#;

        assert_eq!(decode_field(body), "epss");
    }

    #[test]
    fn malformed_body_test() {
        assert_eq!(decode_field("<html>busy</html>"), "body");
        assert_eq!(decode_field(r#"{"data":{"cve":"CVE-1"}}"#), "body");
        assert_eq!(decode_field(r#"{"data":[{"cve":"CVE-1","epss":0.1,"percentile":"0.2","date":"2024-10-18"}]}"#), "body");
    }

    #[test]
    fn flattens_time_series_test() {
        let body = r#"{"data":[{"cve":"CVE-2022-27225","epss":"0.002","percentile":"0.6","date":"2024-10-18",
            "time-series":[
                {"epss":"0.0019","percentile":"0.59","date":"2024-10-17"},
                {"epss":"0.0018","percentile":"0.58","date":"2024-10-16"}
            ]}]}"#;
        let records = decode_records(body).unwrap();

        let dates: Vec<&str> = records.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-10-18", "2024-10-17", "2024-10-16"]);
        assert!(records.iter().all(|r| r.id == "CVE-2022-27225"));
        assert_eq!(records[2].score, 0.0018);
    }

    #[test]
    fn time_series_point_missing_field_test() {
        let body = r#"{"data":[{"cve":"CVE-1","epss":"0.002","percentile":"0.6","date":"2024-10-18",
            "time-series":[{"epss":"0.0019","date":"2024-10-17"}]}]}"#;

        assert_eq!(decode_field(body), "percentile");
    }
}
