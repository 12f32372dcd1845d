use std::sync::Arc;

use super::epss_api_structs::{decode_records, ScoreRecord};
use super::error::{EPSSError, EPSSResult};

/// Anything that can answer an EPSS query with decoded records.
#[allow(async_fn_in_trait)]
pub trait ScoreSource {
    async fn fetch(&self, params: &[(&str, String)]) -> EPSSResult<Vec<ScoreRecord>>;
}

#[derive(Clone)]
pub struct EPSSAPIClient {
    http_client: Arc<reqwest::Client>,
    base_url: String,
}

impl EPSSAPIClient {
    pub fn new(base_url: impl Into<String>) -> EPSSAPIClient {
        EPSSAPIClient {
            http_client: Arc::new(reqwest::Client::new()),
            base_url: base_url.into(),
        }
    }

    pub fn build_url(&self, params: &[(&str, String)]) -> String {
        if params.is_empty() {
            return self.base_url.clone();
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.base_url, separator, query)
    }

    async fn query_epss(&self, url: &str) -> EPSSResult<String> {
        tracing::info!("Fetching data from: {}", url);

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| EPSSError::Transport { url: url.to_owned(), source })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(EPSSError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| EPSSError::Transport { url: url.to_owned(), source })
    }
}

impl ScoreSource for EPSSAPIClient {
    async fn fetch(&self, params: &[(&str, String)]) -> EPSSResult<Vec<ScoreRecord>> {
        let url = self.build_url(params);
        let body = self.query_epss(&url).await?;

        let records = decode_records(&body)?;
        tracing::debug!("Decoded {} records from {}", records.len(), url);

        Ok(records)
    }
}
