use thiserror::Error;

#[derive(Debug, Error)]
pub enum EPSSError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("failed to fetch data from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status code {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode {field}: {message}")]
    Decode { field: String, message: String },

    #[error("{0}")]
    NotFound(String),
}

impl EPSSError {
    pub fn decode(field: &str, message: impl Into<String>) -> EPSSError {
        EPSSError::Decode {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EPSSError::NotFound(_))
    }
}

pub type EPSSResult<T> = Result<T, EPSSError>;
