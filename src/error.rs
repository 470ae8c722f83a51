use thiserror::Error;

#[derive(Debug, Error)]
pub enum FireError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("historical data: {0}")]
    HistoricalData(String),
    #[error("shared state is missing field `{0}`")]
    MissingField(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl FireError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FireError::InvalidInput(msg.into())
    }
}
