use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous result for {key}: {count} issues returned")]
    Ambiguous { key: String, count: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Lineage not found for {key}: parent chain stops at [{}]", .chain.join(", "))]
    LineageNotFound { key: String, chain: Vec<String> },

    #[error("Recursion exhausted after {iterations} iterations")]
    RecursionExhausted { iterations: usize },

    #[error("Transition '{name}' is not available for {key}")]
    TransitionNotAvailable { key: String, name: String },

    #[error("Cancelled after retrieving {retrieved} issues")]
    Cancelled { retrieved: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal invariant violated: {0}")]
    Bug(String),
}

impl Error {
    /// HTTPレベルの失敗（ステータス異常・ネットワーク障害）かどうか
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::ApiError { .. } | Error::RequestFailed(_))
    }

    /// CLI用の終了コード（失敗の種類ごとに固定）
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => 2,
            Error::InvalidConfiguration(_) | Error::ConfigurationMissing(_) => 3,
            Error::NotFound(_) => 4,
            Error::Ambiguous { .. } => 5,
            Error::LineageNotFound { .. } => 6,
            Error::RecursionExhausted { .. } => 7,
            Error::ApiError { .. } | Error::RequestFailed(_) => 8,
            Error::JsonParsing(_) | Error::SerializationError(_) => 9,
            Error::Cancelled { .. } => 10,
            Error::TransitionNotAvailable { .. } => 12,
            Error::IoError(_) => 11,
            Error::Bug(_) => 70,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
