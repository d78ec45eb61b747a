//! Error types shared across the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataChatError>;

#[derive(Error, Debug)]
pub enum DataChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SQL engine error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("CSV input has no header row")]
    EmptyCsv,

    #[error("No dataset loaded")]
    NoDataset,

    #[error("Favorite {0} not found")]
    FavoriteNotFound(u64),

    #[error("Message {0} has no SQL query")]
    NoQueryAt(usize),
}
