use thiserror::Error;

use crate::types::RecordId;

#[derive(Error, Debug)]
pub enum ConvocatisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid text library: {reason}")]
    InvalidLibrary { reason: String },

    #[error("Text not found: RID={rid}")]
    TextNotFound { rid: RecordId },

    #[error("Reference store failure for RID={rid}: {reason}")]
    Store { rid: RecordId, reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("HTTP status error: {status}")]
    HttpStatus { status: u16 },

    #[error("Parse cancelled")]
    Cancelled,

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ConvocatisError>;
