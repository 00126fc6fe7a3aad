//! Common error types for acmap

use thiserror::Error;

/// Common result type for acmap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the resolver, lookup, store backends and ingestion
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or empty required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Alias already claimed by a different account
    #[error("The salesforce_name '{alias}' is already mapped to user '{account}'.")]
    Conflict { alias: String, account: String },

    /// Unknown record identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store reachable but refused or failed the operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// SQLite backend error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CouchDB transport error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Document (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet reader error
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when the failure came from the backing store rather than the request.
    ///
    /// Callers that isolate per-row failures must still stop on these.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::Database(_) | Error::Http(_)
        )
    }
}
