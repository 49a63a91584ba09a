//! Load-time errors for rule tables, price tables and authorizations.
//!
//! Tables are trusted infrastructure: any inconsistency aborts the load of
//! the whole file instead of producing a partial table.

/// Errors raised while reading or decoding binary rule tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The file could not be read.
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An offset, length, count or value check failed.
    #[error("Malformed binary table file '{file}': {reason}")]
    Malformed { file: String, reason: String },

    /// The file extension does not name a known table format.
    #[error("cannot load table file '{path}' with unknown extension")]
    UnknownExtension { path: String },

    #[error(transparent)]
    Price(#[from] PriceError),
}

impl TableError {
    pub(crate) fn malformed(file: &str, reason: impl Into<String>) -> Self {
        TableError::Malformed {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading a JSON price file.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("invalid price file '{file}': {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid price file '{file}': {reason}")]
    Invalid { file: String, reason: String },
}

/// Errors raised while loading a JSON authorization file.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid authorization file '{file}': {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid authorization file '{file}': {reason}")]
    Invalid { file: String, reason: String },
}
