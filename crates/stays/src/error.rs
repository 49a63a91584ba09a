/// Errors raised while loading stays. Malformed field values are not
/// errors: they are flagged on the stay and reported by the classifier.
#[derive(Debug, thiserror::Error)]
pub enum StayError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in stay file '{file}': {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document does not have the expected shape.
    #[error("malformed stay file '{file}': {reason}")]
    Invalid { file: String, reason: String },

    #[error("stay {index}: {kind} range {start}+{len} exceeds the {available} stored values")]
    SpanOutOfBounds {
        index: usize,
        kind: &'static str,
        start: usize,
        len: usize,
        available: usize,
    },
}
