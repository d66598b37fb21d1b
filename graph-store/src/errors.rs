use thiserror::Error;

/// Store-level failure taxonomy.
///
/// `Unavailable` is transient and retried by the adapter; the other kinds are
/// surfaced to the calling stage unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("row decode error: {0}")]
    Decode(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl StoreError {
    /// Classify a driver error into the retryable/fatal taxonomy.
    ///
    /// The driver does not expose a stable error enum across transports, so
    /// classification goes through the rendered message: Neo4j status codes
    /// are embedded verbatim (`Neo.ClientError.Schema.*`, `Neo.TransientError.*`).
    pub fn from_driver(err: neo4rs::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("ConstraintValidation") || msg.contains("Schema.ConstraintViolation") {
            StoreError::Constraint(msg)
        } else if msg.contains("TransientError")
            || msg.contains("ServiceUnavailable")
            || msg.contains("connection")
            || msg.contains("Connection")
            || msg.contains("io error")
            || msg.contains("broken pipe")
        {
            StoreError::Unavailable(msg)
        } else {
            StoreError::Query(msg)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
