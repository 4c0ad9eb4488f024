use thiserror::Error;

/// Failures the mock backend can report.
///
/// `Transient` stands in for the network errors a real backend would
/// produce; it is raised by fault injection and by the configured random
/// failure rate. Both variants are recoverable by re-submission.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("todo not found: {id}")]
    NotFound { id: String },

    #[error("transient failure: {0}")]
    Transient(String),
}

impl StoreError {
    /// True when retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
