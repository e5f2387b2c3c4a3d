//! Worker error classification.
//!
//! Ingestion steps fail in two ways: transient infrastructure blips (store or
//! database briefly unavailable) that the worker retries itself with backoff,
//! and fatal processing failures (malformed deck, analysis error) that must
//! become a terminal failed task immediately. `WorkerError` carries that
//! distinction across the `anyhow` boundary so the pool can downcast it.

use std::fmt;

/// Wraps an error with a transient/fatal classification.
#[derive(Debug)]
pub struct WorkerError {
    transient: bool,
    source: anyhow::Error,
}

impl WorkerError {
    /// A transient infrastructure failure; the worker retries with backoff.
    pub fn transient(source: anyhow::Error) -> Self {
        Self {
            transient: true,
            source,
        }
    }

    /// A fatal processing failure; surfaces as a terminal failed task.
    pub fn fatal(source: anyhow::Error) -> Self {
        Self {
            transient: false,
            source,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Returns true when an `anyhow::Error` carries a transient classification.
/// Unclassified errors are treated as transient so that a forgotten wrap never
/// turns an infra blip into a permanent failure.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<WorkerError>()
        .map(|we| we.is_transient())
        .unwrap_or(true)
}

/// Extension trait to classify results flowing through worker steps.
pub trait WorkerResultExt<T> {
    /// Mark the error side as a fatal processing failure.
    fn fatal_err(self) -> anyhow::Result<T>;

    /// Mark the error side as a transient infrastructure failure.
    fn transient_err(self) -> anyhow::Result<T>;
}

impl<T, E> WorkerResultExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn fatal_err(self) -> anyhow::Result<T> {
        self.map_err(|e| WorkerError::fatal(e.into()).into())
    }

    fn transient_err(self) -> anyhow::Result<T> {
        self.map_err(|e| WorkerError::transient(e.into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification_survives_anyhow() {
        let err: anyhow::Error = WorkerError::fatal(anyhow::anyhow!("bad manifest")).into();
        assert!(!is_transient(&err));
    }

    #[test]
    fn transient_classification_survives_anyhow() {
        let err: anyhow::Error = WorkerError::transient(anyhow::anyhow!("store timeout")).into();
        assert!(is_transient(&err));
    }

    #[test]
    fn unclassified_errors_default_to_transient() {
        let err = anyhow::anyhow!("something unexpected");
        assert!(is_transient(&err));
    }

    #[test]
    fn result_ext_wraps_errors() {
        let res: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = res.fatal_err().unwrap_err();
        assert!(!is_transient(&err));
        assert!(err.to_string().contains("boom"));
    }
}
