use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store rejected record: {0}")]
    Store(String),

    #[error("knowledge base is empty")]
    EmptyStore,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("'{0}' is already registered")]
    AlreadyExists(String),

    #[error("failed to initialize '{name}': {reason}")]
    Init { name: String, reason: String },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("tool loop exceeded {0} rounds")]
    ToolLoopLimit(usize),

    #[error("query failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn provider(err: anyhow::Error) -> Self {
        Self::Provider(format!("{err:#}"))
    }
}

/// Independent failures collected from a batch, keyed by the position of the
/// item that failed.
#[derive(Debug, Default)]
pub struct AggregateError {
    failures: Vec<(usize, Error)>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: usize, error: Error) {
        self.failures.push((index, error));
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[(usize, Error)] {
        &self.failures
    }

    /// Returns `Ok(())` when nothing failed, otherwise the sorted aggregate.
    pub fn into_result(mut self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        self.failures.sort_by_key(|(index, _)| *index);
        Err(Error::Aggregate(self))
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operation(s) failed", self.failures.len())?;
        for (index, error) in &self.failures {
            write!(f, "; #{index}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
