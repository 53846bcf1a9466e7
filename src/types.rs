use std::{fmt, sync::Arc, time::Duration};

pub type Result<T> = std::result::Result<T, Error>;

/// Error type accepted from upstream producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no matching value within {0:?}")]
    Timeout(Duration),
    #[error("ingestion already stopped")]
    AlreadyStopped,
    #[error("no values collected yet")]
    EmptyHistory,
    #[error("unexpected upstream error: {0}")]
    Unexpected(UpstreamFailure),
    #[error("blocking calls need a multi-thread runtime")]
    BlockingUnsupported,
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("no tokio runtime in scope: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The producer yielded an `Err` item.
    Error,
    /// The producer panicked while being polled.
    Panicked,
    /// The ingestion task was torn down before it could finish.
    Aborted,
}

/// A failure captured from the producer. Cheap to clone.
#[derive(Clone, Debug)]
pub struct UpstreamFailure {
    kind: FailureKind,
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl UpstreamFailure {
    pub(crate) fn new(kind: FailureKind, err: impl Into<BoxError>) -> Self {
        Self {
            kind,
            inner: Arc::from(err.into()),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The error as the producer reported it.
    pub fn error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.inner
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Error => write!(f, "{}", self.inner),
            FailureKind::Panicked => write!(f, "producer panicked: {}", self.inner),
            FailureKind::Aborted => write!(f, "ingestion aborted: {}", self.inner),
        }
    }
}

impl std::error::Error for UpstreamFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}

/// How ingestion ended.
#[derive(Clone, Debug)]
pub enum Outcome {
    Completed,
    Failed(UpstreamFailure),
    Cancelled,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    pub fn failure(&self) -> Option<&UpstreamFailure> {
        match self {
            Outcome::Failed(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::Failed(e) => write!(f, "failed: {e}"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}
