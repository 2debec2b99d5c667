use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Outcomes of broker operations.
///
/// The first five variants are expected, recoverable results that callers
/// branch on. `UnexpectedStatus` and `Other` cover transport and protocol
/// failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("process exists")]
    AlreadyExists,
    #[error("process not found")]
    NotFound,
    #[error("process busy")]
    Busy,
    #[error("process killed")]
    Killed,
    #[error("process wait timeout")]
    WaitTimeout,
    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrokerError {
    /// True for the domain outcomes (everything but transport/protocol errors).
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::UnexpectedStatus(_) | Self::Other(_))
    }
}
