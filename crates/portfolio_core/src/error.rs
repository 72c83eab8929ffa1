//! Typed failures surfaced by every portfolio operation

use thiserror::Error;

/// Every failure aborts the whole operation; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    /// Operation not allowed in the current lifecycle status
    #[error("operation not allowed in the current portfolio status")]
    InvalidState,

    /// Caller lacks the required role
    #[error("caller lacks the required role")]
    Unauthorized,

    /// Guarded operation attempted while paused
    #[error("portfolio operations are paused")]
    Paused,

    /// No checkpoints exist before the portfolio starts
    #[error("portfolio has not started")]
    NotStarted,

    /// Entry already present in a set-like collection
    #[error("entry already present")]
    AlreadyPresent,

    /// Entry absent from a set-like collection
    #[error("entry not found")]
    NotFound,

    /// Write equals the current value
    #[error("value is unchanged")]
    NoOpRejected,

    /// Checked arithmetic overflow
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Checked arithmetic underflow
    #[error("arithmetic underflow")]
    ArithmeticUnderflow,

    /// Virtual token balance below the minimum size at start
    #[error("portfolio is below its minimum size")]
    BelowMinimumSize,

    /// Caller is not a tranche of this portfolio
    #[error("caller is not a tranche of this portfolio")]
    NotATranche,

    /// Underlying asset transfer failed
    #[error("asset transfer failed: {0}")]
    TransferFailed(String),

    /// Controller policy refused the operation
    #[error("controller rejected the operation: {0}")]
    ControllerRejected(String),

    /// Start attempted after the capital formation period elapsed
    #[error("capital formation period has ended")]
    StartDeadlinePassed,

    /// Junior tranches no longer cover the minimum subordinate ratio
    #[error("tranche {tranche} minimum subordinate ratio violated")]
    SubordinationRatioViolated { tranche: usize },

    /// Amount exceeds the tranche's effective value
    #[error("amount exceeds the tranche value")]
    ExceedsTrancheValue,

    /// Counterparty is not an allow-listed vault
    #[error("vault is not registered")]
    VaultNotRegistered,

    /// Rejected configuration or argument
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),
}

pub type Result<T> = core::result::Result<T, PortfolioError>;
