use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::{OfferId, OrderId, Profession};
use super::repository::RepositoryError;

/// Error raised by the dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("offer {0} not found")]
    OfferNotFound(String),
    #[error("no assignment policy configured for {profession} (postal prefix {prefix:?})")]
    NoPolicyConfigured {
        profession: Profession,
        prefix: Option<String>,
    },
    #[error("assignment policy for {profession} is not enabled: {reason}")]
    PolicyNotEnabled {
        profession: Profession,
        reason: String,
    },
    #[error("no candidates found for {profession}")]
    NoCandidatesFound { profession: Profession },
    #[error("offer {0} was already handled")]
    AlreadyHandled(OfferId),
    #[error("order {0} is already assigned")]
    OrderAlreadyAssigned(OrderId),
    #[error("offer {0} expired before it was accepted")]
    OfferExpired(OfferId),
    #[error("order {0} is closed")]
    OrderClosed(OrderId),
    #[error("gross amount {0} must not be negative")]
    InvalidAmount(Decimal),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Coarse classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    /// A lost race; someone else already handled the order or offer.
    Conflict,
    Unconfigured,
    NoCandidates,
    Invalid,
    Internal,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unconfigured => "unconfigured",
            ErrorKind::NoCandidates => "no_candidates",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Internal => "internal",
        }
    }
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::OrderNotFound(_) | DispatchError::OfferNotFound(_) => {
                ErrorKind::NotFound
            }
            DispatchError::NoPolicyConfigured { .. } | DispatchError::PolicyNotEnabled { .. } => {
                ErrorKind::Unconfigured
            }
            DispatchError::NoCandidatesFound { .. } => ErrorKind::NoCandidates,
            DispatchError::AlreadyHandled(_)
            | DispatchError::OrderAlreadyAssigned(_)
            | DispatchError::OfferExpired(_)
            | DispatchError::OrderClosed(_) => ErrorKind::Conflict,
            DispatchError::InvalidAmount(_) => ErrorKind::Invalid,
            DispatchError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            DispatchError::Repository(RepositoryError::Conflict) => ErrorKind::Conflict,
            DispatchError::Repository(RepositoryError::Unavailable(_)) => ErrorKind::Internal,
        }
    }

    /// True when the caller should read the error as "someone else already handled this".
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
