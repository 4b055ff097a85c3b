use chrono::{DateTime, Utc};

use super::domain::{
    AcceptanceToken, Assignee, AssignmentPolicy, Candidate, CandidateContact,
    Commission, Offer, OfferId, OfferStatus, Order, OrderId, OrderStatus, OrderSummary,
    Profession,
};

/// Read-only rule table consulted by the resolver.
pub trait PolicyStore: Send + Sync {
    /// Every row for the profession, active or not.
    fn policies_for(&self, profession: &Profession)
        -> Result<Vec<AssignmentPolicy>, RepositoryError>;
}

/// Read-only index of craftsmen and partners.
pub trait CandidateDirectory: Send + Sync {
    fn candidates_for(&self, profession: &Profession) -> Result<Vec<Candidate>, RepositoryError>;
}

pub trait OrderRepository: Send + Sync {
    fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Atomically write `assignee` and `status` only while the order has no active handler
    /// and is not closed. Returns whether the write happened; a missing order is `NotFound`.
    fn assign_if_unassigned(
        &self,
        id: &OrderId,
        assignee: &Assignee,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

pub trait OfferRepository: Send + Sync {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError>;
    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError>;
    fn fetch_offer_by_token(&self, token: &AcceptanceToken)
        -> Result<Option<Offer>, RepositoryError>;
    fn offers_for_order(&self, order_id: &OrderId) -> Result<Vec<Offer>, RepositoryError>;

    /// Compare-and-swap on the offer status. Returns whether `from` matched.
    fn transition_offer(
        &self,
        id: &OfferId,
        from: OfferStatus,
        to: OfferStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

pub trait CommissionRepository: Send + Sync {
    /// Insert or replace the row keyed by `commission.order_id`, keeping the stored
    /// status and creation time when a row already exists.
    fn upsert_commission(&self, commission: Commission) -> Result<Commission, RepositoryError>;
    fn commission_for_order(&self, order_id: &OrderId)
        -> Result<Option<Commission>, RepositoryError>;
}

/// Everything the dispatch engine needs from persistence.
pub trait DispatchStore:
    PolicyStore + CandidateDirectory + OrderRepository + OfferRepository + CommissionRepository
{
}

impl<T> DispatchStore for T where
    T: PolicyStore + CandidateDirectory + OrderRepository + OfferRepository + CommissionRepository
{
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook (e-mail, SMS) used to tell a candidate about an order.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        contact: &CandidateContact,
        summary: &OrderSummary,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("candidate has no reachable contact")]
    NoContact,
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
