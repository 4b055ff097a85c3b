//! Routing engine for damage-claim orders.
//!
//! Resolves the governing assignment policy, matches candidates, runs the manual, auto or
//! broadcast strategy and adjudicates competing offer acceptances without double-booking
//! an order. Commission bookkeeping is exposed at the interface level only.

mod commission;
pub mod domain;
mod error;
pub mod matcher;
pub mod memory;
mod offers;
mod orchestrator;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use commission::CommissionRecorder;
pub use domain::{
    AcceptanceToken, Assignee, AssignmentMode, AssignmentPolicy, Candidate, CandidateContact,
    CandidateId, CandidateKind, Commission, CommissionStatus, CustomerDetails, FallbackBehavior,
    Offer, OfferDecision, OfferId, OfferRef, OfferStatus, Order, OrderId, OrderStatus,
    OrderSummary, PolicyId, PostalRange, Profession,
};
pub use error::{DispatchError, ErrorKind};
pub use matcher::{CandidateMatcher, CoveragePolicy};
pub use memory::InMemoryDispatchStore;
pub use offers::OfferProtocol;
pub use orchestrator::{AssignmentOrchestrator, AssignmentOutcome, AssignmentReason};
pub use repository::{
    CandidateDirectory, CommissionRepository, DispatchStore, NotificationError, Notifier,
    OfferRepository, OrderRepository, PolicyStore, RepositoryError,
};
pub use resolver::{postal_prefix, RuleResolver};
pub use router::dispatch_router;
pub use service::DispatchService;
