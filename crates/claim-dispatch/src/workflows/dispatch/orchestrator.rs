use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    AcceptanceToken, Assignee, AssignmentMode, AssignmentPolicy, Candidate, FallbackBehavior,
    Offer, OfferId, OfferStatus, Order, OrderId, OrderStatus, OrderSummary,
};
use super::error::DispatchError;
use super::matcher::{CandidateMatcher, CoveragePolicy};
use super::repository::{DispatchStore, Notifier, RepositoryError};
use super::resolver::RuleResolver;

/// Why `assign` returned the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentReason {
    Assigned,
    NoAssignmentMade,
    OffersSent,
    AlreadyAssigned,
}

/// Result of one `assign` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentOutcome {
    pub order_id: OrderId,
    pub made: bool,
    pub reason: AssignmentReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AssignmentMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offers: Vec<Offer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AssignmentOutcome {
    fn new(order_id: &OrderId, reason: AssignmentReason, mode: Option<AssignmentMode>) -> Self {
        Self {
            order_id: order_id.clone(),
            made: reason == AssignmentReason::Assigned,
            reason,
            mode,
            assignee: None,
            offers: Vec::new(),
            note: None,
        }
    }

    fn with_assignee(mut self, assignee: Option<Assignee>) -> Self {
        self.assignee = assignee;
        self
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

static OFFER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_offer_id() -> OfferId {
    let id = OFFER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    OfferId(format!("offer-{id:06}"))
}

/// Runs the manual, auto or broadcast strategy for an order.
pub struct AssignmentOrchestrator<S, N> {
    store: Arc<S>,
    resolver: RuleResolver<S>,
    matcher: CandidateMatcher<S>,
    notifier: Arc<N>,
}

impl<S, N> AssignmentOrchestrator<S, N>
where
    S: DispatchStore,
    N: Notifier,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, coverage: CoveragePolicy) -> Self {
        Self {
            resolver: RuleResolver::new(store.clone()),
            matcher: CandidateMatcher::new(store.clone(), coverage),
            store,
            notifier,
        }
    }

    pub fn resolver(&self) -> &RuleResolver<S> {
        &self.resolver
    }

    pub fn assign(&self, order_id: &OrderId) -> Result<AssignmentOutcome, DispatchError> {
        let order = self
            .store
            .fetch_order(order_id)?
            .ok_or_else(|| DispatchError::OrderNotFound(order_id.clone()))?;

        if order.status.is_terminal() {
            return Err(DispatchError::OrderClosed(order.id));
        }
        if order.is_assigned() {
            return Ok(
                AssignmentOutcome::new(&order.id, AssignmentReason::AlreadyAssigned, None)
                    .with_assignee(order.active_assignee()),
            );
        }

        let policy = self
            .resolver
            .resolve(&order.profession, order.postal_code())?;

        match policy.mode {
            AssignmentMode::Manual => Ok(AssignmentOutcome::new(
                &order.id,
                AssignmentReason::NoAssignmentMade,
                Some(AssignmentMode::Manual),
            )
            .with_note("policy requires manual assignment")),
            AssignmentMode::Auto => self.assign_automatically(&order),
            AssignmentMode::Broadcast => self.broadcast(&order, &policy),
            AssignmentMode::Unrecognized => Err(DispatchError::PolicyNotEnabled {
                profession: order.profession.clone(),
                reason: format!("policy {} has an unrecognized mode", policy.id),
            }),
        }
    }

    fn assign_automatically(&self, order: &Order) -> Result<AssignmentOutcome, DispatchError> {
        let candidate = self
            .matcher
            .find(&order.profession, order.postal_code(), Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::NoCandidatesFound {
                profession: order.profession.clone(),
            })?;

        let assignee = candidate.assignee();
        let written = self.store.assign_if_unassigned(
            &order.id,
            &assignee,
            OrderStatus::InProgress,
            Utc::now(),
        )?;

        if !written {
            let current = self
                .store
                .fetch_order(&order.id)?
                .ok_or_else(|| DispatchError::OrderNotFound(order.id.clone()))?;
            if !current.is_assigned() && current.status.is_terminal() {
                return Err(DispatchError::OrderClosed(current.id));
            }
            let current = current.active_assignee();
            warn!(
                order_id = %order.id,
                candidate_id = %assignee.id,
                "order was assigned concurrently; keeping the existing assignee"
            );
            return Ok(AssignmentOutcome::new(
                &order.id,
                AssignmentReason::AlreadyAssigned,
                Some(AssignmentMode::Auto),
            )
            .with_assignee(current));
        }

        info!(
            order_id = %order.id,
            candidate_id = %assignee.id,
            kind = assignee.kind.label(),
            "order assigned automatically"
        );
        self.notify(&candidate, &order.summary());

        Ok(AssignmentOutcome::new(
            &order.id,
            AssignmentReason::Assigned,
            Some(AssignmentMode::Auto),
        )
        .with_assignee(Some(assignee)))
    }

    fn broadcast(
        &self,
        order: &Order,
        policy: &AssignmentPolicy,
    ) -> Result<AssignmentOutcome, DispatchError> {
        let already_offered: HashSet<_> = self
            .store
            .offers_for_order(&order.id)?
            .into_iter()
            .map(|offer| offer.candidate_id)
            .collect();

        let candidates: Vec<Candidate> = self
            .matcher
            .find(&order.profession, order.postal_code(), None)?
            .into_iter()
            .filter(|candidate| !already_offered.contains(&candidate.id))
            .take(policy.fan_out())
            .collect();

        if candidates.is_empty() {
            let note = match policy.fallback {
                FallbackBehavior::InternalOnly => "no candidates; order stays with internal staff",
                FallbackBehavior::Manual => "no candidates; deferred to manual assignment",
            };
            info!(
                order_id = %order.id,
                fallback = ?policy.fallback,
                previously_offered = already_offered.len(),
                "broadcast found no candidates"
            );
            return Ok(AssignmentOutcome::new(
                &order.id,
                AssignmentReason::NoAssignmentMade,
                Some(AssignmentMode::Broadcast),
            )
            .with_note(note));
        }

        let mut offers = Vec::with_capacity(candidates.len());
        let mut last_error: Option<RepositoryError> = None;
        for candidate in &candidates {
            let offer = Offer {
                id: next_offer_id(),
                order_id: order.id.clone(),
                candidate_id: candidate.id.clone(),
                candidate_kind: candidate.kind,
                status: OfferStatus::Sent,
                token: AcceptanceToken::generate(),
                created_at: Utc::now(),
                responded_at: None,
            };

            match self.store.insert_offer(offer) {
                Ok(offer) => {
                    let mut summary = order.summary();
                    summary.offer_token = Some(offer.token.clone());
                    self.notify(candidate, &summary);
                    offers.push(offer);
                }
                Err(err) => {
                    warn!(
                        order_id = %order.id,
                        candidate_id = %candidate.id,
                        error = %err,
                        "failed to create offer; continuing with remaining candidates"
                    );
                    last_error = Some(err);
                }
            }
        }

        if offers.is_empty() {
            if let Some(err) = last_error {
                return Err(err.into());
            }
        }

        info!(order_id = %order.id, offers = offers.len(), "broadcast offers sent");
        let mut outcome = AssignmentOutcome::new(
            &order.id,
            AssignmentReason::OffersSent,
            Some(AssignmentMode::Broadcast),
        );
        outcome.offers = offers;
        Ok(outcome)
    }

    fn notify(&self, candidate: &Candidate, summary: &OrderSummary) {
        if let Err(err) = self.notifier.notify(&candidate.contact, summary) {
            warn!(
                order_id = %summary.order_id,
                candidate_id = %candidate.id,
                error = %err,
                "candidate notification failed"
            );
        }
    }
}
