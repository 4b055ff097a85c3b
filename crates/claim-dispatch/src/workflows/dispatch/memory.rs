//! Mutex-backed store used by the API service, the demo and the test suites.
//!
//! Every conditional write takes its table lock once and performs the comparison and
//! the write under it, which gives the same guarantee as `UPDATE ... WHERE x IS NULL`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::domain::{
    AcceptanceToken, Assignee, AssignmentPolicy, Candidate, CandidateId, CandidateKind,
    Commission, Offer, OfferId, OfferStatus, Order, OrderId, OrderStatus, Profession,
};
use super::repository::{
    CandidateDirectory, CommissionRepository, OfferRepository, OrderRepository, PolicyStore,
    RepositoryError,
};

#[derive(Debug, Default)]
pub struct InMemoryDispatchStore {
    policies: Mutex<Vec<AssignmentPolicy>>,
    candidates: Mutex<BTreeMap<CandidateId, Candidate>>,
    orders: Mutex<HashMap<OrderId, Order>>,
    offers: Mutex<OfferTable>,
    commissions: Mutex<HashMap<OrderId, Commission>>,
}

#[derive(Debug, Default)]
struct OfferTable {
    rows: BTreeMap<OfferId, Offer>,
    by_token: HashMap<AcceptanceToken, OfferId>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
}

impl InMemoryDispatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: AssignmentPolicy) -> Self {
        self.policies
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(policy);
        self
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidates
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(candidate.id.clone(), candidate);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.orders
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order.id.clone(), order);
        self
    }

    /// Replace or add an order, e.g. when the intake layer submits a new claim.
    pub fn put_order(&self, order: Order) -> Result<(), RepositoryError> {
        lock(&self.orders)?.insert(order.id.clone(), order);
        Ok(())
    }

    pub fn put_candidate(&self, candidate: Candidate) -> Result<(), RepositoryError> {
        lock(&self.candidates)?.insert(candidate.id.clone(), candidate);
        Ok(())
    }

    pub fn offer_count(&self) -> Result<usize, RepositoryError> {
        Ok(lock(&self.offers)?.rows.len())
    }

    pub fn commission_count(&self) -> Result<usize, RepositoryError> {
        Ok(lock(&self.commissions)?.len())
    }
}

impl PolicyStore for InMemoryDispatchStore {
    fn policies_for(
        &self,
        profession: &Profession,
    ) -> Result<Vec<AssignmentPolicy>, RepositoryError> {
        Ok(lock(&self.policies)?
            .iter()
            .filter(|policy| &policy.profession == profession)
            .cloned()
            .collect())
    }
}

impl CandidateDirectory for InMemoryDispatchStore {
    fn candidates_for(&self, profession: &Profession) -> Result<Vec<Candidate>, RepositoryError> {
        Ok(lock(&self.candidates)?
            .values()
            .filter(|candidate| candidate.serves(profession))
            .cloned()
            .collect())
    }
}

impl OrderRepository for InMemoryDispatchStore {
    fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(lock(&self.orders)?.get(id).cloned())
    }

    fn assign_if_unassigned(
        &self,
        id: &OrderId,
        assignee: &Assignee,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut orders = lock(&self.orders)?;
        let order = orders.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if order.is_assigned() || order.status.is_terminal() {
            return Ok(false);
        }

        match assignee.kind {
            CandidateKind::Craftsman => order.assigned_craftsman = Some(assignee.id.clone()),
            CandidateKind::Partner => order.assigned_partner = Some(assignee.id.clone()),
        }
        order.status = status;
        order.updated_at = at;
        Ok(true)
    }
}

impl OfferRepository for InMemoryDispatchStore {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let mut table = lock(&self.offers)?;
        if table.rows.contains_key(&offer.id) || table.by_token.contains_key(&offer.token) {
            return Err(RepositoryError::Conflict);
        }
        table.by_token.insert(offer.token.clone(), offer.id.clone());
        table.rows.insert(offer.id.clone(), offer.clone());
        Ok(offer)
    }

    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        Ok(lock(&self.offers)?.rows.get(id).cloned())
    }

    fn fetch_offer_by_token(
        &self,
        token: &AcceptanceToken,
    ) -> Result<Option<Offer>, RepositoryError> {
        let table = lock(&self.offers)?;
        Ok(table
            .by_token
            .get(token)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    fn offers_for_order(&self, order_id: &OrderId) -> Result<Vec<Offer>, RepositoryError> {
        Ok(lock(&self.offers)?
            .rows
            .values()
            .filter(|offer| &offer.order_id == order_id)
            .cloned()
            .collect())
    }

    fn transition_offer(
        &self,
        id: &OfferId,
        from: OfferStatus,
        to: OfferStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut table = lock(&self.offers)?;
        let offer = table.rows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if offer.status != from {
            return Ok(false);
        }
        offer.status = to;
        offer.responded_at = Some(at);
        Ok(true)
    }
}

impl CommissionRepository for InMemoryDispatchStore {
    fn upsert_commission(&self, commission: Commission) -> Result<Commission, RepositoryError> {
        let mut commissions = lock(&self.commissions)?;
        let stored = match commissions.get(&commission.order_id) {
            Some(existing) => Commission {
                status: existing.status,
                created_at: existing.created_at,
                ..commission
            },
            None => commission,
        };
        commissions.insert(stored.order_id.clone(), stored.clone());
        Ok(stored)
    }

    fn commission_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Commission>, RepositoryError> {
        Ok(lock(&self.commissions)?.get(order_id).cloned())
    }
}
