use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::DispatchConfig;

use super::commission::CommissionRecorder;
use super::domain::{
    AssignmentPolicy, Commission, Offer, OfferDecision, OfferRef, Order, OrderId, Profession,
};
use super::error::DispatchError;
use super::offers::OfferProtocol;
use super::orchestrator::{AssignmentOrchestrator, AssignmentOutcome};
use super::repository::{DispatchStore, Notifier};

/// Facade exposed to the administrative/API layer.
pub struct DispatchService<S, N> {
    store: Arc<S>,
    orchestrator: AssignmentOrchestrator<S, N>,
    offers: OfferProtocol<S>,
    commissions: CommissionRecorder<S>,
}

impl<S, N> DispatchService<S, N>
where
    S: DispatchStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, config: &DispatchConfig) -> Self {
        Self {
            orchestrator: AssignmentOrchestrator::new(
                store.clone(),
                notifier,
                config.unscoped_candidates,
            ),
            offers: OfferProtocol::new(store.clone(), config.offer_ttl),
            commissions: CommissionRecorder::new(store.clone(), config.commission_rate),
            store,
        }
    }

    pub fn resolve_policy(
        &self,
        profession: &Profession,
        postal_code: Option<&str>,
    ) -> Result<AssignmentPolicy, DispatchError> {
        self.orchestrator.resolver().resolve(profession, postal_code)
    }

    pub fn assign(&self, order_id: &OrderId) -> Result<AssignmentOutcome, DispatchError> {
        self.orchestrator.assign(order_id)
    }

    pub fn respond_to_offer(
        &self,
        offer_ref: &OfferRef,
        decision: OfferDecision,
    ) -> Result<Offer, DispatchError> {
        self.offers.respond(offer_ref, decision)
    }

    pub fn respond_to_offer_at(
        &self,
        offer_ref: &OfferRef,
        decision: OfferDecision,
        now: DateTime<Utc>,
    ) -> Result<Offer, DispatchError> {
        self.offers.respond_at(offer_ref, decision, now)
    }

    pub fn record_commission(
        &self,
        order_id: &OrderId,
        gross_amount: Decimal,
    ) -> Result<Option<Commission>, DispatchError> {
        self.commissions.record(order_id, gross_amount)
    }

    pub fn order(&self, order_id: &OrderId) -> Result<Order, DispatchError> {
        self.store
            .fetch_order(order_id)?
            .ok_or_else(|| DispatchError::OrderNotFound(order_id.clone()))
    }

    pub fn offers_for(&self, order_id: &OrderId) -> Result<Vec<Offer>, DispatchError> {
        self.order(order_id)?;
        Ok(self.store.offers_for_order(order_id)?)
    }

    pub fn commission_for(&self, order_id: &OrderId) -> Result<Option<Commission>, DispatchError> {
        Ok(self.store.commission_for_order(order_id)?)
    }
}
