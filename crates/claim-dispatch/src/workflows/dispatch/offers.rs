//! Broadcast offer lifecycle.
//!
//! Acceptance is two compare-and-swap steps: the offer moves `sent -> accepted`, then the
//! order takes the candidate only if it has no handler yet. The order row is the single
//! arbitration point between sibling offers; the offer status stops one offer from being
//! accepted twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::domain::{Offer, OfferDecision, OfferRef, OfferStatus, OrderStatus};
use super::error::DispatchError;
use super::repository::{OfferRepository, OrderRepository};

pub struct OfferProtocol<S> {
    store: Arc<S>,
    ttl: Option<Duration>,
}

impl<S> OfferProtocol<S>
where
    S: OfferRepository + OrderRepository,
{
    pub fn new(store: Arc<S>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    pub fn respond(
        &self,
        offer_ref: &OfferRef,
        decision: OfferDecision,
    ) -> Result<Offer, DispatchError> {
        self.respond_at(offer_ref, decision, Utc::now())
    }

    /// Same as [`respond`](Self::respond) with an explicit clock reading.
    pub fn respond_at(
        &self,
        offer_ref: &OfferRef,
        decision: OfferDecision,
        now: DateTime<Utc>,
    ) -> Result<Offer, DispatchError> {
        let offer = self.lookup(offer_ref)?;
        match decision {
            OfferDecision::Decline => self.decline(offer, now),
            OfferDecision::Accept => self.accept(offer, now),
        }
    }

    fn lookup(&self, offer_ref: &OfferRef) -> Result<Offer, DispatchError> {
        let found = match offer_ref {
            OfferRef::Id(id) => self.store.fetch_offer(id)?,
            OfferRef::Token(token) => self.store.fetch_offer_by_token(token)?,
        };
        found.ok_or_else(|| {
            DispatchError::OfferNotFound(match offer_ref {
                OfferRef::Id(id) => id.0.clone(),
                OfferRef::Token(_) => "for token".to_string(),
            })
        })
    }

    fn decline(&self, offer: Offer, now: DateTime<Utc>) -> Result<Offer, DispatchError> {
        if !self
            .store
            .transition_offer(&offer.id, OfferStatus::Sent, OfferStatus::Declined, now)?
        {
            return Err(DispatchError::AlreadyHandled(offer.id));
        }
        info!(offer_id = %offer.id, order_id = %offer.order_id, "offer declined");
        Ok(Offer {
            status: OfferStatus::Declined,
            responded_at: Some(now),
            ..offer
        })
    }

    fn accept(&self, offer: Offer, now: DateTime<Utc>) -> Result<Offer, DispatchError> {
        if let Some(ttl) = self.ttl {
            if !offer.status.is_terminal() && now - offer.created_at > ttl {
                if self.store.transition_offer(
                    &offer.id,
                    OfferStatus::Sent,
                    OfferStatus::Expired,
                    now,
                )? {
                    info!(offer_id = %offer.id, "offer expired at acceptance time");
                    return Err(DispatchError::OfferExpired(offer.id));
                }
                return Err(DispatchError::AlreadyHandled(offer.id));
            }
        }

        if !self
            .store
            .transition_offer(&offer.id, OfferStatus::Sent, OfferStatus::Accepted, now)?
        {
            return Err(DispatchError::AlreadyHandled(offer.id));
        }

        let assignee = offer.assignee();
        let won =
            self.store
                .assign_if_unassigned(&offer.order_id, &assignee, OrderStatus::Accepted, now);
        let won = match won {
            Ok(won) => won,
            Err(err) => {
                self.roll_back(&offer, now);
                return Err(err.into());
            }
        };

        if !won {
            self.roll_back(&offer, now);
            let order = self.store.fetch_order(&offer.order_id)?;
            if let Some(order) = order.filter(|o| !o.is_assigned() && o.status.is_terminal()) {
                info!(
                    offer_id = %offer.id,
                    order_id = %order.id,
                    status = order.status.label(),
                    "offer accepted after the order was closed"
                );
                return Err(DispatchError::OrderClosed(order.id));
            }
            warn!(
                offer_id = %offer.id,
                order_id = %offer.order_id,
                "offer lost the race; order already has a handler"
            );
            return Err(DispatchError::OrderAlreadyAssigned(offer.order_id));
        }

        info!(
            offer_id = %offer.id,
            order_id = %offer.order_id,
            candidate_id = %offer.candidate_id,
            "offer accepted"
        );
        self.expire_siblings(&offer, now);

        Ok(Offer {
            status: OfferStatus::Accepted,
            responded_at: Some(now),
            ..offer
        })
    }

    /// The slot is gone, so the offer becomes `expired`, never `sent` again.
    fn roll_back(&self, offer: &Offer, now: DateTime<Utc>) {
        if let Err(err) =
            self.store
                .transition_offer(&offer.id, OfferStatus::Accepted, OfferStatus::Expired, now)
        {
            warn!(offer_id = %offer.id, error = %err, "failed to expire losing offer");
        }
    }

    fn expire_siblings(&self, winner: &Offer, now: DateTime<Utc>) {
        let siblings = match self.store.offers_for_order(&winner.order_id) {
            Ok(offers) => offers,
            Err(err) => {
                warn!(order_id = %winner.order_id, error = %err, "could not list sibling offers");
                return;
            }
        };

        for sibling in siblings
            .iter()
            .filter(|offer| offer.id != winner.id && !offer.status.is_terminal())
        {
            match self.store.transition_offer(
                &sibling.id,
                OfferStatus::Sent,
                OfferStatus::Expired,
                now,
            ) {
                Ok(true) => debug!(offer_id = %sibling.id, "sibling offer expired"),
                Ok(false) => {}
                Err(err) => {
                    warn!(offer_id = %sibling.id, error = %err, "failed to expire sibling offer")
                }
            }
        }
    }
}
