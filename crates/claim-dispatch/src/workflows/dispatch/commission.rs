use std::sync::Arc;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info};

use super::domain::{Commission, CommissionStatus, OrderId};
use super::error::DispatchError;
use super::repository::{CommissionRepository, OrderRepository};

/// Derives the partner commission when billing finalizes an order.
pub struct CommissionRecorder<S> {
    store: Arc<S>,
    rate: Decimal,
}

impl<S> CommissionRecorder<S>
where
    S: OrderRepository + CommissionRepository,
{
    pub fn new(store: Arc<S>, rate: Decimal) -> Self {
        Self { store, rate }
    }

    /// Returns `None` when the order has no partner, otherwise the stored row.
    /// Re-invoicing overwrites the amount of the existing row.
    pub fn record(
        &self,
        order_id: &OrderId,
        gross_amount: Decimal,
    ) -> Result<Option<Commission>, DispatchError> {
        if gross_amount.is_sign_negative() && !gross_amount.is_zero() {
            return Err(DispatchError::InvalidAmount(gross_amount));
        }

        let order = self
            .store
            .fetch_order(order_id)?
            .ok_or_else(|| DispatchError::OrderNotFound(order_id.clone()))?;

        let Some(partner_id) = order.assigned_partner else {
            debug!(%order_id, "no partner on order; commission skipped");
            return Ok(None);
        };

        let now = Utc::now();
        let amount = (gross_amount * self.rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let stored = self.store.upsert_commission(Commission {
            partner_id,
            order_id: order.id,
            gross_amount,
            rate: self.rate,
            amount,
            status: CommissionStatus::Pending,
            created_at: now,
            updated_at: now,
        })?;

        info!(
            order_id = %stored.order_id,
            partner_id = %stored.partner_id,
            amount = %stored.amount,
            "commission recorded"
        );
        Ok(Some(stored))
    }
}
