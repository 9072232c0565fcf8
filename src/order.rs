// 2.0: order entity and its lifecycle. an order is created PENDING by admission and
// only ever terminates: PENDING -> FILLED on a trade event, PENDING -> CANCELLED on an
// explicit cancel or an engine reject. terminal states never transition again.

use crate::types::{BaseAmount, Leverage, OrderId, OrderKind, PairId, PriceRaw, Side, Timestamp, Uid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub uid: Uid,
    pub pair: PairId,
    pub side: Side,
    pub kind: OrderKind,
    // price in quote raw units, size in lot raw units. always pre-scaled integers.
    pub price: PriceRaw,
    pub size_base: BaseAmount,
    pub leverage: Leverage,
    pub tp_price: Option<PriceRaw>,
    pub sl_price: Option<PriceRaw>,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LifecycleError {
    #[error("order {0:?} is already terminal ({1:?})")]
    AlreadyTerminal(OrderId, OrderStatus),
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        id: OrderId,
        uid: Uid,
        pair: PairId,
        side: Side,
        kind: OrderKind,
        price: PriceRaw,
        size_base: BaseAmount,
        leverage: Leverage,
        tp_price: Option<PriceRaw>,
        sl_price: Option<PriceRaw>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            uid,
            pair,
            side,
            kind,
            price,
            size_base,
            leverage,
            tp_price,
            sl_price,
            status: OrderStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn mark_filled(&mut self, timestamp: Timestamp) -> Result<(), LifecycleError> {
        self.transition(OrderStatus::Filled, timestamp)
    }

    pub fn mark_cancelled(&mut self, timestamp: Timestamp) -> Result<(), LifecycleError> {
        self.transition(OrderStatus::Cancelled, timestamp)
    }

    fn transition(&mut self, target: OrderStatus, timestamp: Timestamp) -> Result<(), LifecycleError> {
        if self.is_terminal() {
            return Err(LifecycleError::AlreadyTerminal(self.id, self.status));
        }
        self.status = target;
        self.updated_at = timestamp;
        Ok(())
    }
}
