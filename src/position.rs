// 4.0: position tracking and the fill accountant. entry price is the volume-weighted
// average of all fills to date, integer-truncated. at most one OPEN position exists per
// (uid, pair, side); the ledger store enforces that by key.
// 4.1: the liquidation formula is the baseline entry -/+ entry/leverage. it ignores
// maintenance buffer and fees on purpose: downstream consumers depend on these exact
// numbers, so the formula is isolated here where it can be swapped in one place.

use crate::types::{BaseAmount, Leverage, PairId, PriceRaw, QuoteAmount, Side, Timestamp, Uid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub uid: Uid,
    pub pair: PairId,
    pub side: Side,
    pub size_base: BaseAmount,
    // raw quote units. 0 until the first fill lands.
    pub entry_price: i64,
    pub liq_price: i64,
    pub leverage: Leverage,
    pub status: PositionStatus,
    pub realized_pnl: QuoteAmount,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn open(uid: Uid, pair: PairId, side: Side, leverage: Leverage, timestamp: Timestamp) -> Self {
        Self {
            uid,
            pair,
            side,
            size_base: BaseAmount::zero(),
            entry_price: 0,
            liq_price: 0,
            leverage,
            status: PositionStatus::Open,
            realized_pnl: QuoteAmount::zero(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size_base.is_zero()
    }
}

// 4.2: what one fill did to the position. `clamped` flags the undefined-in-source case
// of a decrement larger than the open size; size floors at zero instead of going negative.
#[derive(Debug, Clone, Copy)]
pub struct FillApplied {
    pub new_size: BaseAmount,
    pub new_entry_price: i64,
    pub new_liq_price: i64,
    pub clamped: bool,
}

// 4.3: the accountant. volume-weighted entry, truncating integer division, then the
// baseline liquidation price for the position's side.
pub fn apply_fill(
    position: &mut Position,
    volume: BaseAmount,
    price: PriceRaw,
    timestamp: Timestamp,
) -> FillApplied {
    let old_size = position.size_base.raw() as i128;
    let volume_raw = volume.raw() as i128;

    let mut new_size = old_size + volume_raw;
    let mut clamped = false;
    if new_size < 0 {
        new_size = 0;
        clamped = true;
    }

    let total_value = old_size * position.entry_price as i128 + volume_raw * price.raw() as i128;
    let new_entry = if new_size == 0 { 0 } else { total_value / new_size };
    let new_entry = new_entry as i64;

    let liq = liquidation_price(position.side, new_entry, position.leverage);

    position.size_base = BaseAmount::new(new_size as i64);
    position.entry_price = new_entry;
    position.liq_price = liq;
    position.updated_at = timestamp;

    FillApplied {
        new_size: position.size_base,
        new_entry_price: new_entry,
        new_liq_price: liq,
        clamped,
    }
}

// 4.4: buy positions liquidate below entry, sell positions above it.
pub fn liquidation_price(side: Side, entry_price: i64, leverage: Leverage) -> i64 {
    let buffer = entry_price / leverage.value();
    match side {
        Side::Buy => entry_price - buffer,
        Side::Sell => entry_price + buffer,
    }
}
