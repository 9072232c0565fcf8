// 5.0: trading pair and currency entities. a pair references exactly two currencies
// and carries the scaling factors every margin computation depends on.
// 5.1: PairStatus tracks the two-phase registration saga: a pair written locally but
// not yet acknowledged by the external engine stays PendingRemote, never silently live.

use crate::types::{CurrencyId, PairId, Scale, Timestamp};
use serde::{Deserialize, Serialize};

// immutable after first reference. scale is the number of decimal places.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub symbol: String,
    pub precision: u32,
}

impl Currency {
    pub fn scale(&self) -> Scale {
        Scale::from_precision(self.precision)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairStatus {
    // persisted locally and acknowledged by the external engine
    Active,
    // persisted locally, remote registration not (yet) acknowledged
    PendingRemote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub id: PairId,
    pub symbol: String,
    pub base: CurrencyId,
    pub quote: CurrencyId,
    // smallest tradable base increment, as a power-of-ten factor
    pub lot_scale: Scale,
    // fee and margin parameters, raw units per engine convention
    pub taker_fee: i64,
    pub maker_fee: i64,
    pub margin_buy: i64,
    pub margin_sell: i64,
    pub status: PairStatus,
    pub created_at: Timestamp,
}

impl Pair {
    pub fn is_active(&self) -> bool {
        self.status == PairStatus::Active
    }
}
