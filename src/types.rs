// 1.0: all the primitives live here. nothing in the service works without these types.
// IDs, raw fixed-point amounts, leverage, scales, timestamps. each is a newtype so the
// compiler catches type mixups. money is always a pre-scaled i64: no float ever persists.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyId(pub u32);

// Buy opens/extends a long exposure, Sell a short one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Market,
}

// 1.1: price in quote raw units per unit of base. scaled by the pair's quote scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriceRaw(i64);

impl PriceRaw {
    #[must_use]
    pub fn new(raw: i64) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn new_unchecked(raw: i64) -> Self {
        debug_assert!(raw > 0);
        Self(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PriceRaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.2: base-asset amount in lot raw units. scaled by the pair's lot scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaseAmount(i64);

impl BaseAmount {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn add(&self, other: BaseAmount) -> Self {
        Self(self.0 + other.0)
    }
}

impl fmt::Display for BaseAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: quote-currency amount in raw units. balances, margin, pnl all use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuoteAmount(i64);

impl QuoteAmount {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn add(&self, other: QuoteAmount) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: QuoteAmount) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for QuoteAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sum for QuoteAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(q))
    }
}

// 1.4: leverage multiplier. integer, must be >= 1x. zero leverage never reaches margin math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leverage(i64);

impl Leverage {
    #[must_use]
    pub fn new(value: i64) -> Option<Self> {
        if value >= 1 {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// 1.5: power-of-ten scale factor. converts between human decimals and raw units.
// a currency with 2 decimal places has factor 100: "100.00" <-> 10000 raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale(i64);

impl Scale {
    pub fn from_precision(decimals: u32) -> Self {
        Self(10i64.pow(decimals))
    }

    pub fn factor(&self) -> i64 {
        self.0
    }

    // human decimal -> raw units, truncating anything below the smallest unit
    pub fn to_raw(&self, value: Decimal) -> Option<i64> {
        (value * Decimal::from(self.0)).trunc().to_i64()
    }

    pub fn from_raw(&self, raw: i64) -> Decimal {
        Decimal::from(raw) / Decimal::from(self.0)
    }
}

// 1.6: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

// 1.7: integer ceiling division. margin math rounds up so requirements are never understated.
pub fn ceil_div(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);
    if num >= 0 {
        (num + den - 1) / den
    } else {
        num / den
    }
}
