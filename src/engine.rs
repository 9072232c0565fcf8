// 8.5: the command boundary to the external matching engine. the engine sequences
// commands through a single serialization point per symbol internally; this side only
// submits and awaits. the gateway adds one thing the raw trait does not have: a
// deadline. a command that outlives its deadline is INDETERMINATE, not failed: the
// engine may still execute it, so callers leave local state PENDING and let the
// event stream settle it.

use crate::types::{BaseAmount, CurrencyId, OrderId, OrderKind, PairId, PriceRaw, Scale, Side, Uid};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

// 8.5.1: command wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub uid: Uid,
    pub pair: PairId,
    pub kind: OrderKind,
    pub side: Side,
    pub price: PriceRaw,
    pub size_base: BaseAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub uid: Uid,
    pub pair: PairId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSpec {
    pub pair: PairId,
    pub base: CurrencyId,
    pub base_scale: Scale,
    pub quote: CurrencyId,
    pub quote_scale: Scale,
}

// signed amount: positive deposits, negative withdraws
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustBalance {
    pub uid: Uid,
    pub currency: CurrencyId,
    pub amount: i64,
    pub transaction_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckCode {
    Success,
    UserAlreadyExists,
    InsufficientFunds,
    UnknownSymbol,
    UnknownOrder,
    Rejected,
}

impl AckCode {
    pub fn is_success(&self) -> bool {
        matches!(self, AckCode::Success | AckCode::UserAlreadyExists)
    }
}

impl std::fmt::Display for AckCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

// 8.5.2: the engine's authoritative view of a user. queried on every admission; the
// local ledger store is never the source of truth for balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserReport {
    pub balances: HashMap<CurrencyId, i64>,
    pub positions: HashMap<PairId, EnginePosition>,
}

impl UserReport {
    pub fn balance(&self, currency: CurrencyId) -> i64 {
        self.balances.get(&currency).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginePosition {
    pub direction: Side,
    pub open_volume: i64,
    pub open_price_sum: i64,
    pub profit: i64,
}

// 8.5.3: the boundary trait every engine implementation satisfies
#[async_trait]
pub trait MatchingEngine: Send + Sync {
    async fn add_user(&self, uid: Uid) -> AckCode;
    async fn adjust_balance(&self, cmd: AdjustBalance) -> AckCode;
    async fn submit_place(&self, cmd: PlaceOrder) -> AckCode;
    async fn submit_cancel(&self, cmd: CancelOrder) -> AckCode;
    async fn register_pair(&self, spec: PairSpec) -> AckCode;
    async fn user_report(&self, uid: Uid) -> UserReport;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("engine command timed out after {0:?}; outcome indeterminate")]
    Timeout(Duration),
}

// 8.6: the gateway. every call is bounded by the configured deadline so the caller's
// thread is never parked on the engine longer than it declared.
#[derive(Clone)]
pub struct EngineGateway {
    engine: Arc<dyn MatchingEngine>,
    command_timeout: Duration,
    report_timeout: Duration,
}

impl EngineGateway {
    pub fn new(engine: Arc<dyn MatchingEngine>, command_timeout: Duration, report_timeout: Duration) -> Self {
        Self {
            engine,
            command_timeout,
            report_timeout,
        }
    }

    pub async fn add_user(&self, uid: Uid) -> Result<AckCode, GatewayError> {
        self.bounded(self.engine.add_user(uid)).await
    }

    pub async fn adjust_balance(&self, cmd: AdjustBalance) -> Result<AckCode, GatewayError> {
        self.bounded(self.engine.adjust_balance(cmd)).await
    }

    pub async fn place(&self, cmd: PlaceOrder) -> Result<AckCode, GatewayError> {
        self.bounded(self.engine.submit_place(cmd)).await
    }

    pub async fn cancel(&self, cmd: CancelOrder) -> Result<AckCode, GatewayError> {
        self.bounded(self.engine.submit_cancel(cmd)).await
    }

    pub async fn register_pair(&self, spec: PairSpec) -> Result<AckCode, GatewayError> {
        self.bounded(self.engine.register_pair(spec)).await
    }

    pub async fn user_report(&self, uid: Uid) -> Result<UserReport, GatewayError> {
        timeout(self.report_timeout, self.engine.user_report(uid))
            .await
            .map_err(|_| GatewayError::Timeout(self.report_timeout))
    }

    async fn bounded(
        &self,
        fut: impl std::future::Future<Output = AckCode> + Send,
    ) -> Result<AckCode, GatewayError> {
        timeout(self.command_timeout, fut)
            .await
            .map_err(|_| GatewayError::Timeout(self.command_timeout))
    }
}
