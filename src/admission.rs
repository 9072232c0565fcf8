// 9.0: order admission. the synchronous half of the service: validate, check
// collateral against leverage and everything already outstanding, persist PENDING,
// submit to the engine. exactly one ledger write per accepted order and none on any
// rejection path.
//
// 9.1: the read-check-write window (balance report -> reserved sum -> decide ->
// persist) runs under a per-user async mutex. without it two concurrent admissions
// from the same user can both pass against the same stale reserved-margin snapshot
// and jointly over-commit collateral.

use crate::engine::{AckCode, CancelOrder, EngineGateway, GatewayError, PlaceOrder};
use crate::margin::{required_margin, reserved_margin, size_base};
use crate::order::Order;
use crate::store::{LedgerStore, StoreError};
use crate::types::{Leverage, OrderId, OrderKind, PriceRaw, QuoteAmount, Scale, Side, Timestamp, Uid};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

// external collaborator: resolves an opaque account handle to an internal user id.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve(&self, address: &str) -> Option<Uid>;
}

// fixed address book, enough for the demo binary and tests
#[derive(Debug, Default)]
pub struct StaticDirectory {
    entries: DashMap<String, Uid>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: impl Into<String>, uid: Uid) {
        self.entries.insert(address.into(), uid);
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn resolve(&self, address: &str) -> Option<Uid> {
        self.entries.get(address).map(|entry| *entry)
    }
}

// 9.2: the inbound request. price and size arrive as human-readable decimal strings
// and are converted to raw units with the pair's scales before anything else happens.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub sender_address: String,
    pub pair: String,
    pub side: Side,
    pub kind: OrderKind,
    pub entry_price: String,
    pub size_quote: String,
    pub leverage: i64,
    pub tp_price: Option<String>,
    pub sl_price: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AcceptedOrder {
    pub order: Order,
    pub ack: AckCode,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdmissionError {
    #[error("user not found")]
    UserNotFound,

    #[error("pair not found: {0}")]
    PairNotFound(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    // the message surfaces balance - reserved so callers can see what is actually free
    #[error("insufficient margin (available: {available})")]
    InsufficientMargin {
        required: QuoteAmount,
        reserved: QuoteAmount,
        available: QuoteAmount,
    },

    // indeterminate: the engine may still execute the command. if an order was
    // persisted it stays PENDING for the event stream to settle.
    #[error("engine command timed out; outcome indeterminate")]
    EngineTimeout { pending_order: Option<OrderId> },

    #[error("engine rejected command: {0}")]
    EngineRejected(AckCode),

    #[error("cancel target not found: {0:?}")]
    CancelTargetNotFound(OrderId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AdmissionService {
    store: Arc<LedgerStore>,
    gateway: EngineGateway,
    identity: Arc<dyn IdentityDirectory>,
    user_locks: DashMap<Uid, Arc<Mutex<()>>>,
    // caller-assigned ids, seeded from wall clock so they are unique across restarts
    next_order_id: AtomicU64,
}

impl AdmissionService {
    pub fn new(store: Arc<LedgerStore>, gateway: EngineGateway, identity: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            store,
            gateway,
            identity,
            user_locks: DashMap::new(),
            next_order_id: AtomicU64::new(Timestamp::now().as_millis() as u64),
        }
    }

    // 9.3: the admission pipeline. validation and lookups fail before any persistence.
    pub async fn admit(&self, request: OrderRequest) -> Result<AcceptedOrder, AdmissionError> {
        let uid = self
            .identity
            .resolve(&request.sender_address)
            .await
            .ok_or(AdmissionError::UserNotFound)?;

        // a PendingRemote pair is invisible to the engine, so it is not admittable yet
        let pair = self
            .store
            .pair_by_symbol(&request.pair)
            .filter(|pair| pair.is_active())
            .ok_or_else(|| AdmissionError::PairNotFound(request.pair.clone()))?;

        let quote_currency = self
            .store
            .currency(pair.quote)
            .ok_or_else(|| AdmissionError::PairNotFound(request.pair.clone()))?;
        let quote_scale = quote_currency.scale();

        let price = parse_positive(&request.entry_price, "entry price")?;
        let size_quote = parse_positive(&request.size_quote, "quote size")?;
        let leverage = Leverage::new(request.leverage)
            .ok_or_else(|| AdmissionError::InvalidAmount("leverage must be >= 1".to_string()))?;

        let price_raw = to_price_raw(price, quote_scale, "entry price")?;
        let tp_raw = request
            .tp_price
            .as_deref()
            .map(|raw| parse_positive(raw, "take profit").and_then(|p| to_price_raw(p, quote_scale, "take profit")))
            .transpose()?;
        let sl_raw = request
            .sl_price
            .as_deref()
            .map(|raw| parse_positive(raw, "stop loss").and_then(|p| to_price_raw(p, quote_scale, "stop loss")))
            .transpose()?;

        let required = required_margin(size_quote, leverage, quote_scale)
            .ok_or_else(|| AdmissionError::InvalidAmount("quote size out of range".to_string()))?;

        let size = size_base(size_quote, price, pair.lot_scale)
            .ok_or_else(|| AdmissionError::InvalidAmount("quote size out of range".to_string()))?;
        if size.raw() <= 0 {
            return Err(AdmissionError::InvalidAmount(
                "size is below one lot at this price".to_string(),
            ));
        }

        let order = {
            // serialize the read-check-write window per user
            let lock = self.user_lock(uid);
            let _guard = lock.lock().await;

            let report = self
                .gateway
                .user_report(uid)
                .await
                .map_err(|_| AdmissionError::EngineTimeout { pending_order: None })?;
            let balance = QuoteAmount::new(report.balance(quote_currency.id));

            let pending = self.store.pending_orders(uid);
            let reserved = reserved_margin(pending.iter(), |pair_id| {
                self.store.pair(pair_id).map(|p| p.lot_scale)
            });

            if balance < required.add(reserved) {
                let available = balance.sub(reserved);
                info!(
                    uid = uid.0,
                    balance = balance.raw(),
                    required = required.raw(),
                    reserved = reserved.raw(),
                    "order rejected: insufficient margin"
                );
                return Err(AdmissionError::InsufficientMargin {
                    required,
                    reserved,
                    available,
                });
            }

            let now = Timestamp::now();
            let order = Order::new_pending(
                self.next_id(),
                uid,
                pair.id,
                request.side,
                request.kind,
                price_raw,
                size,
                leverage,
                tp_raw,
                sl_raw,
                now,
            );
            self.store.insert_order(order.clone())?;
            info!(
                uid = uid.0,
                order_id = order.id.0,
                pair = %pair.symbol,
                side = %order.side,
                price = price_raw.raw(),
                size = size.raw(),
                "order admitted"
            );
            order
        };

        // the lock is released before suspending on the engine; the PENDING row
        // already holds this order's margin against concurrent admissions
        let ack = match self
            .gateway
            .place(PlaceOrder {
                order_id: order.id,
                uid,
                pair: pair.id,
                kind: order.kind,
                side: order.side,
                price: price_raw,
                size_base: size,
            })
            .await
        {
            Ok(ack) => ack,
            Err(GatewayError::Timeout(_)) => {
                warn!(order_id = order.id.0, "place command timed out; order left PENDING");
                return Err(AdmissionError::EngineTimeout {
                    pending_order: Some(order.id),
                });
            }
        };

        if !ack.is_success() {
            // compensate: release this order's reserved margin immediately
            self.cancel_local(order.id, "engine rejected place command");
            return Err(AdmissionError::EngineRejected(ack));
        }

        Ok(AcceptedOrder { order, ack })
    }

    // 9.4: explicit cancel. the engine confirms before the local order terminates.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order, AdmissionError> {
        let order = self
            .store
            .order(order_id)
            .filter(|order| order.is_pending())
            .ok_or(AdmissionError::CancelTargetNotFound(order_id))?;

        let ack = match self
            .gateway
            .cancel(CancelOrder {
                order_id,
                uid: order.uid,
                pair: order.pair,
            })
            .await
        {
            Ok(ack) => ack,
            Err(GatewayError::Timeout(_)) => {
                return Err(AdmissionError::EngineTimeout {
                    pending_order: Some(order_id),
                })
            }
        };

        if !ack.is_success() {
            return Err(AdmissionError::EngineRejected(ack));
        }

        self.cancel_local(order_id, "cancel acknowledged");
        self.store
            .order(order_id)
            .ok_or(AdmissionError::CancelTargetNotFound(order_id))
    }

    fn cancel_local(&self, order_id: OrderId, context: &str) {
        let result = self
            .store
            .update_order(order_id, |order| order.mark_cancelled(Timestamp::now()));
        match result {
            Some(Ok(())) => info!(order_id = order_id.0, context, "order cancelled"),
            // a fill event can land between the ack and this write; the fill wins
            Some(Err(err)) => warn!(order_id = order_id.0, %err, "cancel skipped"),
            None => warn!(order_id = order_id.0, "cancel target vanished"),
        }
    }

    fn user_lock(&self, uid: Uid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(uid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn next_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn parse_positive(raw: &str, field: &str) -> Result<Decimal, AdmissionError> {
    let value = Decimal::from_str(raw)
        .map_err(|_| AdmissionError::InvalidAmount(format!("{field} is not a number: {raw}")))?;
    if value <= Decimal::ZERO {
        return Err(AdmissionError::InvalidAmount(format!(
            "{field} must be positive: {raw}"
        )));
    }
    Ok(value)
}

fn to_price_raw(value: Decimal, scale: Scale, field: &str) -> Result<PriceRaw, AdmissionError> {
    scale
        .to_raw(value)
        .and_then(PriceRaw::new)
        .ok_or_else(|| AdmissionError::InvalidAmount(format!("{field} out of range")))
}
