// 11.0: pair provisioning. adding a pair is a two-phase handoff: the pair is
// persisted PENDING_REMOTE first, then registered with the engine, then promoted
// ACTIVE. a failure between the phases leaves a visible PENDING_REMOTE row that can
// be retried instead of a pair the engine has never heard of.

use crate::config::ServiceConfig;
use crate::engine::{AckCode, EngineGateway, GatewayError, PairSpec};
use crate::pair::{Pair, PairStatus};
use crate::store::LedgerStore;
use crate::types::{Scale, Timestamp};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PairRequest {
    pub symbol: String,
    pub base_currency: String,
    pub base_precision: u32,
    pub quote_currency: String,
    pub quote_precision: u32,
    // falls back to the configured default when absent
    pub lot_precision: Option<u32>,
    pub taker_fee: String,
    pub maker_fee: String,
    pub margin_buy: String,
    pub margin_sell: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PairError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("pair not found: {0}")]
    NotFound(String),

    #[error("engine rejected pair registration: {0}")]
    EngineRejected(AckCode),

    #[error("engine registration timed out; pair left pending")]
    EngineTimeout,
}

pub struct PairDesk {
    store: Arc<LedgerStore>,
    gateway: EngineGateway,
    config: ServiceConfig,
}

impl PairDesk {
    pub fn new(store: Arc<LedgerStore>, gateway: EngineGateway, config: ServiceConfig) -> Self {
        Self { store, gateway, config }
    }

    // 11.1: idempotent add. an ACTIVE pair is returned as-is; a PENDING_REMOTE pair
    // retries the registration phase instead of inserting a duplicate row.
    pub async fn add_pair(&self, request: PairRequest) -> Result<Pair, PairError> {
        if let Some(existing) = self.store.pair_by_symbol(&request.symbol) {
            if existing.is_active() {
                return Ok(existing);
            }
            return self.register_remote(existing).await;
        }

        let base = self
            .store
            .get_or_create_currency(&request.base_currency, request.base_precision);
        let quote = self
            .store
            .get_or_create_currency(&request.quote_currency, request.quote_precision);
        let quote_scale = quote.scale();

        let lot_precision = request.lot_precision.unwrap_or(self.config.default_lot_precision);

        let pair = Pair {
            id: self.store.next_pair_id(),
            symbol: request.symbol.clone(),
            base: base.id,
            quote: quote.id,
            lot_scale: Scale::from_precision(lot_precision),
            taker_fee: parse_fee(&request.taker_fee, quote_scale, "taker fee")?,
            maker_fee: parse_fee(&request.maker_fee, quote_scale, "maker fee")?,
            margin_buy: parse_fee(&request.margin_buy, quote_scale, "buy margin rate")?,
            margin_sell: parse_fee(&request.margin_sell, quote_scale, "sell margin rate")?,
            status: PairStatus::PendingRemote,
            created_at: Timestamp::now(),
        };

        // phase one: the row exists locally before the engine hears about it
        self.store.insert_pair(pair.clone());
        info!(symbol = %pair.symbol, pair = pair.id.0, "pair persisted, registering with engine");

        self.register_remote(pair).await
    }

    // phase two: register with the engine, promote on success. any failure leaves
    // the row PENDING_REMOTE for a later retry.
    async fn register_remote(&self, pair: Pair) -> Result<Pair, PairError> {
        let base_scale = self
            .store
            .currency(pair.base)
            .map(|currency| currency.scale())
            .unwrap_or(Scale::from_precision(0));
        let quote_scale = self
            .store
            .currency(pair.quote)
            .map(|currency| currency.scale())
            .unwrap_or(Scale::from_precision(0));

        let ack = match self
            .gateway
            .register_pair(PairSpec {
                pair: pair.id,
                base: pair.base,
                base_scale,
                quote: pair.quote,
                quote_scale,
            })
            .await
        {
            Ok(ack) => ack,
            Err(GatewayError::Timeout(_)) => {
                warn!(symbol = %pair.symbol, "pair registration timed out; row stays pending");
                return Err(PairError::EngineTimeout);
            }
        };

        if !ack.is_success() {
            warn!(symbol = %pair.symbol, %ack, "engine refused pair registration");
            return Err(PairError::EngineRejected(ack));
        }

        self.store.set_pair_status(pair.id, PairStatus::Active);
        info!(symbol = %pair.symbol, pair = pair.id.0, "pair active");
        Ok(Pair {
            status: PairStatus::Active,
            ..pair
        })
    }

    // retry the registration phase for a pair stuck PENDING_REMOTE
    pub async fn retry_remote(&self, symbol: &str) -> Result<Pair, PairError> {
        match self.store.pair_by_symbol(symbol) {
            Some(pair) if pair.is_active() => Ok(pair),
            Some(pair) => self.register_remote(pair).await,
            None => Err(PairError::NotFound(symbol.to_string())),
        }
    }
}

fn parse_fee(raw: &str, scale: Scale, field: &str) -> Result<i64, PairError> {
    let value = Decimal::from_str(raw)
        .map_err(|_| PairError::InvalidAmount(format!("{field} is not a number: {raw}")))?;
    if value < Decimal::ZERO {
        return Err(PairError::InvalidAmount(format!("{field} must not be negative: {raw}")));
    }
    scale
        .to_raw(value)
        .ok_or_else(|| PairError::InvalidAmount(format!("{field} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AdjustBalance, CancelOrder, MatchingEngine, PlaceOrder, UserReport};
    use crate::types::Uid;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // engine that fails registration a configurable number of times
    struct FlakyRegistrar {
        failures_left: AtomicUsize,
    }

    impl FlakyRegistrar {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
            }
        }
    }

    #[async_trait]
    impl MatchingEngine for FlakyRegistrar {
        async fn add_user(&self, _uid: Uid) -> AckCode {
            AckCode::Success
        }
        async fn adjust_balance(&self, _cmd: AdjustBalance) -> AckCode {
            AckCode::Success
        }
        async fn submit_place(&self, _cmd: PlaceOrder) -> AckCode {
            AckCode::Success
        }
        async fn submit_cancel(&self, _cmd: CancelOrder) -> AckCode {
            AckCode::Success
        }
        async fn register_pair(&self, _spec: PairSpec) -> AckCode {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                AckCode::Rejected
            } else {
                AckCode::Success
            }
        }
        async fn user_report(&self, _uid: Uid) -> UserReport {
            UserReport::default()
        }
    }

    fn desk(engine: Arc<dyn MatchingEngine>) -> (Arc<LedgerStore>, PairDesk) {
        let store = Arc::new(LedgerStore::new());
        let gateway = EngineGateway::new(engine, Duration::from_millis(500), Duration::from_millis(500));
        let desk = PairDesk::new(Arc::clone(&store), gateway, ServiceConfig::default());
        (store, desk)
    }

    fn request() -> PairRequest {
        PairRequest {
            symbol: "BTC-USDT".to_string(),
            base_currency: "BTC".to_string(),
            base_precision: 6,
            quote_currency: "USDT".to_string(),
            quote_precision: 2,
            lot_precision: None,
            taker_fee: "0.08".to_string(),
            maker_fee: "0.03".to_string(),
            margin_buy: "0.05".to_string(),
            margin_sell: "0.05".to_string(),
        }
    }

    #[tokio::test]
    async fn add_pair_promotes_to_active() {
        let (store, desk) = desk(Arc::new(FlakyRegistrar::failing(0)));

        let pair = desk.add_pair(request()).await.unwrap();
        assert_eq!(pair.status, PairStatus::Active);
        assert!(store.pair_by_symbol("BTC-USDT").unwrap().is_active());
        // fees scaled to raw quote units (0.08 at scale 2 => 8)
        assert_eq!(pair.taker_fee, 8);
    }

    #[tokio::test]
    async fn failed_registration_leaves_pending_row() {
        let (store, desk) = desk(Arc::new(FlakyRegistrar::failing(1)));

        let err = desk.add_pair(request()).await.unwrap_err();
        assert!(matches!(err, PairError::EngineRejected(_)));

        let row = store.pair_by_symbol("BTC-USDT").unwrap();
        assert_eq!(row.status, PairStatus::PendingRemote);
    }

    #[tokio::test]
    async fn re_add_retries_registration_without_duplicating() {
        let (store, desk) = desk(Arc::new(FlakyRegistrar::failing(1)));

        desk.add_pair(request()).await.unwrap_err();
        let first_id = store.pair_by_symbol("BTC-USDT").unwrap().id;

        // second attempt reuses the row and succeeds
        let pair = desk.add_pair(request()).await.unwrap();
        assert_eq!(pair.id, first_id);
        assert_eq!(pair.status, PairStatus::Active);
    }

    #[tokio::test]
    async fn retry_remote_on_unknown_symbol_fails() {
        let (_store, desk) = desk(Arc::new(FlakyRegistrar::failing(0)));
        assert!(desk.retry_remote("ETH-USDT").await.is_err());
    }

    #[tokio::test]
    async fn bad_fee_rejected_before_any_write() {
        let (store, desk) = desk(Arc::new(FlakyRegistrar::failing(0)));

        let mut bad = request();
        bad.taker_fee = "-0.1".to_string();

        let err = desk.add_pair(bad).await.unwrap_err();
        assert!(matches!(err, PairError::InvalidAmount(_)));
        assert!(store.pair_by_symbol("BTC-USDT").is_none());
    }
}
