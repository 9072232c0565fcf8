// 13.0: paper engine (mocked). an in-process stand-in for the external matching
// engine, just real enough to drive the demo binary and the end-to-end tests:
// price-crossing limit orders, one fill per matching round, a resting order is
// always consumed whole. not an order book.

use crate::engine::{
    AckCode, AdjustBalance, CancelOrder, EnginePosition, MatchingEngine, PairSpec, PlaceOrder, UserReport,
};
use crate::events::{EngineEvent, EngineFill, RejectEvent, TradeEvent};
use crate::types::{CurrencyId, OrderKind, PairId, Side, Timestamp, Uid};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

pub struct PaperEngine {
    users: DashMap<Uid, ()>,
    balances: DashMap<(Uid, CurrencyId), i64>,
    pairs: DashMap<PairId, PairSpec>,
    resting: Mutex<Vec<PlaceOrder>>,
    positions: DashMap<(Uid, PairId), EnginePosition>,
    events: mpsc::Sender<EngineEvent>,
}

impl PaperEngine {
    pub fn new(events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            users: DashMap::new(),
            balances: DashMap::new(),
            pairs: DashMap::new(),
            resting: Mutex::new(Vec::new()),
            positions: DashMap::new(),
            events,
        }
    }

    // running totals per (user, pair), the shape the report read hands back.
    // direction is fixed by the first fill; enough for a paper double.
    fn record_fill(&self, uid: Uid, pair: PairId, side: Side, volume: i64, price: i64) {
        let mut entry = self.positions.entry((uid, pair)).or_insert_with(|| EnginePosition {
            direction: side,
            open_volume: 0,
            open_price_sum: 0,
            profit: 0,
        });
        entry.open_volume += volume;
        entry.open_price_sum += volume * price;
    }

    fn crosses(incoming: &PlaceOrder, resting: &PlaceOrder) -> bool {
        if resting.pair != incoming.pair || resting.side != incoming.side.opposite() {
            return false;
        }
        match incoming.kind {
            OrderKind::Market => true,
            OrderKind::Limit => match incoming.side {
                Side::Buy => incoming.price.raw() >= resting.price.raw(),
                Side::Sell => incoming.price.raw() <= resting.price.raw(),
            },
        }
    }

    async fn emit(&self, event: EngineEvent) {
        // send fails only once the receiver is dropped; treat that like a
        // disconnected stream and discard the event
        if self.events.send(event).await.is_err() {
            debug!("event consumer gone; paper engine event dropped");
        }
    }
}

#[async_trait]
impl MatchingEngine for PaperEngine {
    async fn add_user(&self, uid: Uid) -> AckCode {
        if self.users.insert(uid, ()).is_some() {
            AckCode::UserAlreadyExists
        } else {
            AckCode::Success
        }
    }

    async fn adjust_balance(&self, cmd: AdjustBalance) -> AckCode {
        let key = (cmd.uid, cmd.currency);
        let current = self.balances.get(&key).map(|b| *b).unwrap_or(0);
        if current + cmd.amount < 0 {
            return AckCode::InsufficientFunds;
        }
        self.balances.insert(key, current + cmd.amount);
        AckCode::Success
    }

    // a place always acks success if the pair exists; the matching outcome arrives
    // on the event stream, like the real engine
    async fn submit_place(&self, cmd: PlaceOrder) -> AckCode {
        if !self.pairs.contains_key(&cmd.pair) {
            return AckCode::UnknownSymbol;
        }

        let matched = {
            let mut book = self.resting.lock().unwrap_or_else(|e| e.into_inner());
            match book.iter().position(|resting| Self::crosses(&cmd, resting)) {
                Some(index) => Some(book.remove(index)),
                None => {
                    if cmd.kind == OrderKind::Limit {
                        book.push(cmd.clone());
                    }
                    None
                }
            }
        };

        match matched {
            Some(resting) => {
                // executes at the resting price for min of the two sizes
                let volume = cmd.size_base.raw().min(resting.size_base.raw());
                self.record_fill(cmd.uid, cmd.pair, cmd.side, volume, resting.price.raw());
                self.record_fill(resting.uid, resting.pair, resting.side, volume, resting.price.raw());
                self.emit(EngineEvent::Trade(TradeEvent {
                    pair: cmd.pair,
                    taker_order_id: cmd.order_id,
                    taker_uid: cmd.uid,
                    fills: vec![EngineFill {
                        maker_order_id: resting.order_id,
                        maker_uid: resting.uid,
                        volume: crate::types::BaseAmount::new(volume),
                        price: resting.price,
                    }],
                    timestamp: Timestamp::now(),
                }))
                .await;
            }
            None if cmd.kind == OrderKind::Market => {
                self.emit(EngineEvent::Reject(RejectEvent {
                    pair: cmd.pair,
                    order_id: cmd.order_id,
                    uid: cmd.uid,
                    reason: "no liquidity".to_string(),
                    timestamp: Timestamp::now(),
                }))
                .await;
            }
            None => {}
        }

        AckCode::Success
    }

    async fn submit_cancel(&self, cmd: CancelOrder) -> AckCode {
        let mut book = self.resting.lock().unwrap_or_else(|e| e.into_inner());
        match book.iter().position(|resting| resting.order_id == cmd.order_id) {
            Some(index) => {
                book.remove(index);
                AckCode::Success
            }
            None => AckCode::UnknownOrder,
        }
    }

    async fn register_pair(&self, spec: PairSpec) -> AckCode {
        self.pairs.insert(spec.pair, spec);
        AckCode::Success
    }

    async fn user_report(&self, uid: Uid) -> UserReport {
        let mut balances = HashMap::new();
        for entry in self.balances.iter() {
            if entry.key().0 == uid {
                balances.insert(entry.key().1, *entry.value());
            }
        }
        let mut positions = HashMap::new();
        for entry in self.positions.iter() {
            if entry.key().0 == uid {
                positions.insert(entry.key().1, entry.value().clone());
            }
        }
        UserReport { balances, positions }
    }
}
