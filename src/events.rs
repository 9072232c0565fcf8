// 8.0: the engine's asynchronous event stream. every state change the external
// matching engine makes arrives here as a tagged variant; the reconciler dispatches
// on the variant with one pure handler each, independent of any engine SDK shape.
//
// events for a given pair arrive in the engine's matching order. the book snapshot
// variant is consumed and dropped: order-book caching and fan-out live outside this
// layer.

use crate::types::{BaseAmount, OrderId, PairId, PriceRaw, Timestamp, Uid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    Trade(TradeEvent),
    Reject(RejectEvent),
    Reduce(ReduceEvent),
    OrderBook(BookSnapshotEvent),
}

// 8.1: one matching round. the taker crossed one or more resting maker orders;
// each fill carries the maker side, the volume and the execution price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub pair: PairId,
    pub taker_order_id: OrderId,
    pub taker_uid: Uid,
    pub fills: Vec<EngineFill>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFill {
    pub maker_order_id: OrderId,
    pub maker_uid: Uid,
    pub volume: BaseAmount,
    pub price: PriceRaw,
}

// 8.2: the engine refused a command after it was acknowledged into its pipeline.
// the reconciler must cancel the local order or its reserved margin leaks forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectEvent {
    pub pair: PairId,
    pub order_id: OrderId,
    pub uid: Uid,
    pub reason: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceEvent {
    pub pair: PairId,
    pub order_id: OrderId,
    pub uid: Uid,
    pub reduced: BaseAmount,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshotEvent {
    pub pair: PairId,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: PriceRaw,
    pub volume: BaseAmount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_event_round_trips_through_json() {
        let event = EngineEvent::Trade(TradeEvent {
            pair: PairId(1),
            taker_order_id: OrderId(100),
            taker_uid: Uid(7),
            fills: vec![EngineFill {
                maker_order_id: OrderId(99),
                maker_uid: Uid(8),
                volume: BaseAmount::new(1000),
                price: PriceRaw::new_unchecked(10000),
            }],
            timestamp: Timestamp::from_millis(1),
        });

        let json = serde_json::to_string(&event).unwrap();
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        match back {
            EngineEvent::Trade(trade) => {
                assert_eq!(trade.taker_order_id, OrderId(100));
                assert_eq!(trade.fills.len(), 1);
            }
            other => panic!("expected trade event, got {other:?}"),
        }
    }
}
