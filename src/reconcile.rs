// 10.0: event reconciliation. the asynchronous half of the service: the engine's
// event stream is replayed against the ledger so local orders and positions converge
// on what actually matched. handlers are idempotent; the PENDING status on the order
// row is the dedup guard, so a redelivered event is a logged no-op.
//
// the reconciler is the only writer of positions and the only component that moves
// orders to FILLED. admission only creates PENDING rows and cancels its own.

use crate::events::{BookSnapshotEvent, EngineEvent, EngineFill, RejectEvent, ReduceEvent, TradeEvent};
use crate::position::apply_fill;
use crate::store::LedgerStore;
use crate::types::{OrderId, PairId, Timestamp};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub struct EventReconciler {
    store: Arc<LedgerStore>,
}

impl EventReconciler {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    // drain the stream until the sender side closes
    pub async fn run(self, mut events: mpsc::Receiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("event stream closed; reconciler stopping");
    }

    pub fn handle(&self, event: EngineEvent) {
        match event {
            EngineEvent::Trade(trade) => self.on_trade(trade),
            EngineEvent::Reject(reject) => self.on_reject(reject),
            EngineEvent::Reduce(reduce) => self.on_reduce(reduce),
            EngineEvent::OrderBook(book) => self.on_book(book),
        }
    }

    // 10.1: a matching round. the taker participated in every fill; each maker only
    // in its own. every participant's order terminates and its fills land on the
    // participant's (uid, pair, side) position.
    fn on_trade(&self, trade: TradeEvent) {
        self.apply_participant(trade.pair, trade.taker_order_id, &trade.fills, trade.timestamp);
        for fill in &trade.fills {
            self.apply_participant(
                trade.pair,
                fill.maker_order_id,
                std::slice::from_ref(fill),
                trade.timestamp,
            );
        }
    }

    // settle one order's share of a trade. the FILLED transition is taken exactly
    // once under the order's shard lock; losing it means the event is a duplicate
    // (or raced a cancel) and the position must not be touched again.
    fn apply_participant(&self, pair: PairId, order_id: OrderId, fills: &[EngineFill], timestamp: Timestamp) {
        let Some(order) = self.store.order(order_id) else {
            warn!(order_id = order_id.0, "trade references unknown order");
            return;
        };

        let won = self
            .store
            .update_order(order_id, |order| order.mark_filled(timestamp).is_ok())
            .unwrap_or(false);
        if !won {
            debug!(order_id = order_id.0, "trade for terminal order ignored");
            return;
        }

        let key = (order.uid, pair, order.side);
        for fill in fills {
            let applied = self.store.with_position(key, order.leverage, timestamp, |position| {
                apply_fill(position, fill.volume, fill.price, timestamp)
            });
            if applied.clamped {
                warn!(
                    uid = order.uid.0,
                    order_id = order_id.0,
                    volume = fill.volume.raw(),
                    "fill decrement exceeded open size; clamped at zero"
                );
            }
            info!(
                uid = order.uid.0,
                order_id = order_id.0,
                pair = pair.0,
                volume = fill.volume.raw(),
                price = fill.price.raw(),
                size = applied.new_size.raw(),
                entry = applied.new_entry_price,
                liq = applied.new_liq_price,
                "fill applied"
            );
        }
    }

    // 10.2: a post-ack reject. the PENDING row still reserves margin against the
    // user, so the order must terminate here or the reservation leaks forever.
    fn on_reject(&self, reject: RejectEvent) {
        let result = self
            .store
            .update_order(reject.order_id, |order| order.mark_cancelled(reject.timestamp));
        match result {
            Some(Ok(())) => info!(
                order_id = reject.order_id.0,
                uid = reject.uid.0,
                reason = %reject.reason,
                "order cancelled by engine reject"
            ),
            Some(Err(err)) => debug!(order_id = reject.order_id.0, %err, "reject for terminal order ignored"),
            None => warn!(order_id = reject.order_id.0, "reject references unknown order"),
        }
    }

    // size reductions carry no ledger consequence at this layer; recorded only
    fn on_reduce(&self, reduce: ReduceEvent) {
        info!(
            order_id = reduce.order_id.0,
            uid = reduce.uid.0,
            reduced = reduce.reduced.raw(),
            "order size reduced by engine"
        );
    }

    fn on_book(&self, book: BookSnapshotEvent) {
        trace!(pair = book.pair.0, bids = book.bids.len(), asks = book.asks.len(), "book snapshot dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Order, OrderStatus};
    use crate::types::{BaseAmount, Leverage, OrderKind, PriceRaw, Side, Uid};

    fn store_with_order(id: u64, uid: u64, side: Side) -> Arc<LedgerStore> {
        let store = Arc::new(LedgerStore::new());
        store
            .insert_order(Order::new_pending(
                OrderId(id),
                Uid(uid),
                PairId(1),
                side,
                OrderKind::Limit,
                PriceRaw::new_unchecked(10000),
                BaseAmount::new(200),
                Leverage::new(10).unwrap(),
                None,
                None,
                Timestamp::from_millis(0),
            ))
            .unwrap();
        store
    }

    fn trade(order_id: u64, uid: u64, fills: Vec<EngineFill>) -> TradeEvent {
        TradeEvent {
            pair: PairId(1),
            taker_order_id: OrderId(order_id),
            taker_uid: Uid(uid),
            fills,
            timestamp: Timestamp::from_millis(10),
        }
    }

    fn fill(maker_id: u64, maker_uid: u64, volume: i64, price: i64) -> EngineFill {
        EngineFill {
            maker_order_id: OrderId(maker_id),
            maker_uid: Uid(maker_uid),
            volume: BaseAmount::new(volume),
            price: PriceRaw::new_unchecked(price),
        }
    }

    #[test]
    fn trade_fills_order_and_builds_position() {
        let store = store_with_order(100, 7, Side::Buy);
        let reconciler = EventReconciler::new(Arc::clone(&store));

        reconciler.handle(EngineEvent::Trade(trade(100, 7, vec![fill(99, 8, 200, 10000)])));

        let order = store.order(OrderId(100)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let position = store.position((Uid(7), PairId(1), Side::Buy)).unwrap();
        assert_eq!(position.size_base.raw(), 200);
        assert_eq!(position.entry_price, 10000);
        assert_eq!(position.liq_price, 9000);
    }

    #[test]
    fn taker_takes_all_fills_in_one_round() {
        // two maker fills at different prices settle against the taker once:
        // 100 @ 10000 and 100 @ 12000 => entry 11000, liq 9900 at 10x
        let store = store_with_order(100, 7, Side::Buy);
        let reconciler = EventReconciler::new(Arc::clone(&store));

        reconciler.handle(EngineEvent::Trade(trade(
            100,
            7,
            vec![fill(98, 8, 100, 10000), fill(99, 9, 100, 12000)],
        )));

        let position = store.position((Uid(7), PairId(1), Side::Buy)).unwrap();
        assert_eq!(position.size_base.raw(), 200);
        assert_eq!(position.entry_price, 11000);
        assert_eq!(position.liq_price, 9900);
    }

    #[test]
    fn maker_orders_settle_their_own_fill() {
        let store = store_with_order(100, 7, Side::Buy);
        store
            .insert_order(Order::new_pending(
                OrderId(99),
                Uid(8),
                PairId(1),
                Side::Sell,
                OrderKind::Limit,
                PriceRaw::new_unchecked(10000),
                BaseAmount::new(200),
                Leverage::new(5).unwrap(),
                None,
                None,
                Timestamp::from_millis(0),
            ))
            .unwrap();
        let reconciler = EventReconciler::new(Arc::clone(&store));

        reconciler.handle(EngineEvent::Trade(trade(100, 7, vec![fill(99, 8, 200, 10000)])));

        let maker_order = store.order(OrderId(99)).unwrap();
        assert_eq!(maker_order.status, OrderStatus::Filled);

        let maker_position = store.position((Uid(8), PairId(1), Side::Sell)).unwrap();
        assert_eq!(maker_position.size_base.raw(), 200);
        // sell at 5x liquidates at entry + entry/5
        assert_eq!(maker_position.liq_price, 12000);
    }

    #[test]
    fn redelivered_trade_is_a_no_op() {
        let store = store_with_order(100, 7, Side::Buy);
        let reconciler = EventReconciler::new(Arc::clone(&store));

        let event = trade(100, 7, vec![fill(99, 8, 200, 10000)]);
        reconciler.handle(EngineEvent::Trade(event.clone()));
        reconciler.handle(EngineEvent::Trade(event));

        // the second delivery must not double the position
        let position = store.position((Uid(7), PairId(1), Side::Buy)).unwrap();
        assert_eq!(position.size_base.raw(), 200);
    }

    #[test]
    fn reject_cancels_pending_order() {
        let store = store_with_order(100, 7, Side::Buy);
        let reconciler = EventReconciler::new(Arc::clone(&store));

        reconciler.handle(EngineEvent::Reject(RejectEvent {
            pair: PairId(1),
            order_id: OrderId(100),
            uid: Uid(7),
            reason: "risk check failed".to_string(),
            timestamp: Timestamp::from_millis(10),
        }));

        let order = store.order(OrderId(100)).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        // the released order no longer reserves margin
        assert!(store.pending_orders(Uid(7)).is_empty());
    }

    #[test]
    fn reject_after_fill_leaves_fill_intact() {
        let store = store_with_order(100, 7, Side::Buy);
        let reconciler = EventReconciler::new(Arc::clone(&store));

        reconciler.handle(EngineEvent::Trade(trade(100, 7, vec![fill(99, 8, 200, 10000)])));
        reconciler.handle(EngineEvent::Reject(RejectEvent {
            pair: PairId(1),
            order_id: OrderId(100),
            uid: Uid(7),
            reason: "late".to_string(),
            timestamp: Timestamp::from_millis(11),
        }));

        assert_eq!(store.order(OrderId(100)).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn run_drains_the_channel() {
        let store = store_with_order(100, 7, Side::Buy);
        let reconciler = EventReconciler::new(Arc::clone(&store));

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(reconciler.run(rx));

        tx.send(EngineEvent::Trade(trade(100, 7, vec![fill(99, 8, 200, 10000)])))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(store.order(OrderId(100)).unwrap().status, OrderStatus::Filled);
    }
}
