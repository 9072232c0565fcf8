// 6.0: the ledger store. in-process concurrent storage for orders, positions, pairs
// and currencies. sharded maps give per-key serialization; ownership of each row is
// by convention: admission creates orders, the reconciler terminates orders and is
// the only writer of positions.
//
// the (uid, pair, side) key makes "at most one OPEN position per user/pair/side" a
// structural property instead of a lookup-then-check discipline.

use crate::order::Order;
use crate::pair::{Currency, Pair, PairStatus};
use crate::position::Position;
use crate::types::{CurrencyId, Leverage, OrderId, PairId, Side, Timestamp, Uid};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

pub type PositionKey = (Uid, PairId, Side);

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("order {0:?} already exists")]
    DuplicateOrder(OrderId),
}

#[derive(Debug, Default)]
pub struct LedgerStore {
    orders: DashMap<OrderId, Order>,
    positions: DashMap<PositionKey, Position>,
    pairs: DashMap<PairId, Pair>,
    pair_symbols: DashMap<String, PairId>,
    currencies: DashMap<CurrencyId, Currency>,
    currency_symbols: DashMap<String, CurrencyId>,
    next_pair_id: AtomicU32,
    next_currency_id: AtomicU32,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    // 6.1: orders

    pub fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        if self.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|entry| entry.clone())
    }

    // mutate an order in place under its shard lock. returns None if the order is unknown.
    pub fn update_order<R>(&self, id: OrderId, f: impl FnOnce(&mut Order) -> R) -> Option<R> {
        self.orders.get_mut(&id).map(|mut entry| f(entry.value_mut()))
    }

    pub fn pending_orders(&self, uid: Uid) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.uid == uid && entry.is_pending())
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn orders_for(&self, uid: Uid) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.uid == uid)
            .map(|entry| entry.clone())
            .collect()
    }

    // 6.2: positions

    pub fn position(&self, key: PositionKey) -> Option<Position> {
        self.positions.get(&key).map(|entry| entry.clone())
    }

    // lookup-or-create the OPEN position for the key, then mutate it under the shard
    // lock. the entry lock is what serializes reconciler writes per position.
    pub fn with_position<R>(
        &self,
        key: PositionKey,
        leverage: Leverage,
        timestamp: Timestamp,
        f: impl FnOnce(&mut Position) -> R,
    ) -> R {
        let mut entry = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::open(key.0, key.1, key.2, leverage, timestamp));
        f(entry.value_mut())
    }

    pub fn positions_for(&self, uid: Uid) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|entry| entry.uid == uid)
            .map(|entry| entry.clone())
            .collect()
    }

    // 6.3: pairs

    pub fn next_pair_id(&self) -> PairId {
        PairId(self.next_pair_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn insert_pair(&self, pair: Pair) {
        self.pair_symbols.insert(pair.symbol.clone(), pair.id);
        self.pairs.insert(pair.id, pair);
    }

    pub fn pair(&self, id: PairId) -> Option<Pair> {
        self.pairs.get(&id).map(|entry| entry.clone())
    }

    pub fn pair_by_symbol(&self, symbol: &str) -> Option<Pair> {
        let id = *self.pair_symbols.get(symbol)?;
        self.pair(id)
    }

    pub fn set_pair_status(&self, id: PairId, status: PairStatus) {
        if let Some(mut entry) = self.pairs.get_mut(&id) {
            entry.status = status;
        }
    }

    // 6.4: currencies

    pub fn currency(&self, id: CurrencyId) -> Option<Currency> {
        self.currencies.get(&id).map(|entry| entry.clone())
    }

    pub fn currency_by_symbol(&self, symbol: &str) -> Option<Currency> {
        let id = *self.currency_symbols.get(symbol)?;
        self.currency(id)
    }

    // created lazily on first reference, immutable thereafter. the symbol-index entry
    // lock serializes concurrent first references to the same symbol.
    pub fn get_or_create_currency(&self, symbol: &str, precision: u32) -> Currency {
        let id = *self
            .currency_symbols
            .entry(symbol.to_string())
            .or_insert_with(|| {
                let id = CurrencyId(self.next_currency_id.fetch_add(1, Ordering::Relaxed) + 1);
                self.currencies.insert(
                    id,
                    Currency {
                        id,
                        symbol: symbol.to_string(),
                        precision,
                    },
                );
                id
            });
        // the entry above guarantees presence
        self.currencies
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or(Currency {
                id,
                symbol: symbol.to_string(),
                precision,
            })
    }
}
