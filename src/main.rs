//! Margin Layer Simulation.
//!
//! Walks the full service lifecycle against the in-process paper engine:
//! pair provisioning, deposits, margin-checked admission, asynchronous fill
//! reconciliation, engine rejects and explicit cancels.

use margin_core::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("Margin Risk and Reconciliation Layer Simulation");
    println!("Paper Engine, Isolated Margin, Async Fill Settlement\n");

    scenario_1_matched_trade().await;
    scenario_2_insufficient_margin().await;
    scenario_3_async_reject().await;
    scenario_4_explicit_cancel().await;

    println!("\nAll simulations completed successfully.");
}

// everything one scenario needs, wired against a fresh paper engine
struct Sim {
    store: Arc<LedgerStore>,
    admission: AdmissionService,
    pairs: PairDesk,
    accounts: AccountDesk,
    reconciler: tokio::task::JoinHandle<()>,
}

const ALICE: Uid = Uid(1);
const BOB: Uid = Uid(2);

impl Sim {
    fn new() -> Self {
        let store = Arc::new(LedgerStore::new());
        let config = ServiceConfig::default();

        let (tx, rx) = mpsc::channel(64);
        let engine: Arc<dyn MatchingEngine> = Arc::new(PaperEngine::new(tx));
        let gateway = EngineGateway::new(engine, config.command_timeout(), config.report_timeout());

        let reconciler = tokio::spawn(EventReconciler::new(Arc::clone(&store)).run(rx));

        let directory = Arc::new(StaticDirectory::new());
        directory.insert("0xalice", ALICE);
        directory.insert("0xbob", BOB);

        Self {
            admission: AdmissionService::new(Arc::clone(&store), gateway.clone(), directory),
            pairs: PairDesk::new(Arc::clone(&store), gateway.clone(), config.clone()),
            accounts: AccountDesk::new(Arc::clone(&store), gateway),
            store,
            reconciler,
        }
    }

    async fn setup_market(&self) {
        self.pairs
            .add_pair(PairRequest {
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
            })
            .await
            .expect("pair registration");
    }

    async fn drain(self) {
        // give the reconciler a beat to replay whatever the engine emitted
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.reconciler.abort();
    }
}

fn order(address: &str, side: Side, kind: OrderKind, price: &str, size_quote: &str, leverage: i64) -> OrderRequest {
    OrderRequest {
        sender_address: address.to_string(),
        pair: "BTC-USDT".to_string(),
        side,
        kind,
        entry_price: price.to_string(),
        size_quote: size_quote.to_string(),
        leverage,
        tp_price: None,
        sl_price: None,
    }
}

fn usd(raw: i64) -> f64 {
    raw as f64 / 100.0
}

/// Two crossing limit orders settle into opposing positions.
async fn scenario_1_matched_trade() {
    println!("Scenario 1: Matched Trade\n");

    let sim = Sim::new();
    sim.setup_market().await;

    sim.accounts.deposit(ALICE, "USDT", "10000").await.unwrap();
    sim.accounts.deposit(BOB, "USDT", "10000").await.unwrap();
    println!("  Alice and Bob each deposit $10,000");

    let sell = sim
        .admission
        .admit(order("0xbob", Side::Sell, OrderKind::Limit, "100.00", "5000", 10))
        .await
        .unwrap();
    println!("  Bob SELL $5,000 notional @ $100.00, 10x (order {})", sell.order.id.0);

    let buy = sim
        .admission
        .admit(order("0xalice", Side::Buy, OrderKind::Limit, "100.00", "5000", 10))
        .await
        .unwrap();
    println!("  Alice BUY $5,000 notional @ $100.00, 10x (order {})", buy.order.id.0);

    tokio::time::sleep(Duration::from_millis(50)).await;

    for (name, uid, side) in [("Alice", ALICE, Side::Buy), ("Bob", BOB, Side::Sell)] {
        let pair = sim.store.pair_by_symbol("BTC-USDT").unwrap();
        let pos = sim.store.position((uid, pair.id, side)).unwrap();
        println!(
            "  {}: {} {} lots, entry ${}, liquidation ${}",
            name,
            pos.side,
            pos.size_base.raw(),
            usd(pos.entry_price),
            usd(pos.liq_price)
        );
    }
    println!();

    sim.drain().await;
}

/// Admission refuses an order the balance cannot collateralize.
async fn scenario_2_insufficient_margin() {
    println!("Scenario 2: Insufficient Margin\n");

    let sim = Sim::new();
    sim.setup_market().await;

    sim.accounts.deposit(ALICE, "USDT", "400").await.unwrap();
    println!("  Alice deposits $400");

    // $5,000 notional at 10x needs $500 of margin
    let result = sim
        .admission
        .admit(order("0xalice", Side::Buy, OrderKind::Limit, "100.00", "5000", 10))
        .await;

    match result {
        Err(AdmissionError::InsufficientMargin { required, reserved, available }) => {
            println!(
                "  Rejected: requires ${}, ${} reserved, ${} available",
                usd(required.raw()),
                usd(reserved.raw()),
                usd(available.raw())
            );
        }
        other => println!("  Unexpected outcome: {other:?}"),
    }

    println!("  Local orders written: {}\n", sim.store.orders_for(ALICE).len());

    sim.drain().await;
}

/// A market order with no liquidity is rejected asynchronously.
async fn scenario_3_async_reject() {
    println!("Scenario 3: Asynchronous Engine Reject\n");

    let sim = Sim::new();
    sim.setup_market().await;

    sim.accounts.deposit(ALICE, "USDT", "10000").await.unwrap();

    let accepted = sim
        .admission
        .admit(order("0xalice", Side::Buy, OrderKind::Market, "100.00", "5000", 10))
        .await
        .unwrap();
    println!("  Market BUY admitted (order {}), book is empty", accepted.order.id.0);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let row = sim.store.order(accepted.order.id).unwrap();
    println!("  Reject event replayed, order status: {:?}", row.status);
    println!("  Reserved margin released: {} pending orders remain\n", sim.store.pending_orders(ALICE).len());

    sim.drain().await;
}

/// A resting order is cancelled and its margin reservation released.
async fn scenario_4_explicit_cancel() {
    println!("Scenario 4: Explicit Cancel\n");

    let sim = Sim::new();
    sim.setup_market().await;

    sim.accounts.deposit(ALICE, "USDT", "10000").await.unwrap();

    let accepted = sim
        .admission
        .admit(order("0xalice", Side::Buy, OrderKind::Limit, "90.00", "5000", 10))
        .await
        .unwrap();
    println!("  Limit BUY resting below market (order {})", accepted.order.id.0);
    println!("  Pending orders: {}", sim.store.pending_orders(ALICE).len());

    let cancelled = sim.admission.cancel(accepted.order.id).await.unwrap();
    println!("  Cancelled, status: {:?}", cancelled.status);
    println!("  Pending orders: {}\n", sim.store.pending_orders(ALICE).len());

    sim.drain().await;
}
