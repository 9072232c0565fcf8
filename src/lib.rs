// margin-core: margin risk and reconciliation layer.
// sits between a synchronous order API and an asynchronous matching engine:
// collateral is checked before submission, fills are reconciled after the fact.
// all money is pre-scaled i64 raw units; decimals exist only at the parse boundary.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Uid, PairId, Side, PriceRaw, Leverage, Scale
//   2.x  order.rs: order entity, PENDING -> FILLED/CANCELLED lifecycle
//   3.x  margin.rs: required/reserved margin, quote -> base sizing
//   4.x  position.rs: position struct, vwap entry, liquidation price
//   5.x  pair.rs: currency + trading pair entities
//   6.x  store.rs: concurrent ledger store for orders/positions/pairs
//   7.x  config.rs: timeouts and default precisions
//   8.x  events.rs: engine event stream (trades, rejects, reduces, books)
//   8.5  engine.rs: engine command boundary + deadline gateway
//   9.x  admission.rs: pre-trade checks, the synchronous half
//   10.x reconcile.rs: event replay against the ledger, the async half
//   11.x pairs.rs: two-phase pair provisioning
//   12.x accounts.rs: deposits, withdrawals, balance reads
//   13.x paper_engine.rs: in-process matching engine stand-in (mocked)

// domain modules
pub mod margin;
pub mod order;
pub mod pair;
pub mod position;
pub mod types;

// storage and engine boundary
pub mod engine;
pub mod events;
pub mod store;

// service modules
pub mod accounts;
pub mod admission;
pub mod pairs;
pub mod reconcile;

// integration modules
pub mod config;
pub mod paper_engine;

// re exports for convenience
pub use accounts::*;
pub use admission::*;
pub use engine::*;
pub use events::*;
pub use margin::*;
pub use order::*;
pub use pair::*;
pub use pairs::*;
pub use position::*;
pub use reconcile::*;
pub use store::*;
pub use types::*;
pub use config::ServiceConfig;
pub use paper_engine::PaperEngine;
