// 12.0: account funding. balances live in the engine only; this desk converts
// human decimal amounts to raw units and forwards signed adjustments. deposits
// create the engine-side user on first touch.

use crate::engine::{AckCode, AdjustBalance, EngineGateway, GatewayError, UserReport};
use crate::pair::Currency;
use crate::store::LedgerStore;
use crate::types::{Timestamp, Uid};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AccountError {
    #[error("currency not found: {0}")]
    CurrencyNotFound(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("engine command timed out; outcome indeterminate")]
    EngineTimeout,

    #[error("engine rejected balance adjustment: {0}")]
    EngineRejected(AckCode),
}

pub struct AccountDesk {
    store: Arc<LedgerStore>,
    gateway: EngineGateway,
    // engine-side adjustments are deduplicated by transaction id
    next_transaction_id: AtomicU64,
}

impl AccountDesk {
    pub fn new(store: Arc<LedgerStore>, gateway: EngineGateway) -> Self {
        Self {
            store,
            gateway,
            next_transaction_id: AtomicU64::new(Timestamp::now().as_millis() as u64),
        }
    }

    pub async fn deposit(&self, uid: Uid, currency: &str, amount: &str) -> Result<i64, AccountError> {
        let raw = self.to_raw(currency, amount)?;

        // first deposit also provisions the engine-side account
        let ack = self
            .gateway
            .add_user(uid)
            .await
            .map_err(|GatewayError::Timeout(_)| AccountError::EngineTimeout)?;
        if !ack.is_success() {
            return Err(AccountError::EngineRejected(ack));
        }

        self.adjust(uid, currency, raw).await?;
        info!(uid = uid.0, currency, amount = raw, "deposit applied");
        Ok(raw)
    }

    pub async fn withdraw(&self, uid: Uid, currency: &str, amount: &str) -> Result<i64, AccountError> {
        let raw = self.to_raw(currency, amount)?;
        self.adjust(uid, currency, -raw).await?;
        info!(uid = uid.0, currency, amount = raw, "withdrawal applied");
        Ok(raw)
    }

    pub async fn balance(&self, uid: Uid, currency: &str) -> Result<i64, AccountError> {
        let currency = self.currency(currency)?;
        let report = self.report(uid).await?;
        Ok(report.balance(currency.id))
    }

    pub async fn report(&self, uid: Uid) -> Result<UserReport, AccountError> {
        self.gateway
            .user_report(uid)
            .await
            .map_err(|GatewayError::Timeout(_)| AccountError::EngineTimeout)
    }

    async fn adjust(&self, uid: Uid, currency: &str, amount: i64) -> Result<(), AccountError> {
        let currency = self.currency(currency)?;
        let ack = self
            .gateway
            .adjust_balance(AdjustBalance {
                uid,
                currency: currency.id,
                amount,
                transaction_id: self.next_transaction_id.fetch_add(1, Ordering::Relaxed),
            })
            .await
            .map_err(|GatewayError::Timeout(_)| AccountError::EngineTimeout)?;
        if !ack.is_success() {
            return Err(AccountError::EngineRejected(ack));
        }
        Ok(())
    }

    fn currency(&self, symbol: &str) -> Result<Currency, AccountError> {
        self.store
            .currency_by_symbol(symbol)
            .ok_or_else(|| AccountError::CurrencyNotFound(symbol.to_string()))
    }

    fn to_raw(&self, currency: &str, amount: &str) -> Result<i64, AccountError> {
        let value = Decimal::from_str(amount)
            .map_err(|_| AccountError::InvalidAmount(format!("amount is not a number: {amount}")))?;
        if value <= Decimal::ZERO {
            return Err(AccountError::InvalidAmount(format!(
                "amount must be positive: {amount}"
            )));
        }
        let scale = self.currency(currency)?.scale();
        scale
            .to_raw(value)
            .ok_or_else(|| AccountError::InvalidAmount(format!("amount out of range: {amount}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CancelOrder, MatchingEngine, PairSpec, PlaceOrder};
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::time::Duration;

    // balance-tracking engine with a hard NSF check on withdrawals
    #[derive(Default)]
    struct BalanceEngine {
        balances: DashMap<(Uid, crate::types::CurrencyId), i64>,
    }

    #[async_trait]
    impl MatchingEngine for BalanceEngine {
        async fn add_user(&self, _uid: Uid) -> AckCode {
            AckCode::Success
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
        async fn submit_place(&self, _cmd: PlaceOrder) -> AckCode {
            AckCode::Success
        }
        async fn submit_cancel(&self, _cmd: CancelOrder) -> AckCode {
            AckCode::Success
        }
        async fn register_pair(&self, _spec: PairSpec) -> AckCode {
            AckCode::Success
        }
        async fn user_report(&self, uid: Uid) -> UserReport {
            let mut balances = HashMap::new();
            for entry in self.balances.iter() {
                if entry.key().0 == uid {
                    balances.insert(entry.key().1, *entry.value());
                }
            }
            UserReport {
                balances,
                positions: HashMap::new(),
            }
        }
    }

    fn desk() -> (Arc<LedgerStore>, AccountDesk) {
        let store = Arc::new(LedgerStore::new());
        store.get_or_create_currency("USDT", 2);
        let gateway = EngineGateway::new(
            Arc::new(BalanceEngine::default()),
            Duration::from_millis(500),
            Duration::from_millis(500),
        );
        let desk = AccountDesk::new(Arc::clone(&store), gateway);
        (store, desk)
    }

    #[tokio::test]
    async fn deposit_then_read_balance() {
        let (_store, desk) = desk();

        let raw = desk.deposit(Uid(7), "USDT", "100.50").await.unwrap();
        assert_eq!(raw, 10_050);
        assert_eq!(desk.balance(Uid(7), "USDT").await.unwrap(), 10_050);
    }

    #[tokio::test]
    async fn withdraw_reduces_balance() {
        let (_store, desk) = desk();

        desk.deposit(Uid(7), "USDT", "100").await.unwrap();
        desk.withdraw(Uid(7), "USDT", "40").await.unwrap();
        assert_eq!(desk.balance(Uid(7), "USDT").await.unwrap(), 6_000);
    }

    #[tokio::test]
    async fn overdraft_rejected_by_engine() {
        let (_store, desk) = desk();

        desk.deposit(Uid(7), "USDT", "10").await.unwrap();
        let err = desk.withdraw(Uid(7), "USDT", "11").await.unwrap_err();
        assert!(matches!(err, AccountError::EngineRejected(AckCode::InsufficientFunds)));
    }

    #[tokio::test]
    async fn unknown_currency_rejected() {
        let (_store, desk) = desk();
        let err = desk.deposit(Uid(7), "DOGE", "10").await.unwrap_err();
        assert!(matches!(err, AccountError::CurrencyNotFound(_)));
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        let (_store, desk) = desk();
        assert!(desk.deposit(Uid(7), "USDT", "0").await.is_err());
        assert!(desk.deposit(Uid(7), "USDT", "-3").await.is_err());
        assert!(desk.deposit(Uid(7), "USDT", "ten").await.is_err());
    }
}
