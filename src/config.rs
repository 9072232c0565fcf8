// 7.0 config.rs: all settings in one place. timeouts and default precisions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    // deadline for engine commands (place, cancel, register, balance adjust)
    pub command_timeout_ms: u64,
    // deadline for engine report queries (balance/position reads)
    pub report_timeout_ms: u64,
    // decimal places used when a pair request does not specify a lot precision
    pub default_lot_precision: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 3_000,
            report_timeout_ms: 2_000,
            default_lot_precision: 3,
        }
    }
}

impl ServiceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }
}
