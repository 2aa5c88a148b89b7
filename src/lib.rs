//! BetEngine Library
//!
//! Decision and execution engine for binary prediction-market bets:
//! offline backtesting with performance and robustness analysis, plus a
//! paper-trading loop gated by portfolio risk checks.

use tracing_subscriber::EnvFilter;

pub mod backtest;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod risk;
pub mod sizing;
pub mod store;
pub mod strategy;
pub mod types;

/// Install the global tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
