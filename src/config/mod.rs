//! Configuration management for BetEngine
//!
//! Loads layered configuration: built-in defaults, then optional config
//! files, then `BETENGINE__`-prefixed environment variables via .env.
//!
//! Components receive an explicit `EngineConfig` value in their
//! constructors; "hot reload" is an explicit rebuild with a freshly
//! loaded config between cycles, never shared global state.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Engine operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Paper,
    Live,
}

/// Stake sizing method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    Fixed,
    FixedPct,
    Kelly,
    HalfKelly,
    VolatilityScaled,
}

/// Main engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub mode: Mode,
    pub risk: RiskLimits,
    pub sizing: SizingConfig,
    pub execution: ExecutionConfig,
    pub filters: FilterConfig,
    pub engine: LoopConfig,
    pub backtest: BacktestDefaults,
    pub persistence: PersistenceConfig,
}

/// Portfolio-level risk limits
#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimits {
    /// Maximum size of any single position in USD
    pub max_position_usd: f64,
    /// Maximum total exposure across all open positions in USD
    pub max_total_exposure_usd: f64,
    /// Maximum open positions across all strategies
    pub max_positions: usize,
    /// Maximum open positions per strategy (0 = unlimited)
    pub max_positions_per_strategy: usize,
    /// Maximum portfolio drawdown from the high-water mark (fraction)
    pub max_drawdown_pct: f64,
}

/// Stake sizing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    /// Sizing method for signals without an explicit size
    pub method: SizingMethod,
    /// Stake for the `fixed` method in USD
    pub fixed_amount_usd: f64,
    /// Capital fraction for the `fixed_pct` method
    pub fixed_pct: f64,
    /// Kelly multiplier (1.0 = full Kelly; `half_kelly` halves again)
    pub kelly_fraction: f64,
    /// Upper bound on the Kelly fraction of capital
    pub max_stake_pct: f64,
    /// Target volatility for `volatility_scaled`
    pub target_vol: f64,
    /// Hard cap on any computed stake in USD
    pub max_size_usd: f64,
    /// Floor on any stake in USD
    pub min_size_usd: f64,
}

/// Order execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Order type hint for the executor ("limit" or "market")
    pub order_type: String,
    /// Offset from mid for limit orders in basis points
    pub limit_offset_bps: f64,
}

/// Market pre-filters applied before strategies scan
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Minimum market liquidity in USD
    pub min_liquidity_usd: f64,
    /// Markets whose ID contains one of these are skipped
    pub excluded_keywords: Vec<String>,
}

/// Execution loop timing
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    /// Seconds between polling cycles
    pub poll_interval_secs: u64,
    /// Backoff after a failed cycle in seconds
    pub error_backoff_secs: u64,
    /// Starting paper balance in USD
    pub initial_balance: f64,
    /// Enabled strategies, by registry name
    pub strategies: Vec<String>,
}

/// Defaults for offline backtests
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestDefaults {
    /// Starting capital in USD
    pub initial_capital: f64,
    /// Fixed per-bet cost in USD
    pub fixed_cost: f64,
    /// Cap on any single stake as a fraction of current capital
    pub max_position_pct: f64,
    /// Bootstrap resample count for the Sharpe p-value
    pub bootstrap_samples: usize,
    /// Bootstrap RNG seed
    pub bootstrap_seed: u64,
    /// Minimum trades for a robustness split half
    pub min_trades_per_split: usize,
}

/// Trade-log persistence
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for CSV logs
    pub data_dir: String,
    /// Enable CSV logging
    pub csv_enabled: bool,
}

impl EngineConfig {
    /// Load configuration from defaults, files and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("mode", "paper")?
            // Risk defaults
            .set_default("risk.max_position_usd", 100.0)?
            .set_default("risk.max_total_exposure_usd", 500.0)?
            .set_default("risk.max_positions", 10)?
            .set_default("risk.max_positions_per_strategy", 0)?
            .set_default("risk.max_drawdown_pct", 0.20)?
            // Sizing defaults
            .set_default("sizing.method", "fixed")?
            .set_default("sizing.fixed_amount_usd", 10.0)?
            .set_default("sizing.fixed_pct", 0.02)?
            .set_default("sizing.kelly_fraction", 0.5)?
            .set_default("sizing.max_stake_pct", 0.25)?
            .set_default("sizing.target_vol", 0.02)?
            .set_default("sizing.max_size_usd", 100.0)?
            .set_default("sizing.min_size_usd", 1.0)?
            // Execution defaults
            .set_default("execution.order_type", "limit")?
            .set_default("execution.limit_offset_bps", 10.0)?
            // Filter defaults
            .set_default("filters.min_liquidity_usd", 1000.0)?
            .set_default("filters.excluded_keywords", Vec::<String>::new())?
            // Loop defaults
            .set_default("engine.poll_interval_secs", 60)?
            .set_default("engine.error_backoff_secs", 30)?
            .set_default("engine.initial_balance", 1000.0)?
            .set_default("engine.strategies", vec!["price_edge".to_string()])?
            // Backtest defaults
            .set_default("backtest.initial_capital", 1000.0)?
            .set_default("backtest.fixed_cost", 0.0)?
            .set_default("backtest.max_position_pct", 0.10)?
            .set_default("backtest.bootstrap_samples", 1000)?
            .set_default("backtest.bootstrap_seed", 42)?
            .set_default("backtest.min_trades_per_split", 10)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            // Load config files if present
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (BETENGINE__*)
            .add_source(Environment::with_prefix("BETENGINE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let engine_config: EngineConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(engine_config)
    }

    /// Generate a digest of the config for startup logging
    pub fn digest(&self) -> String {
        format!(
            "mode={:?} sizing={:?} max_position=${:.0} max_exposure=${:.0} max_dd={:.0}%",
            self.mode,
            self.sizing.method,
            self.risk.max_position_usd,
            self.risk.max_total_exposure_usd,
            self.risk.max_drawdown_pct * 100.0
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Paper,
            risk: RiskLimits::default(),
            sizing: SizingConfig::default(),
            execution: ExecutionConfig {
                order_type: "limit".to_string(),
                limit_offset_bps: 10.0,
            },
            filters: FilterConfig {
                min_liquidity_usd: 1000.0,
                excluded_keywords: Vec::new(),
            },
            engine: LoopConfig {
                poll_interval_secs: 60,
                error_backoff_secs: 30,
                initial_balance: 1000.0,
                strategies: vec!["price_edge".to_string()],
            },
            backtest: BacktestDefaults::default(),
            persistence: PersistenceConfig {
                data_dir: "./data".to_string(),
                csv_enabled: false,
            },
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_usd: 100.0,
            max_total_exposure_usd: 500.0,
            max_positions: 10,
            max_positions_per_strategy: 0,
            max_drawdown_pct: 0.20,
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::Fixed,
            fixed_amount_usd: 10.0,
            fixed_pct: 0.02,
            kelly_fraction: 0.5,
            max_stake_pct: 0.25,
            target_vol: 0.02,
            max_size_usd: 100.0,
            min_size_usd: 1.0,
        }
    }
}

impl Default for BacktestDefaults {
    fn default() -> Self {
        Self {
            initial_capital: 1000.0,
            fixed_cost: 0.0,
            max_position_pct: 0.10,
            bootstrap_samples: 1000,
            bootstrap_seed: 42,
            min_trades_per_split: 10,
        }
    }
}

impl std::fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
