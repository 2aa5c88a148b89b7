//! Execution loop
//!
//! One logical worker repeating a fixed cycle: refresh config, scan
//! markets, collect signals from every enabled strategy, pass the batch
//! through the risk gate sequentially, size and paper-execute approvals,
//! then mark open positions to the fresh prices. Cycles never overlap;
//! a failed cycle logs, backs off and retries. Stopping is cooperative,
//! observed at the top of the next cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::ledger::PositionLedger;
use crate::risk::{BatchState, PortfolioSnapshot, RiskGate};
use crate::sizing::StakeSizer;
use crate::store::{CsvLogger, PositionStore, RejectionRow, SignalRow, TradeRow};
use crate::strategy::Strategy;
use crate::types::{MarketData, Signal};

/// External market scanner; the engine treats its output as a read-only
/// snapshot for the cycle.
#[async_trait]
pub trait MarketScanner: Send + Sync {
    async fn scan(&self) -> Result<Vec<MarketData>>;
}

/// What one cycle did, for logging and tests.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    pub markets_scanned: usize,
    pub signals: usize,
    pub approved: usize,
    pub rejected: usize,
    pub executed: usize,
}

/// The single-worker trading loop.
pub struct ExecutionLoop {
    cfg: EngineConfig,
    scanner: Box<dyn MarketScanner>,
    strategies: Vec<Box<dyn Strategy>>,
    store: Arc<dyn PositionStore>,
    csv: Option<CsvLogger>,
    gate: RiskGate,
    sizer: StakeSizer,
    ledger: PositionLedger,
    cash: f64,
    high_water_mark: f64,
    stop: Arc<AtomicBool>,
    config_source: Option<Box<dyn Fn() -> Result<EngineConfig> + Send + Sync>>,
}

impl ExecutionLoop {
    pub fn new(
        cfg: EngineConfig,
        scanner: Box<dyn MarketScanner>,
        strategies: Vec<Box<dyn Strategy>>,
        store: Arc<dyn PositionStore>,
    ) -> Result<Self> {
        let csv = if cfg.persistence.csv_enabled {
            Some(CsvLogger::new(&cfg.persistence.data_dir).context("Failed to set up CSV logs")?)
        } else {
            None
        };
        let cash = cfg.engine.initial_balance;
        Ok(Self {
            gate: RiskGate::new(cfg.risk.clone()),
            sizer: StakeSizer::new(cfg.sizing.clone()),
            csv,
            cfg,
            scanner,
            strategies,
            store,
            ledger: PositionLedger::new(),
            cash,
            high_water_mark: cash,
            stop: Arc::new(AtomicBool::new(false)),
            config_source: None,
        })
    }

    /// Install a config source polled at the top of every cycle. Reload
    /// is a rebuild of the gate and sizer, never shared mutable state.
    pub fn with_config_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> Result<EngineConfig> + Send + Sync + 'static,
    {
        self.config_source = Some(Box::new(source));
        self
    }

    /// Handle the caller can flip to stop the loop after the current
    /// cycle completes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Run until the stop flag is set. Cycle failures back off and retry.
    pub async fn run(&mut self) -> Result<()> {
        info!(config = %self.cfg.digest(), "engine starting");
        while !self.stop.load(Ordering::SeqCst) {
            match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        markets = report.markets_scanned,
                        signals = report.signals,
                        approved = report.approved,
                        rejected = report.rejected,
                        executed = report.executed,
                        cash = format!("{:.2}", self.cash),
                        "cycle complete"
                    );
                    tokio::time::sleep(Duration::from_secs(self.cfg.engine.poll_interval_secs))
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "cycle failed, backing off");
                    tokio::time::sleep(Duration::from_secs(self.cfg.engine.error_backoff_secs))
                        .await;
                }
            }
        }
        info!("engine stopped");
        Ok(())
    }

    /// One full cycle. Public so callers can drive the loop manually.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.refresh_config();

        let markets = self.scanner.scan().await.context("market scan failed")?;
        let markets = self.prefilter(markets);
        let by_id: HashMap<String, MarketData> = markets
            .iter()
            .map(|m| (m.market_id.clone(), m.clone()))
            .collect();

        let mut report = CycleReport {
            markets_scanned: markets.len(),
            ..CycleReport::default()
        };

        let signals = self.collect_signals(&markets).await;
        report.signals = signals.len();

        // Mark to market before the gate so drawdown sees fresh values
        for market in &markets {
            self.ledger.update_prices(market);
        }
        let snapshot = self.snapshot();
        self.high_water_mark = self.high_water_mark.max(snapshot.total_value());

        let mut batch = BatchState::from_snapshot(&snapshot);
        for signal in &signals {
            let result = self.gate.check(signal, &by_id, &snapshot, &batch);
            if !result.approved {
                report.rejected += 1;
                if let (Some(csv), Some(reason)) = (&self.csv, result.reason) {
                    csv.log_rejection(RejectionRow {
                        timestamp: Utc::now().timestamp(),
                        signal_id: signal.id.clone(),
                        strategy: signal.strategy.clone(),
                        market_id: signal.market_id.clone(),
                        reason: reason.to_string(),
                    })
                    .await
                    .unwrap_or_else(|e| warn!(error = %e, "rejection log failed"));
                }
                continue;
            }
            report.approved += 1;

            let stake = self
                .sizer
                .size_signal(signal, self.cash, None, None, result.available_capital);

            // A failure executing one signal must not abort the rest
            match self.execute_paper(signal, stake).await {
                Ok(()) => {
                    batch.commit(signal, stake);
                    report.executed += 1;
                }
                Err(e) => {
                    warn!(signal = %signal.id, error = %e, "execution failed");
                }
            }
        }

        // Persist refreshed marks for open positions
        for position in self.ledger.open_positions() {
            self.store
                .update(&position)
                .await
                .unwrap_or_else(|e| warn!(error = %e, "position update failed"));
        }

        Ok(report)
    }

    fn refresh_config(&mut self) {
        let Some(source) = &self.config_source else {
            return;
        };
        match source() {
            Ok(new_cfg) => {
                self.gate = RiskGate::new(new_cfg.risk.clone());
                self.sizer = StakeSizer::new(new_cfg.sizing.clone());
                self.cfg = new_cfg;
            }
            Err(e) => warn!(error = %e, "config reload failed, keeping previous"),
        }
    }

    /// Engine-level market prefilter: liquidity floor and keyword
    /// exclusions apply before any strategy sees the snapshot.
    fn prefilter(&self, markets: Vec<MarketData>) -> Vec<MarketData> {
        markets
            .into_iter()
            .filter(|m| m.liquidity_usd >= self.cfg.filters.min_liquidity_usd)
            .filter(|m| {
                let id = m.market_id.to_lowercase();
                !self
                    .cfg
                    .filters
                    .excluded_keywords
                    .iter()
                    .any(|kw| id.contains(&kw.to_lowercase()))
            })
            .collect()
    }

    async fn collect_signals(&self, markets: &[MarketData]) -> Vec<Signal> {
        let mut signals = Vec::new();
        for strategy in &self.strategies {
            let eligible: Vec<MarketData> = markets
                .iter()
                .filter(|m| strategy.filter(m))
                .cloned()
                .collect();
            // One strategy blowing up must not silence the others
            match strategy.scan(&eligible).await {
                Ok(mut found) => {
                    if let Some(csv) = &self.csv {
                        for signal in &found {
                            csv.log_signal(SignalRow {
                                timestamp: signal.ts.timestamp(),
                                signal_id: signal.id.clone(),
                                strategy: signal.strategy.clone(),
                                market_id: signal.market_id.clone(),
                                token_id: signal.token_id.clone(),
                                side: signal.side.to_string(),
                                price: signal.price,
                                edge: signal.edge,
                                confidence: signal.confidence,
                                reason: signal.reason.clone(),
                                size_usd: signal.size_usd,
                            })
                            .await
                            .unwrap_or_else(|e| warn!(error = %e, "signal log failed"));
                        }
                    }
                    signals.append(&mut found);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "strategy scan failed");
                }
            }
        }
        signals
    }

    fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cash: self.cash,
            high_water_mark: self.high_water_mark,
            strategy_balances: HashMap::new(),
            open_positions: self.ledger.open_positions(),
        }
    }

    /// Paper fill at the quoted ask (or the offset limit price when the
    /// order type is limit), then record the position everywhere.
    async fn execute_paper(&mut self, signal: &Signal, stake: f64) -> Result<()> {
        if stake <= 0.0 {
            anyhow::bail!("non-positive stake");
        }
        let fill_price = match self.cfg.execution.order_type.as_str() {
            "market" => signal.best_ask,
            _ => signal
                .best_ask
                .min(signal.price * (1.0 + self.cfg.execution.limit_offset_bps / 10_000.0)),
        };
        if fill_price <= 0.0 || fill_price >= 1.0 {
            anyhow::bail!("degenerate fill price {}", fill_price);
        }
        let shares = stake / fill_price;

        let position = self.ledger.open(
            &signal.strategy,
            &signal.market_id,
            &signal.token_id,
            signal.side,
            shares,
            fill_price,
            Utc::now(),
        )?;
        self.store.create(&position).await?;
        self.cash -= stake;

        if let Some(csv) = &self.csv {
            csv.log_trade(TradeRow {
                timestamp: Utc::now().timestamp(),
                strategy: signal.strategy.clone(),
                market_id: signal.market_id.clone(),
                token_id: signal.token_id.clone(),
                side: signal.side.to_string(),
                price: fill_price,
                shares,
                stake_usd: stake,
            })
            .await
            .unwrap_or_else(|e| warn!(error = %e, "trade log failed"));
        }

        info!(
            strategy = %signal.strategy,
            market = %signal.market_id,
            side = %signal.side,
            stake = format!("{:.2}", stake),
            price = fill_price,
            "paper fill"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{PositionStatus, Side};

    struct FixedScanner {
        markets: Vec<MarketData>,
    }

    #[async_trait]
    impl MarketScanner for FixedScanner {
        async fn scan(&self) -> Result<Vec<MarketData>> {
            Ok(self.markets.clone())
        }
    }

    struct FailingScanner;

    #[async_trait]
    impl MarketScanner for FailingScanner {
        async fn scan(&self) -> Result<Vec<MarketData>> {
            anyhow::bail!("feed down")
        }
    }

    /// Emits one fixed-size YES signal per market.
    struct OneShotStrategy;

    #[async_trait]
    impl Strategy for OneShotStrategy {
        fn name(&self) -> &str {
            "one_shot"
        }

        fn filter(&self, market: &MarketData) -> bool {
            market.tradeable
        }

        async fn scan(&self, markets: &[MarketData]) -> Result<Vec<Signal>> {
            Ok(markets
                .iter()
                .map(|m| Signal {
                    id: format!("sig-{}", m.market_id),
                    ts: Utc::now(),
                    strategy: "one_shot".to_string(),
                    market_id: m.market_id.clone(),
                    token_id: m.token_yes.clone(),
                    side: Side::Yes,
                    price: m.mid,
                    best_bid: m.bid,
                    best_ask: m.ask,
                    edge: 0.05,
                    confidence: 0.8,
                    reason: "test".to_string(),
                    size_usd: Some(50.0),
                    size_pct: None,
                })
                .collect())
        }
    }

    struct BrokenStrategy;

    #[async_trait]
    impl Strategy for BrokenStrategy {
        fn name(&self) -> &str {
            "broken"
        }

        fn filter(&self, _market: &MarketData) -> bool {
            true
        }

        async fn scan(&self, _markets: &[MarketData]) -> Result<Vec<Signal>> {
            anyhow::bail!("scan exploded")
        }
    }

    fn market(id: &str, mid: f64) -> MarketData {
        MarketData {
            market_id: id.to_string(),
            token_yes: format!("{}-yes", id),
            token_no: format!("{}-no", id),
            mid,
            bid: mid - 0.01,
            ask: mid + 0.01,
            liquidity_usd: 10_000.0,
            hours_to_close: 48.0,
            category: None,
            tradeable: true,
        }
    }

    fn config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.persistence.csv_enabled = false;
        cfg
    }

    fn engine(
        markets: Vec<MarketData>,
        strategies: Vec<Box<dyn Strategy>>,
    ) -> ExecutionLoop {
        ExecutionLoop::new(
            config(),
            Box::new(FixedScanner { markets }),
            strategies,
            Arc::new(InMemoryStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn cycle_opens_positions_and_debits_cash() {
        let mut engine = engine(
            vec![market("mkt-1", 0.50)],
            vec![Box::new(OneShotStrategy)],
        );
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.signals, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(engine.ledger().open_positions().len(), 1);
        assert!((engine.cash() - 950.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn second_cycle_rejects_duplicate() {
        let mut engine = engine(
            vec![market("mkt-1", 0.50)],
            vec![Box::new(OneShotStrategy)],
        );
        engine.run_cycle().await.unwrap();
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(report.executed, 0);
        assert_eq!(engine.ledger().open_positions().len(), 1);
    }

    #[tokio::test]
    async fn broken_strategy_does_not_silence_others() {
        let mut engine = engine(
            vec![market("mkt-1", 0.50)],
            vec![Box::new(BrokenStrategy), Box::new(OneShotStrategy)],
        );
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.executed, 1);
    }

    #[tokio::test]
    async fn scanner_failure_is_a_cycle_error() {
        let mut engine = ExecutionLoop::new(
            config(),
            Box::new(FailingScanner),
            vec![Box::new(OneShotStrategy)],
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        assert!(engine.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn prefilter_drops_thin_and_excluded_markets() {
        let mut cfg = config();
        cfg.filters.excluded_keywords = vec!["sports".to_string()];
        let mut thin = market("thin", 0.5);
        thin.liquidity_usd = 10.0;
        let markets = vec![market("mkt-1", 0.5), thin, market("sports-finals", 0.5)];
        let mut engine = ExecutionLoop::new(
            cfg,
            Box::new(FixedScanner { markets }),
            vec![Box::new(OneShotStrategy)],
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.markets_scanned, 1);
        assert_eq!(report.executed, 1);
    }

    #[tokio::test]
    async fn batch_sequencing_caps_exposure_within_one_cycle() {
        let mut cfg = config();
        cfg.risk.max_total_exposure_usd = 120.0;
        let markets = vec![
            market("mkt-1", 0.5),
            market("mkt-2", 0.5),
            market("mkt-3", 0.5),
        ];
        let mut engine = ExecutionLoop::new(
            cfg,
            Box::new(FixedScanner { markets }),
            vec![Box::new(OneShotStrategy)],
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        let report = engine.run_cycle().await.unwrap();
        // 50 + 50 fit inside 120; the third sees 20 headroom and takes a
        // reduced stake rather than the full 50
        assert_eq!(report.executed, 3);
        let total_stake: f64 = 1000.0 - engine.cash();
        assert!(total_stake <= 120.0 + 1e-9);
    }

    #[tokio::test]
    async fn stop_flag_prevents_next_cycle() {
        let mut engine = engine(vec![], vec![]);
        let stop = engine.stop_handle();
        stop.store(true, Ordering::SeqCst);
        // run returns immediately without a cycle
        engine.run().await.unwrap();
    }

    #[tokio::test]
    async fn positions_marked_to_market_each_cycle() {
        let mut engine = engine(
            vec![market("mkt-1", 0.50)],
            vec![Box::new(OneShotStrategy)],
        );
        engine.run_cycle().await.unwrap();

        // Price moves; replace the scanner's snapshot via a new engine is
        // overkill, drive the ledger directly as the cycle does
        engine.ledger.update_prices(&market("mkt-1", 0.70));
        let open = engine.ledger().open_positions();
        assert_eq!(open.len(), 1);
        assert!(open[0].unrealized_pnl > 0.0);
    }

    #[tokio::test]
    async fn store_sees_created_positions() {
        let store = Arc::new(InMemoryStore::new());
        let mut engine = ExecutionLoop::new(
            config(),
            Box::new(FixedScanner {
                markets: vec![market("mkt-1", 0.5)],
            }),
            vec![Box::new(OneShotStrategy)],
            store.clone(),
        )
        .unwrap();
        engine.run_cycle().await.unwrap();
        let open = store.query_by_status(PositionStatus::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].strategy, "one_shot");
    }
}
