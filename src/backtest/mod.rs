//! Backtest simulator
//!
//! Replays a set of historical bets through the configured stake sizer
//! under one of two capital models:
//!
//! - immediate settlement: each bet settles the moment it is placed, so
//!   the full bankroll compounds bet by bet in resolution order;
//! - capital lockup: stakes stay locked from entry until resolution, so
//!   overlapping bets contend for the same pool and only the unlocked
//!   remainder can be sized against.
//!
//! Both produce the same outputs (trade records plus an equity curve)
//! and hand them to the metrics calculator. The whole run is sequential
//! and deterministic for a given bet set and bootstrap seed.

pub mod bootstrap;
pub mod metrics;
pub mod robustness;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BacktestDefaults;
use crate::sizing::StakeSizer;
use crate::types::{EquityPoint, HistoricalBet, TradeRecord};

use metrics::{MetricsConfig, PerformanceMetrics};

/// Capital model used for settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementModel {
    /// Settle each bet at placement; capital compounds in resolution order
    Immediate,
    /// Lock stakes until resolution; size against unlocked capital only
    CapitalLockup,
}

/// Complete, serializable result of one simulator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub model: SettlementModel,
    pub initial_capital: f64,
    pub final_capital: f64,
    /// Bets skipped because the stake plus cost exceeded capital
    pub skipped: usize,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
}

/// Replays historical bets through a stake sizer under a capital model.
pub struct BacktestSimulator {
    sizer: StakeSizer,
    cfg: BacktestDefaults,
}

impl BacktestSimulator {
    pub fn new(sizer: StakeSizer, cfg: BacktestDefaults) -> Self {
        Self { sizer, cfg }
    }

    /// Run the full pipeline: simulate, then compute metrics.
    pub fn run(&self, bets: &[HistoricalBet], model: SettlementModel) -> BacktestSummary {
        let (trades, equity, skipped) = match model {
            SettlementModel::Immediate => self.simulate_immediate(bets),
            SettlementModel::CapitalLockup => self.simulate_lockup(bets),
        };

        let final_capital = equity
            .last()
            .map(|p| p.capital)
            .unwrap_or(self.cfg.initial_capital);

        let metrics_cfg = MetricsConfig {
            bootstrap_samples: self.cfg.bootstrap_samples,
            bootstrap_seed: self.cfg.bootstrap_seed,
        };
        let metrics =
            PerformanceMetrics::compute(&trades, &equity, self.cfg.initial_capital, &metrics_cfg);

        info!(
            model = ?model,
            trades = trades.len(),
            skipped,
            final_capital = format!("{:.2}", final_capital),
            "backtest complete"
        );

        BacktestSummary {
            model,
            initial_capital: self.cfg.initial_capital,
            final_capital,
            skipped,
            trades,
            equity,
            metrics,
        }
    }

    /// Immediate settlement: walk bets in resolution order, settling each
    /// against the running bankroll before the next is sized.
    fn simulate_immediate(
        &self,
        bets: &[HistoricalBet],
    ) -> (Vec<TradeRecord>, Vec<EquityPoint>, usize) {
        let mut ordered: Vec<&HistoricalBet> = bets.iter().collect();
        ordered.sort_by_key(|b| b.resolution_ts);

        let mut capital = self.cfg.initial_capital;
        let mut trades = Vec::new();
        let mut equity = Vec::new();
        let mut skipped = 0usize;

        for bet in ordered {
            let stake = self
                .stake_for(bet, capital)
                .min(self.cfg.max_position_pct * capital);
            if stake + self.cfg.fixed_cost > capital || stake <= 0.0 {
                skipped += 1;
                debug!(market = %bet.market_id, stake, capital, "skipping bet, stake exceeds capital");
                continue;
            }

            let roi = bet.roi_per_stake();
            let pnl = stake * roi - self.cfg.fixed_cost;
            capital += pnl;

            trades.push(self.trade_record(bet, stake, pnl, roi));
            equity.push(EquityPoint {
                ts: bet.resolution_ts,
                capital,
            });
        }

        (trades, equity, skipped)
    }

    /// Capital lockup: walk bets in entry order. Stakes move from the
    /// available pool into a locked map keyed by resolution time and come
    /// back, with winnings, only once that time has passed.
    fn simulate_lockup(
        &self,
        bets: &[HistoricalBet],
    ) -> (Vec<TradeRecord>, Vec<EquityPoint>, usize) {
        let mut ordered: Vec<&HistoricalBet> = bets.iter().collect();
        ordered.sort_by_key(|b| b.entry_ts);

        let mut pool = LockupPool::new(self.cfg.initial_capital);
        let mut trades = Vec::new();
        let mut equity = Vec::new();
        let mut skipped = 0usize;

        for bet in ordered {
            pool.release_through(bet.entry_ts, &mut trades, &mut equity);

            // Only the unlocked balance can fund a new bet, so both the
            // sizing base and the cap use it, never the full pool
            let stake = self
                .stake_for(bet, pool.available)
                .min(self.cfg.max_position_pct * pool.available);
            if stake + self.cfg.fixed_cost > pool.available || stake <= 0.0 {
                skipped += 1;
                debug!(
                    market = %bet.market_id,
                    stake,
                    available = pool.available,
                    "skipping bet, insufficient unlocked capital"
                );
                continue;
            }

            pool.lock(bet.clone(), stake, self.cfg.fixed_cost);
        }

        pool.flush(&mut trades, &mut equity);

        // Releases are already in nondecreasing time order; sort anyway so
        // the equity-curve invariant holds regardless of input pathologies
        equity.sort_by_key(|p| p.ts);
        trades.sort_by_key(|t| t.settled_ts);

        (trades, equity, skipped)
    }

    /// Method stake for a bet. Affordability is the simulator's call (a
    /// too-large stake skips the bet rather than shrinking to fit), so the
    /// sizer's available-capital clamp is disabled here.
    fn stake_for(&self, bet: &HistoricalBet, capital: f64) -> f64 {
        self.sizer
            .stake(capital, bet.entry_price, None, None, f64::INFINITY)
    }

    fn trade_record(&self, bet: &HistoricalBet, stake: f64, pnl: f64, roi: f64) -> TradeRecord {
        TradeRecord {
            market_id: bet.market_id.clone(),
            side: bet.side,
            entry_price: bet.entry_price,
            stake,
            pnl,
            roi,
            won: roi > 0.0,
            entry_ts: bet.entry_ts,
            settled_ts: bet.resolution_ts,
            category: bet.category.clone(),
            volume: bet.volume,
        }
    }
}

/// A stake held in the locked pool until its bet resolves.
struct LockedStake {
    bet: HistoricalBet,
    stake: f64,
    cost: f64,
}

/// Shared capital pool: an unlocked balance plus stakes locked until
/// their resolution time.
struct LockupPool {
    available: f64,
    locked_sum: f64,
    locked: BTreeMap<chrono::DateTime<chrono::Utc>, Vec<LockedStake>>,
}

impl LockupPool {
    fn new(initial: f64) -> Self {
        Self {
            available: initial,
            locked_sum: 0.0,
            locked: BTreeMap::new(),
        }
    }

    fn total(&self) -> f64 {
        self.available + self.locked_sum
    }

    fn lock(&mut self, bet: HistoricalBet, stake: f64, cost: f64) {
        self.available -= stake + cost;
        self.locked_sum += stake;
        self.locked
            .entry(bet.resolution_ts)
            .or_default()
            .push(LockedStake { bet, stake, cost });
    }

    /// Release every stake whose resolution time is at or before `ts`,
    /// paying `stake * (1 + roi)` back into the available balance and
    /// recording the trade and an equity sample of the full pool.
    fn release_through(
        &mut self,
        ts: chrono::DateTime<chrono::Utc>,
        trades: &mut Vec<TradeRecord>,
        equity: &mut Vec<EquityPoint>,
    ) {
        let matured: Vec<_> = self.locked.range(..=ts).map(|(k, _)| *k).collect();
        for key in matured {
            for stake in self.locked.remove(&key).unwrap_or_default() {
                self.settle(stake, trades, equity);
            }
        }
    }

    /// Release everything still locked at the end of the run.
    fn flush(&mut self, trades: &mut Vec<TradeRecord>, equity: &mut Vec<EquityPoint>) {
        for (_, stakes) in std::mem::take(&mut self.locked) {
            for stake in stakes {
                self.settle(stake, trades, equity);
            }
        }
    }

    fn settle(
        &mut self,
        locked: LockedStake,
        trades: &mut Vec<TradeRecord>,
        equity: &mut Vec<EquityPoint>,
    ) {
        let roi = locked.bet.roi_per_stake();
        self.available += locked.stake * (1.0 + roi);
        self.locked_sum -= locked.stake;
        let pnl = locked.stake * roi - locked.cost;
        trades.push(TradeRecord {
            market_id: locked.bet.market_id.clone(),
            side: locked.bet.side,
            entry_price: locked.bet.entry_price,
            stake: locked.stake,
            pnl,
            roi,
            won: roi > 0.0,
            entry_ts: locked.bet.entry_ts,
            settled_ts: locked.bet.resolution_ts,
            category: locked.bet.category.clone(),
            volume: locked.bet.volume,
        });
        equity.push(EquityPoint {
            ts: locked.bet.resolution_ts,
            capital: self.total(),
        });
    }
}
