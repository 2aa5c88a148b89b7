//! Risk gate - pre-trade checks and exposure limits
//!
//! Every live signal passes through a fixed, ordered rule chain before
//! execution. The first failing rule rejects the signal with a reason
//! from the fixed taxonomy; a signal that survives all rules is approved
//! with the capital it may draw from.
//!
//! Batches are checked sequentially: the exposure and balance consumed
//! by an earlier approval in the same batch is visible to every later
//! check, so limits cannot be double-spent within one cycle.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::RiskLimits;
use crate::types::{
    MarketData, Position, PositionStatus, RejectionReason, RiskCheckResult, Signal,
};

/// Read-only view of the portfolio at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct PortfolioSnapshot {
    /// Global cash balance, also the fallback when a strategy has no
    /// dedicated balance
    pub cash: f64,
    /// Highest total portfolio value seen so far
    pub high_water_mark: f64,
    /// Per-strategy balances, when strategies run segregated capital
    pub strategy_balances: HashMap<String, f64>,
    /// All currently open positions
    pub open_positions: Vec<Position>,
}

impl PortfolioSnapshot {
    /// cash + current value of all open positions
    pub fn total_value(&self) -> f64 {
        self.cash
            + self
                .open_positions
                .iter()
                .filter(|p| p.status == PositionStatus::Open)
                .map(|p| p.current_value)
                .sum::<f64>()
    }

    /// Cost basis committed to open positions
    pub fn exposure(&self) -> f64 {
        self.open_positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.cost_basis)
            .sum()
    }

    /// Fractional drawdown from the high-water mark
    pub fn drawdown(&self) -> f64 {
        if self.high_water_mark <= 0.0 {
            return 0.0;
        }
        ((self.high_water_mark - self.total_value()) / self.high_water_mark).max(0.0)
    }
}

/// Mutable per-batch state: the snapshot plus the cumulative effect of
/// approvals committed so far in this batch.
#[derive(Debug, Clone)]
pub struct BatchState {
    exposure: f64,
    open_total: usize,
    per_strategy: HashMap<String, usize>,
    open_keys: HashSet<(String, String)>,
    strategy_balances: HashMap<String, f64>,
    cash: f64,
}

impl BatchState {
    pub fn from_snapshot(snapshot: &PortfolioSnapshot) -> Self {
        let mut per_strategy: HashMap<String, usize> = HashMap::new();
        let mut open_keys = HashSet::new();
        let mut open_total = 0usize;
        for pos in &snapshot.open_positions {
            if pos.status != PositionStatus::Open {
                continue;
            }
            open_total += 1;
            *per_strategy.entry(pos.strategy.clone()).or_insert(0) += 1;
            open_keys.insert((pos.strategy.clone(), pos.market_id.clone()));
        }
        Self {
            exposure: snapshot.exposure(),
            open_total,
            per_strategy,
            open_keys,
            strategy_balances: snapshot.strategy_balances.clone(),
            cash: snapshot.cash,
        }
    }

    /// Balance the strategy can draw from, falling back to global cash.
    fn balance_for(&self, strategy: &str) -> f64 {
        self.strategy_balances
            .get(strategy)
            .copied()
            .unwrap_or(self.cash)
    }

    /// Record an executed approval so later checks in the batch see it.
    pub fn commit(&mut self, signal: &Signal, stake: f64) {
        self.exposure += stake;
        self.open_total += 1;
        *self.per_strategy.entry(signal.strategy.clone()).or_insert(0) += 1;
        self.open_keys
            .insert((signal.strategy.clone(), signal.market_id.clone()));
        match self.strategy_balances.get_mut(&signal.strategy) {
            Some(balance) => *balance -= stake,
            None => self.cash -= stake,
        }
    }
}

/// Ordered pre-trade rule chain.
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Run one signal through the rule chain against the current batch
    /// state. Does not consume anything; the caller commits the final
    /// stake via [`BatchState::commit`] after execution.
    pub fn check(
        &self,
        signal: &Signal,
        markets: &HashMap<String, MarketData>,
        snapshot: &PortfolioSnapshot,
        batch: &BatchState,
    ) -> RiskCheckResult {
        // 1. Market must still be tradeable; the market can resolve or
        //    close between scan and execution
        let tradeable = markets
            .get(&signal.market_id)
            .map(|m| m.tradeable)
            .unwrap_or(false);
        if !tradeable {
            return self.rejected(signal, RejectionReason::MarketNotTradeable);
        }

        // 2. Per-strategy open-position cap, 0 means unlimited
        if self.limits.max_positions_per_strategy > 0 {
            let count = batch
                .per_strategy
                .get(&signal.strategy)
                .copied()
                .unwrap_or(0);
            if count >= self.limits.max_positions_per_strategy {
                return self.rejected(signal, RejectionReason::MaxPositionsPerStrategy);
            }
        }

        // 3. Global open-position cap
        if batch.open_total >= self.limits.max_positions {
            return self.rejected(signal, RejectionReason::MaxPositions);
        }

        // 4. One open position per (strategy, market)
        let key = (signal.strategy.clone(), signal.market_id.clone());
        if batch.open_keys.contains(&key) {
            return self.rejected(signal, RejectionReason::DuplicatePosition);
        }

        // 5. Exposure headroom
        let headroom = self.limits.max_total_exposure_usd - batch.exposure;
        if headroom <= 0.0 {
            return self.rejected(signal, RejectionReason::MaxExposure);
        }

        // 6. The strategy must have capital left
        let balance = batch.balance_for(&signal.strategy);
        if balance <= 0.0 {
            return self.rejected(signal, RejectionReason::InsufficientBalance);
        }

        // 7. Portfolio drawdown within limit
        if snapshot.drawdown() >= self.limits.max_drawdown_pct {
            return self.rejected(signal, RejectionReason::DrawdownExceeded);
        }

        let available = balance.min(headroom).min(self.limits.max_position_usd);
        // An explicit request above the available capital is reduced,
        // never rejected for size alone
        let suggested = match signal.size_usd {
            Some(requested) => requested.min(available),
            None => available,
        };
        RiskCheckResult::approve(available, suggested)
    }

    /// Check a whole batch sequentially, committing each approval's
    /// suggested size so later checks observe it.
    pub fn check_batch(
        &self,
        signals: &[Signal],
        markets: &HashMap<String, MarketData>,
        snapshot: &PortfolioSnapshot,
    ) -> Vec<RiskCheckResult> {
        let mut batch = BatchState::from_snapshot(snapshot);
        signals
            .iter()
            .map(|signal| {
                let result = self.check(signal, markets, snapshot, &batch);
                if result.approved {
                    if let Some(stake) = result.suggested_size {
                        batch.commit(signal, stake);
                    }
                }
                result
            })
            .collect()
    }

    fn rejected(&self, signal: &Signal, reason: RejectionReason) -> RiskCheckResult {
        debug!(
            strategy = %signal.strategy,
            market = %signal.market_id,
            reason = %reason,
            "signal rejected"
        );
        RiskCheckResult::reject(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::Utc;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_position_usd: 100.0,
            max_total_exposure_usd: 500.0,
            max_positions: 10,
            max_positions_per_strategy: 0,
            max_drawdown_pct: 0.20,
        }
    }

    fn market(id: &str, tradeable: bool) -> MarketData {
        MarketData {
            market_id: id.to_string(),
            token_yes: format!("{}-yes", id),
            token_no: format!("{}-no", id),
            mid: 0.5,
            bid: 0.49,
            ask: 0.51,
            liquidity_usd: 10_000.0,
            hours_to_close: 48.0,
            category: None,
            tradeable,
        }
    }

    fn markets(ids: &[&str]) -> HashMap<String, MarketData> {
        ids.iter()
            .map(|id| (id.to_string(), market(id, true)))
            .collect()
    }

    fn signal(strategy: &str, market_id: &str, size_usd: Option<f64>) -> Signal {
        Signal {
            id: format!("sig-{}-{}", strategy, market_id),
            ts: Utc::now(),
            strategy: strategy.to_string(),
            market_id: market_id.to_string(),
            token_id: format!("{}-yes", market_id),
            side: Side::Yes,
            price: 0.5,
            best_bid: 0.49,
            best_ask: 0.51,
            edge: 0.05,
            confidence: 0.8,
            reason: "test".to_string(),
            size_usd,
            size_pct: None,
        }
    }

    fn open_position(strategy: &str, market_id: &str, cost: f64) -> Position {
        Position {
            id: format!("pos-{}-{}", strategy, market_id),
            strategy: strategy.to_string(),
            market_id: market_id.to_string(),
            token_id: format!("{}-yes", market_id),
            side: Side::Yes,
            shares: cost / 0.5,
            avg_entry_price: 0.5,
            cost_basis: cost,
            current_price: 0.5,
            current_value: cost,
            unrealized_pnl: 0.0,
            unrealized_pnl_pct: 0.0,
            realized_pnl: None,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            hedge_position_id: None,
        }
    }

    fn snapshot(cash: f64, positions: Vec<Position>) -> PortfolioSnapshot {
        let snapshot = PortfolioSnapshot {
            cash,
            high_water_mark: 0.0,
            strategy_balances: HashMap::new(),
            open_positions: positions,
        };
        PortfolioSnapshot {
            high_water_mark: snapshot.total_value(),
            ..snapshot
        }
    }

    #[test]
    fn clean_signal_is_approved() {
        let gate = RiskGate::new(limits());
        let snap = snapshot(1000.0, vec![]);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-1", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert!(results[0].approved);
        assert_eq!(results[0].available_capital, 100.0); // max_position_usd binds
    }

    #[test]
    fn untradeable_market_rejected_first() {
        let gate = RiskGate::new(limits());
        let snap = snapshot(0.0, vec![]); // would also fail balance
        let mut mkts = markets(&[]);
        mkts.insert("mkt-1".to_string(), market("mkt-1", false));
        let results = gate.check_batch(&[signal("momentum", "mkt-1", None)], &mkts, &snap);
        assert_eq!(
            results[0].reason,
            Some(RejectionReason::MarketNotTradeable)
        );
    }

    #[test]
    fn unknown_market_is_not_tradeable() {
        let gate = RiskGate::new(limits());
        let snap = snapshot(1000.0, vec![]);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-unknown", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert_eq!(
            results[0].reason,
            Some(RejectionReason::MarketNotTradeable)
        );
    }

    #[test]
    fn duplicate_position_rejected() {
        let gate = RiskGate::new(limits());
        let snap = snapshot(1000.0, vec![open_position("momentum", "mkt-1", 50.0)]);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-1", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert_eq!(results[0].reason, Some(RejectionReason::DuplicatePosition));

        // A different strategy on the same market is fine
        let results = gate.check_batch(
            &[signal("contrarian", "mkt-1", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert!(results[0].approved);
    }

    #[test]
    fn per_strategy_limit_zero_means_unlimited() {
        let gate = RiskGate::new(limits());
        let positions = (0..5)
            .map(|i| open_position("momentum", &format!("mkt-{}", i), 10.0))
            .collect();
        let snap = snapshot(1000.0, positions);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-9", None)],
            &markets(&["mkt-9"]),
            &snap,
        );
        assert!(results[0].approved);
    }

    #[test]
    fn per_strategy_limit_enforced() {
        let mut lim = limits();
        lim.max_positions_per_strategy = 1;
        let gate = RiskGate::new(lim);
        let snap = snapshot(1000.0, vec![open_position("momentum", "mkt-1", 10.0)]);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-2", None)],
            &markets(&["mkt-2"]),
            &snap,
        );
        assert_eq!(
            results[0].reason,
            Some(RejectionReason::MaxPositionsPerStrategy)
        );
    }

    #[test]
    fn global_position_limit() {
        let mut lim = limits();
        lim.max_positions = 2;
        let gate = RiskGate::new(lim);
        let snap = snapshot(
            1000.0,
            vec![
                open_position("a", "mkt-1", 10.0),
                open_position("b", "mkt-2", 10.0),
            ],
        );
        let results = gate.check_batch(
            &[signal("c", "mkt-3", None)],
            &markets(&["mkt-3"]),
            &snap,
        );
        assert_eq!(results[0].reason, Some(RejectionReason::MaxPositions));
    }

    #[test]
    fn exposure_headroom_binds_available_capital() {
        let gate = RiskGate::new(limits());
        // 460 of 500 exposure used: headroom 40 < max_position 100
        let snap = snapshot(1000.0, vec![open_position("a", "mkt-1", 460.0)]);
        let results = gate.check_batch(
            &[signal("b", "mkt-2", None)],
            &markets(&["mkt-2"]),
            &snap,
        );
        assert!(results[0].approved);
        assert_eq!(results[0].available_capital, 40.0);
    }

    #[test]
    fn exhausted_exposure_rejects() {
        let gate = RiskGate::new(limits());
        let snap = snapshot(1000.0, vec![open_position("a", "mkt-1", 500.0)]);
        let results = gate.check_batch(
            &[signal("b", "mkt-2", None)],
            &markets(&["mkt-2"]),
            &snap,
        );
        assert_eq!(results[0].reason, Some(RejectionReason::MaxExposure));
    }

    #[test]
    fn batch_approvals_consume_exposure_sequentially() {
        let gate = RiskGate::new(limits());
        // Headroom 150: first approval takes 100, second sees 50
        let snap = snapshot(1000.0, vec![open_position("a", "mkt-0", 350.0)]);
        let signals = vec![
            signal("b", "mkt-1", Some(100.0)),
            signal("b", "mkt-2", Some(100.0)),
            signal("b", "mkt-3", Some(100.0)),
        ];
        let results = gate.check_batch(&signals, &markets(&["mkt-1", "mkt-2", "mkt-3"]), &snap);
        assert!(results[0].approved);
        assert_eq!(results[0].suggested_size, Some(100.0));
        assert!(results[1].approved);
        assert_eq!(results[1].suggested_size, Some(50.0));
        assert_eq!(results[2].reason, Some(RejectionReason::MaxExposure));
    }

    #[test]
    fn oversized_request_reduced_not_rejected() {
        let gate = RiskGate::new(limits());
        let mut snap = snapshot(1000.0, vec![]);
        snap.strategy_balances.insert("momentum".to_string(), 50.0);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-1", Some(100.0))],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert!(results[0].approved);
        assert_eq!(results[0].available_capital, 50.0);
        assert_eq!(results[0].suggested_size, Some(50.0));
    }

    #[test]
    fn zero_balance_rejects() {
        let gate = RiskGate::new(limits());
        let mut snap = snapshot(1000.0, vec![]);
        snap.strategy_balances.insert("momentum".to_string(), 0.0);
        let results = gate.check_batch(
            &[signal("momentum", "mkt-1", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert_eq!(
            results[0].reason,
            Some(RejectionReason::InsufficientBalance)
        );
    }

    #[test]
    fn drawdown_at_threshold_rejects() {
        let gate = RiskGate::new(limits());
        // HWM 1000, value 800: drawdown exactly 0.20 rejects
        let mut snap = snapshot(800.0, vec![]);
        snap.high_water_mark = 1000.0;
        let results = gate.check_batch(
            &[signal("momentum", "mkt-1", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert_eq!(results[0].reason, Some(RejectionReason::DrawdownExceeded));

        // Just inside the limit passes
        snap.cash = 801.0;
        let results = gate.check_batch(
            &[signal("momentum", "mkt-1", None)],
            &markets(&["mkt-1"]),
            &snap,
        );
        assert!(results[0].approved);
    }

    #[test]
    fn identical_state_gives_identical_first_failure() {
        let gate = RiskGate::new(limits());
        let snap = snapshot(1000.0, vec![open_position("momentum", "mkt-1", 500.0)]);
        let sig = signal("momentum", "mkt-1", None);
        let mkts = markets(&["mkt-1"]);
        // Duplicate (rule 4) fires before exposure (rule 5), every time
        for _ in 0..5 {
            let results = gate.check_batch(&[sig.clone()], &mkts, &snap);
            assert_eq!(results[0].reason, Some(RejectionReason::DuplicatePosition));
        }
    }
}
