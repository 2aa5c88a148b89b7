//! Robustness analysis
//!
//! Re-runs the backtest over partitions of the same bet set to tell a
//! real edge from an artifact of one subset: early versus late bets,
//! high versus low volume, and per-category performance. A split that
//! cannot run for lack of data is reported as such, distinct from a
//! split that ran and failed the edge test.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::{BacktestSimulator, SettlementModel};
use crate::types::HistoricalBet;

/// Outcome of one split check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub name: String,
    /// Whether the check had enough data to run
    pub ran: bool,
    /// Whether the check ran and passed
    pub passed: bool,
    /// Human-readable explanation of the result
    pub reason: String,
    /// Sharpe per partition, for the report
    pub sharpes: Vec<(String, Option<f64>)>,
}

impl SplitOutcome {
    fn insufficient(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            ran: false,
            passed: false,
            reason,
            sharpes: Vec::new(),
        }
    }
}

/// Aggregate robustness verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustnessReport {
    pub splits: Vec<SplitOutcome>,
    /// True only if every requested check ran and passed
    pub overall_passed: bool,
    /// passed / ran, None when nothing could run
    pub pass_rate: Option<f64>,
}

/// Runs the simulator over partitions of a bet set.
pub struct RobustnessAnalyzer<'a> {
    simulator: &'a BacktestSimulator,
    model: SettlementModel,
    min_trades_per_split: usize,
}

impl<'a> RobustnessAnalyzer<'a> {
    pub fn new(
        simulator: &'a BacktestSimulator,
        model: SettlementModel,
        min_trades_per_split: usize,
    ) -> Self {
        Self {
            simulator,
            model,
            min_trades_per_split,
        }
    }

    /// Run all three splits and aggregate.
    pub fn analyze(&self, bets: &[HistoricalBet]) -> RobustnessReport {
        let splits = vec![
            self.time_split(bets),
            self.liquidity_split(bets),
            self.category_split(bets),
        ];

        let ran = splits.iter().filter(|s| s.ran).count();
        let passed = splits.iter().filter(|s| s.passed).count();
        let overall_passed = splits.iter().all(|s| s.ran && s.passed);
        let pass_rate = if ran > 0 {
            Some(passed as f64 / ran as f64)
        } else {
            None
        };

        for split in &splits {
            info!(split = %split.name, ran = split.ran, passed = split.passed, reason = %split.reason, "robustness split");
        }

        RobustnessReport {
            splits,
            overall_passed,
            pass_rate,
        }
    }

    /// Early half versus late half by resolution time. Passes only when
    /// both halves show positive Sharpe.
    pub fn time_split(&self, bets: &[HistoricalBet]) -> SplitOutcome {
        let name = "time_split";
        let mut ordered: Vec<HistoricalBet> = bets.to_vec();
        ordered.sort_by_key(|b| b.resolution_ts);

        let mid = ordered.len() / 2;
        let (early, late) = ordered.split_at(mid);
        if early.len() < self.min_trades_per_split || late.len() < self.min_trades_per_split {
            return SplitOutcome::insufficient(
                name,
                format!(
                    "not enough bets for a time split: {} early / {} late, need {} per half",
                    early.len(),
                    late.len(),
                    self.min_trades_per_split
                ),
            );
        }

        self.both_halves_check(name, &[("early", early), ("late", late)])
    }

    /// High-volume half versus low-volume half at the median volume.
    /// Both halves must show positive Sharpe; bets with unknown volume
    /// are excluded.
    pub fn liquidity_split(&self, bets: &[HistoricalBet]) -> SplitOutcome {
        let name = "liquidity_split";
        let mut known: Vec<HistoricalBet> =
            bets.iter().filter(|b| b.volume.is_some()).cloned().collect();
        if known.len() < 2 * self.min_trades_per_split {
            return SplitOutcome::insufficient(
                name,
                format!(
                    "only {} bets have known volume, need {}",
                    known.len(),
                    2 * self.min_trades_per_split
                ),
            );
        }

        known.sort_by(|a, b| {
            a.volume
                .partial_cmp(&b.volume)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let median = known[known.len() / 2].volume.unwrap_or(0.0);
        let (low, high): (Vec<HistoricalBet>, Vec<HistoricalBet>) = known
            .into_iter()
            .partition(|b| b.volume.unwrap_or(0.0) < median);

        if low.len() < self.min_trades_per_split || high.len() < self.min_trades_per_split {
            return SplitOutcome::insufficient(
                name,
                format!(
                    "volume median leaves {} low / {} high, need {} per half",
                    low.len(),
                    high.len(),
                    self.min_trades_per_split
                ),
            );
        }

        self.both_halves_check(name, &[("low_volume", &low), ("high_volume", &high)])
    }

    /// Per-category backtests. Passes when at least half of the
    /// categories with enough bets show positive Sharpe.
    pub fn category_split(&self, bets: &[HistoricalBet]) -> SplitOutcome {
        let name = "category_split";
        let mut groups: std::collections::BTreeMap<String, Vec<HistoricalBet>> =
            std::collections::BTreeMap::new();
        for bet in bets {
            if let Some(cat) = &bet.category {
                groups.entry(cat.clone()).or_default().push(bet.clone());
            }
        }
        groups.retain(|_, v| v.len() >= self.min_trades_per_split);

        if groups.is_empty() {
            return SplitOutcome::insufficient(
                name,
                format!(
                    "no category has at least {} bets",
                    self.min_trades_per_split
                ),
            );
        }

        let mut sharpes = Vec::new();
        let mut positive = 0usize;
        for (cat, group) in &groups {
            let sharpe = self.sharpe_of(group);
            if matches!(sharpe, Some(s) if s > 0.0) {
                positive += 1;
            }
            sharpes.push((cat.clone(), sharpe));
        }

        let passed = positive * 2 >= groups.len();
        SplitOutcome {
            name: name.to_string(),
            ran: true,
            passed,
            reason: if passed {
                format!("{} of {} categories show positive Sharpe", positive, groups.len())
            } else {
                format!(
                    "edge fails out of sample: only {} of {} categories show positive Sharpe",
                    positive,
                    groups.len()
                )
            },
            sharpes,
        }
    }

    fn both_halves_check(&self, name: &str, halves: &[(&str, &[HistoricalBet])]) -> SplitOutcome {
        let mut sharpes = Vec::new();
        let mut failing = Vec::new();
        for (label, half) in halves {
            let sharpe = self.sharpe_of(half);
            if !matches!(sharpe, Some(s) if s > 0.0) {
                failing.push(label.to_string());
            }
            sharpes.push((label.to_string(), sharpe));
        }
        let passed = failing.is_empty();
        SplitOutcome {
            name: name.to_string(),
            ran: true,
            passed,
            reason: if passed {
                "positive Sharpe in both halves".to_string()
            } else {
                format!("edge fails out of sample: non-positive Sharpe in {}", failing.join(", "))
            },
            sharpes,
        }
    }

    fn sharpe_of(&self, bets: &[HistoricalBet]) -> Option<f64> {
        self.simulator.run(bets, self.model).metrics.sharpe
    }
}
