//! Position ledger
//!
//! Tracks the lifecycle of live positions: open on execution, mark to
//! market on price ticks, close manually at an exit price or atomically
//! when the underlying market resolves, and link hedges. At most one
//! OPEN position may exist per (strategy, market) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::types::{MarketData, MarketOutcome, Position, PositionStatus, Side};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("position {0} not found")]
    NotFound(String),
    #[error("position {0} is not open")]
    NotOpen(String),
    #[error("strategy {strategy} already holds an open position in market {market_id}")]
    DuplicateOpen { strategy: String, market_id: String },
}

/// One closed position from a market resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub position_id: String,
    pub strategy: String,
    pub market_id: String,
    pub side: Side,
    /// 1.0 for the winning token, 0.0 for the losing one, the entry
    /// price when the market is unresolvable
    pub payout_per_share: f64,
    pub realized_pnl: f64,
}

/// In-memory ledger of all positions, open and closed.
#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: HashMap<String, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a position from a filled order.
    pub fn open(
        &mut self,
        strategy: &str,
        market_id: &str,
        token_id: &str,
        side: Side,
        shares: f64,
        entry_price: f64,
        ts: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        if self
            .positions
            .values()
            .any(|p| p.status == PositionStatus::Open && p.strategy == strategy && p.market_id == market_id)
        {
            return Err(LedgerError::DuplicateOpen {
                strategy: strategy.to_string(),
                market_id: market_id.to_string(),
            });
        }

        let cost_basis = shares * entry_price;
        let position = Position {
            id: Uuid::new_v4().to_string(),
            strategy: strategy.to_string(),
            market_id: market_id.to_string(),
            token_id: token_id.to_string(),
            side,
            shares,
            avg_entry_price: entry_price,
            cost_basis,
            current_price: entry_price,
            current_value: cost_basis,
            unrealized_pnl: 0.0,
            unrealized_pnl_pct: 0.0,
            realized_pnl: None,
            status: PositionStatus::Open,
            opened_at: ts,
            closed_at: None,
            hedge_position_id: None,
        };
        info!(
            strategy,
            market = market_id,
            side = %side,
            shares = format!("{:.2}", shares),
            price = entry_price,
            "position opened"
        );
        self.positions.insert(position.id.clone(), position.clone());
        Ok(position)
    }

    /// Mark all open positions on a market to the latest prices. The NO
    /// token trades at one minus the YES mid.
    pub fn update_prices(&mut self, market: &MarketData) {
        for position in self.positions.values_mut() {
            if position.status != PositionStatus::Open || position.market_id != market.market_id {
                continue;
            }
            let price = match position.side {
                Side::Yes => market.mid,
                Side::No => 1.0 - market.mid,
            };
            position.current_price = price;
            position.current_value = position.shares * price;
            position.unrealized_pnl = position.current_value - position.cost_basis;
            position.unrealized_pnl_pct = if position.cost_basis > 0.0 {
                position.unrealized_pnl / position.cost_basis
            } else {
                0.0
            };
        }
    }

    /// Close a position at an explicit exit price.
    pub fn close(
        &mut self,
        position_id: &str,
        exit_price: f64,
        ts: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        let position = self
            .positions
            .get_mut(position_id)
            .ok_or_else(|| LedgerError::NotFound(position_id.to_string()))?;
        if position.status != PositionStatus::Open {
            return Err(LedgerError::NotOpen(position_id.to_string()));
        }

        let proceeds = position.shares * exit_price;
        let realized = proceeds - position.cost_basis;
        position.current_price = exit_price;
        position.current_value = proceeds;
        position.unrealized_pnl = 0.0;
        position.unrealized_pnl_pct = 0.0;
        position.realized_pnl = Some(realized);
        position.status = PositionStatus::Closed;
        position.closed_at = Some(ts);
        info!(
            position = position_id,
            pnl = format!("{:.2}", realized),
            "position closed"
        );
        Ok(position.clone())
    }

    /// Close every open position on a resolved market in one pass,
    /// returning one record per position. An unknown or invalid outcome
    /// refunds each position at its entry price.
    pub fn close_resolved(
        &mut self,
        market_id: &str,
        outcome: MarketOutcome,
        ts: DateTime<Utc>,
    ) -> Vec<ResolutionRecord> {
        let mut records = Vec::new();
        for position in self.positions.values_mut() {
            if position.status != PositionStatus::Open || position.market_id != market_id {
                continue;
            }
            let payout_per_share = match outcome {
                MarketOutcome::Unknown => position.avg_entry_price,
                _ if outcome.wins(position.side) => 1.0,
                _ => 0.0,
            };
            let proceeds = position.shares * payout_per_share;
            let realized = proceeds - position.cost_basis;
            position.current_price = payout_per_share;
            position.current_value = proceeds;
            position.unrealized_pnl = 0.0;
            position.unrealized_pnl_pct = 0.0;
            position.realized_pnl = Some(realized);
            position.status = PositionStatus::Closed;
            position.closed_at = Some(ts);
            records.push(ResolutionRecord {
                position_id: position.id.clone(),
                strategy: position.strategy.clone(),
                market_id: position.market_id.clone(),
                side: position.side,
                payout_per_share,
                realized_pnl: realized,
            });
        }
        if !records.is_empty() {
            info!(
                market = market_id,
                outcome = %outcome,
                closed = records.len(),
                "market resolved"
            );
        }
        records
    }

    /// Mark a position as hedged by another. The reference is a plain
    /// ID; the counter-position keeps its own lifecycle.
    pub fn link_hedge(
        &mut self,
        position_id: &str,
        hedge_position_id: &str,
    ) -> Result<(), LedgerError> {
        if !self.positions.contains_key(hedge_position_id) {
            return Err(LedgerError::NotFound(hedge_position_id.to_string()));
        }
        let position = self
            .positions
            .get_mut(position_id)
            .ok_or_else(|| LedgerError::NotFound(position_id.to_string()))?;
        if position.status != PositionStatus::Open {
            return Err(LedgerError::NotOpen(position_id.to_string()));
        }
        position.status = PositionStatus::Hedged;
        position.hedge_position_id = Some(hedge_position_id.to_string());
        Ok(())
    }

    pub fn get(&self, position_id: &str) -> Option<&Position> {
        self.positions.get(position_id)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    pub fn all_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Sum of realized PnL over closed positions.
    pub fn total_realized_pnl(&self) -> f64 {
        self.positions
            .values()
            .filter_map(|p| p.realized_pnl)
            .sum()
    }
}
