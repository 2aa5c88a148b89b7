//! Core types used throughout BetEngine
//!
//! Defines the shared data model for historical bets, executed trades,
//! live signals and positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "YES" | "Y" => Some(Side::Yes),
            "NO" | "N" => Some(Side::No),
            _ => None,
        }
    }

    /// The opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Resolved outcome of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketOutcome {
    Yes,
    No,
    /// Unresolvable or voided market; positions are refunded at entry
    Unknown,
}

impl MarketOutcome {
    /// Whether the given side is the winning side under this outcome.
    /// Unknown never declares a winner.
    pub fn wins(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (MarketOutcome::Yes, Side::Yes) | (MarketOutcome::No, Side::No)
        )
    }
}

impl fmt::Display for MarketOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketOutcome::Yes => write!(f, "YES"),
            MarketOutcome::No => write!(f, "NO"),
            MarketOutcome::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A single historical betting opportunity with a known outcome.
///
/// Immutable once loaded; the simulator never mutates bets, it only
/// orders and replays them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalBet {
    /// When the bet could have been entered
    pub entry_ts: DateTime<Utc>,
    /// When the market resolved
    pub resolution_ts: DateTime<Utc>,
    /// Market identifier
    pub market_id: String,
    /// Side taken
    pub side: Side,
    /// Entry price in (0, 1)
    pub entry_price: f64,
    /// Realized outcome of the market
    pub outcome: MarketOutcome,
    /// Market category, when known
    pub category: Option<String>,
    /// Market volume in USD, when known
    pub volume: Option<f64>,
}

impl HistoricalBet {
    /// ROI per dollar staked: `1/entry_price - 1` on a win, `-1` on a
    /// loss, `0` for an unresolvable market (the stake is refunded).
    pub fn roi_per_stake(&self) -> f64 {
        match self.outcome {
            MarketOutcome::Unknown => 0.0,
            _ if self.outcome.wins(self.side) => 1.0 / self.entry_price - 1.0,
            _ => -1.0,
        }
    }
}

/// One realized, executed bet inside a backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Market identifier copied from the originating bet
    pub market_id: String,
    /// Side taken
    pub side: Side,
    /// Entry price
    pub entry_price: f64,
    /// Dollar stake
    pub stake: f64,
    /// Net PnL in USD (after per-bet cost)
    pub pnl: f64,
    /// Net ROI on the stake
    pub roi: f64,
    /// Winning trade flag
    pub won: bool,
    /// Entry timestamp
    pub entry_ts: DateTime<Utc>,
    /// Settlement timestamp
    pub settled_ts: DateTime<Utc>,
    /// Category provenance
    pub category: Option<String>,
    /// Volume provenance
    pub volume: Option<f64>,
}

/// (timestamp, capital) sample taken after a settlement event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub capital: f64,
}

/// Candidate trade emitted by a strategy scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal ID
    pub id: String,
    /// When the signal was issued
    pub ts: DateTime<Utc>,
    /// Strategy that produced it
    pub strategy: String,
    /// Target market
    pub market_id: String,
    /// Token to buy
    pub token_id: String,
    /// Side represented by the token
    pub side: Side,
    /// Price at signal time
    pub price: f64,
    /// Best bid at signal time
    pub best_bid: f64,
    /// Best ask at signal time
    pub best_ask: f64,
    /// Estimated edge (model probability minus price)
    pub edge: f64,
    /// Strategy confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Human-readable reason
    pub reason: String,
    /// Explicit dollar size; bypasses the sizing method when set
    #[serde(default)]
    pub size_usd: Option<f64>,
    /// Explicit size as a fraction of the strategy's capital
    #[serde(default)]
    pub size_pct: Option<f64>,
}

/// Lifecycle status of a live position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    Hedged,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
            PositionStatus::Hedged => write!(f, "HEDGED"),
        }
    }
}

/// A live position held in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Position ID
    pub id: String,
    /// Owning strategy
    pub strategy: String,
    /// Market identifier
    pub market_id: String,
    /// Token held
    pub token_id: String,
    /// Side represented by the token
    pub side: Side,
    /// Shares held
    pub shares: f64,
    /// Average entry price per share
    pub avg_entry_price: f64,
    /// shares * avg_entry_price
    pub cost_basis: f64,
    /// Latest observed price
    pub current_price: f64,
    /// shares * current_price
    pub current_value: f64,
    /// current_value - cost_basis
    pub unrealized_pnl: f64,
    /// unrealized_pnl / cost_basis
    pub unrealized_pnl_pct: f64,
    /// Realized PnL once closed
    pub realized_pnl: Option<f64>,
    /// Lifecycle status
    pub status: PositionStatus,
    /// Open timestamp
    pub opened_at: DateTime<Utc>,
    /// Close timestamp, once terminal
    pub closed_at: Option<DateTime<Utc>>,
    /// Non-owning reference to a counter-position when hedged
    pub hedge_position_id: Option<String>,
}

/// Fixed taxonomy of live-signal rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MarketNotTradeable,
    MaxPositions,
    MaxPositionsPerStrategy,
    DuplicatePosition,
    MaxExposure,
    InsufficientBalance,
    DrawdownExceeded,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionReason::MarketNotTradeable => "market_not_tradeable",
            RejectionReason::MaxPositions => "max_positions",
            RejectionReason::MaxPositionsPerStrategy => "max_positions_per_strategy",
            RejectionReason::DuplicatePosition => "duplicate_position",
            RejectionReason::MaxExposure => "max_exposure",
            RejectionReason::InsufficientBalance => "insufficient_balance",
            RejectionReason::DrawdownExceeded => "drawdown_exceeded",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of running one signal through the risk gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub reason: Option<RejectionReason>,
    /// Capital the signal may draw from when approved
    pub available_capital: f64,
    /// Size to execute; explicit requests above available capital are reduced
    pub suggested_size: Option<f64>,
}

impl RiskCheckResult {
    pub fn approve(available_capital: f64, suggested_size: f64) -> Self {
        Self {
            approved: true,
            reason: None,
            available_capital,
            suggested_size: Some(suggested_size),
        }
    }

    pub fn reject(reason: RejectionReason) -> Self {
        Self {
            approved: false,
            reason: Some(reason),
            available_capital: 0.0,
            suggested_size: None,
        }
    }
}

/// Read-only market snapshot supplied by the external scanner each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    /// Market identifier
    pub market_id: String,
    /// Token ID for the YES outcome
    pub token_yes: String,
    /// Token ID for the NO outcome
    pub token_no: String,
    /// Mid price of the YES token
    pub mid: f64,
    /// Best bid
    pub bid: f64,
    /// Best ask
    pub ask: f64,
    /// Liquidity in USD
    pub liquidity_usd: f64,
    /// Hours until market close
    pub hours_to_close: f64,
    /// Category, when known
    pub category: Option<String>,
    /// Whether orders can still be placed (not resolved/closed/blocked)
    pub tradeable: bool,
}

impl MarketData {
    /// Token ID for the given side.
    pub fn token_for(&self, side: Side) -> &str {
        match side {
            Side::Yes => &self.token_yes,
            Side::No => &self.token_no,
        }
    }
}
