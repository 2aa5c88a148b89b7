//! Stake sizing
//!
//! Pure stake computation shared by the backtest simulator and the live
//! pipeline: fixed, fixed-percent, Kelly / half-Kelly and
//! volatility-scaled sizing. Every path floors at the configured minimum
//! stake and never exceeds the caller-supplied available capital or the
//! configured hard cap.

use serde::{Deserialize, Serialize};

use crate::config::{SizingConfig, SizingMethod};
use crate::types::Signal;

/// Intermediate values of a Kelly computation, kept for diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KellyQuote {
    /// Estimated true win probability
    pub p_est: f64,
    /// Net payout odds `(1 - price) / price`
    pub b: f64,
    /// Raw Kelly fraction before clamping
    pub f_raw: f64,
    /// Fraction clamped into [0.01, max_stake_pct]
    pub f_clamped: f64,
    /// Fraction actually applied (after the half/fractional multiplier)
    pub f_applied: f64,
}

/// Heuristic win-probability estimate when no historical win rate exists.
///
/// Assumes a small edge over the market price, growing toward the tails.
pub fn heuristic_win_probability(price: f64) -> f64 {
    (price + 0.01 + 0.10 * (price - 0.5).abs()).clamp(0.05, 0.95)
}

/// Compute the Kelly fraction for a binary bet at `price` with estimated
/// win probability `p_est`. Returns None when there is no positive edge.
pub fn kelly_fraction(p_est: f64, price: f64, max_stake_pct: f64) -> Option<KellyQuote> {
    if !(price > 0.0 && price < 1.0) {
        return None;
    }
    let b = (1.0 - price) / price;
    if b <= 0.0 {
        return None;
    }
    let q = 1.0 - p_est;
    let f_raw = (p_est * b - q) / b;
    if f_raw <= 0.0 {
        // No edge, no bet
        return None;
    }
    let f_clamped = f_raw.clamp(0.01, max_stake_pct.max(0.01));
    Some(KellyQuote {
        p_est,
        b,
        f_raw,
        f_clamped,
        f_applied: f_clamped,
    })
}

/// Stake sizer configured once and shared by both engine halves.
#[derive(Debug, Clone)]
pub struct StakeSizer {
    cfg: SizingConfig,
}

impl StakeSizer {
    pub fn new(cfg: SizingConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.cfg
    }

    /// Minimum stake in USD.
    pub fn min_stake(&self) -> f64 {
        self.cfg.min_size_usd
    }

    /// Size a stake against `capital` for a bet at `price`.
    ///
    /// `win_rate` supplies a historical win-rate estimate for Kelly sizing;
    /// `volatility` supplies realized volatility for volatility scaling.
    /// `available` is the capital the caller is willing to commit; the
    /// result never exceeds it nor the configured max cap.
    pub fn stake(
        &self,
        capital: f64,
        price: f64,
        win_rate: Option<f64>,
        volatility: Option<f64>,
        available: f64,
    ) -> f64 {
        let raw = match self.cfg.method {
            SizingMethod::Fixed => self.cfg.fixed_amount_usd,
            SizingMethod::FixedPct => capital * self.cfg.fixed_pct,
            SizingMethod::Kelly => self.kelly_stake(capital, price, win_rate, self.cfg.kelly_fraction),
            SizingMethod::HalfKelly => self.kelly_stake(capital, price, win_rate, 0.5),
            SizingMethod::VolatilityScaled => match volatility {
                Some(vol) if vol > 0.0 => self.cfg.target_vol * capital / vol,
                _ => self.cfg.min_size_usd,
            },
        };
        self.clamp(raw, available)
    }

    /// Size a live signal. An explicit per-signal size bypasses the
    /// configured method; `strategy_capital` scales `size_pct` overrides.
    pub fn size_signal(
        &self,
        signal: &Signal,
        strategy_capital: f64,
        win_rate: Option<f64>,
        volatility: Option<f64>,
        available: f64,
    ) -> f64 {
        if let Some(usd) = signal.size_usd {
            return self.clamp(usd, available);
        }
        if let Some(pct) = signal.size_pct {
            return self.clamp(strategy_capital * pct, available);
        }
        self.stake(strategy_capital, signal.price, win_rate, volatility, available)
    }

    fn kelly_stake(&self, capital: f64, price: f64, win_rate: Option<f64>, multiplier: f64) -> f64 {
        let p_est = win_rate.unwrap_or_else(|| heuristic_win_probability(price));
        match kelly_fraction(p_est, price, self.cfg.max_stake_pct) {
            Some(quote) => quote.f_clamped * multiplier * capital,
            // Degenerate price or no edge: fall back to the minimum stake
            None => self.cfg.min_size_usd,
        }
    }

    fn clamp(&self, stake: f64, available: f64) -> f64 {
        let cap = self.cfg.max_size_usd.min(available);
        stake.max(self.cfg.min_size_usd).min(cap)
    }
}
