//! Strategies - market filtering and signal generation
//!
//! A strategy sees the cycle's market snapshots and emits candidate
//! signals; it never executes anything itself. Strategies are registered
//! by name and built once at engine startup from the configuration.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::sizing::heuristic_win_probability;
use crate::types::{MarketData, Side, Signal};

/// A signal source polled once per cycle.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name, used for position attribution and balances.
    fn name(&self) -> &str;

    /// Whether this strategy wants to look at the market at all.
    fn filter(&self, market: &MarketData) -> bool;

    /// Scan the filtered markets and emit signals.
    async fn scan(&self, markets: &[MarketData]) -> Result<Vec<Signal>>;
}

/// Buys the side whose estimated win probability exceeds its price by a
/// configured edge. The estimate leans on the favorite-longshot bias:
/// favorites tend to be slightly underpriced and longshots overpriced.
pub struct PriceEdgeStrategy {
    min_edge: f64,
    min_liquidity_usd: f64,
    max_hours_to_close: f64,
}

impl PriceEdgeStrategy {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            min_edge: 0.02,
            min_liquidity_usd: cfg.filters.min_liquidity_usd,
            max_hours_to_close: 24.0 * 14.0,
        }
    }

    fn evaluate(&self, market: &MarketData, side: Side) -> Option<Signal> {
        let price = match side {
            Side::Yes => market.mid,
            Side::No => 1.0 - market.mid,
        };
        if !(0.05..=0.95).contains(&price) {
            return None;
        }
        let p_est = heuristic_win_probability(price);
        let edge = p_est - price;
        if edge < self.min_edge {
            return None;
        }
        Some(Signal {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            strategy: self.name().to_string(),
            market_id: market.market_id.clone(),
            token_id: market.token_for(side).to_string(),
            side,
            price,
            best_bid: market.bid,
            best_ask: market.ask,
            edge,
            confidence: (edge / 0.10).min(1.0),
            reason: format!("price {:.2} below estimated probability {:.2}", price, p_est),
            size_usd: None,
            size_pct: None,
        })
    }
}

#[async_trait]
impl Strategy for PriceEdgeStrategy {
    fn name(&self) -> &str {
        "price_edge"
    }

    fn filter(&self, market: &MarketData) -> bool {
        market.tradeable
            && market.liquidity_usd >= self.min_liquidity_usd
            && market.hours_to_close <= self.max_hours_to_close
    }

    async fn scan(&self, markets: &[MarketData]) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for market in markets {
            // At most one side can have positive edge at a time
            if let Some(signal) = self
                .evaluate(market, Side::Yes)
                .or_else(|| self.evaluate(market, Side::No))
            {
                signals.push(signal);
            }
        }
        Ok(signals)
    }
}

/// Fades heavy favorites close to resolution: near-certain markets often
/// trade a touch above fair value, so it takes the cheap side.
pub struct LateFadeStrategy {
    min_liquidity_usd: f64,
    max_hours_to_close: f64,
    min_favorite_price: f64,
}

impl LateFadeStrategy {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            min_liquidity_usd: cfg.filters.min_liquidity_usd,
            max_hours_to_close: 48.0,
            min_favorite_price: 0.90,
        }
    }
}

#[async_trait]
impl Strategy for LateFadeStrategy {
    fn name(&self) -> &str {
        "late_fade"
    }

    fn filter(&self, market: &MarketData) -> bool {
        market.tradeable
            && market.liquidity_usd >= self.min_liquidity_usd
            && market.hours_to_close <= self.max_hours_to_close
    }

    async fn scan(&self, markets: &[MarketData]) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for market in markets {
            let (side, price) = if market.mid >= self.min_favorite_price {
                (Side::No, 1.0 - market.mid)
            } else if market.mid <= 1.0 - self.min_favorite_price {
                (Side::Yes, market.mid)
            } else {
                continue;
            };
            if price <= 0.0 {
                continue;
            }
            signals.push(Signal {
                id: Uuid::new_v4().to_string(),
                ts: Utc::now(),
                strategy: self.name().to_string(),
                market_id: market.market_id.clone(),
                token_id: market.token_for(side).to_string(),
                side,
                price,
                best_bid: market.bid,
                best_ask: market.ask,
                edge: 0.02,
                confidence: 0.5,
                reason: format!("fading favorite at {:.2} near close", market.mid),
                size_usd: None,
                size_pct: None,
            });
        }
        Ok(signals)
    }
}

/// Build the configured strategies by name. Unknown names are logged and
/// skipped rather than failing startup.
pub fn build_strategies(names: &[String], cfg: &EngineConfig) -> Vec<Box<dyn Strategy>> {
    let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
    for name in names {
        match name.as_str() {
            "price_edge" => strategies.push(Box::new(PriceEdgeStrategy::new(cfg))),
            "late_fade" => strategies.push(Box::new(LateFadeStrategy::new(cfg))),
            other => warn!(strategy = other, "unknown strategy name, skipping"),
        }
    }
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, mid: f64, liquidity: f64, hours: f64) -> MarketData {
        MarketData {
            market_id: id.to_string(),
            token_yes: format!("{}-yes", id),
            token_no: format!("{}-no", id),
            mid,
            bid: mid - 0.01,
            ask: mid + 0.01,
            liquidity_usd: liquidity,
            hours_to_close: hours,
            category: None,
            tradeable: true,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn price_edge_emits_on_sufficient_edge() {
        let strategy = PriceEdgeStrategy::new(&config());
        // At mid 0.80 the heuristic estimate is 0.84: 4% edge on YES
        let markets = vec![market("mkt-1", 0.80, 10_000.0, 48.0)];
        let signals = strategy.scan(&markets).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Yes);
        assert!(signals[0].edge >= 0.02);
        assert_eq!(signals[0].token_id, "mkt-1-yes");
    }

    #[tokio::test]
    async fn price_edge_quiet_without_edge() {
        let strategy = PriceEdgeStrategy::new(&config());
        // At mid 0.50 the estimate is 0.51: below the 2% edge floor on
        // either side
        let markets = vec![market("mkt-1", 0.50, 10_000.0, 48.0)];
        let signals = strategy.scan(&markets).await.unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn filter_enforces_liquidity_and_horizon() {
        let strategy = PriceEdgeStrategy::new(&config());
        assert!(strategy.filter(&market("a", 0.5, 10_000.0, 48.0)));
        assert!(!strategy.filter(&market("b", 0.5, 10.0, 48.0)));
        assert!(!strategy.filter(&market("c", 0.5, 10_000.0, 24.0 * 60.0)));

        let mut closed = market("d", 0.5, 10_000.0, 48.0);
        closed.tradeable = false;
        assert!(!strategy.filter(&closed));
    }

    #[tokio::test]
    async fn late_fade_takes_the_cheap_side() {
        let strategy = LateFadeStrategy::new(&config());
        let markets = vec![
            market("fav", 0.95, 10_000.0, 12.0),
            market("dog", 0.04, 10_000.0, 12.0),
            market("mid", 0.50, 10_000.0, 12.0),
        ];
        let signals = strategy.scan(&markets).await.unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].side, Side::No);
        assert!((signals[0].price - 0.05).abs() < 1e-9);
        assert_eq!(signals[1].side, Side::Yes);
    }

    #[test]
    fn registry_skips_unknown_names() {
        let cfg = config();
        let strategies = build_strategies(
            &[
                "price_edge".to_string(),
                "no_such_strategy".to_string(),
                "late_fade".to_string(),
            ],
            &cfg,
        );
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].name(), "price_edge");
        assert_eq!(strategies[1].name(), "late_fade");
    }
}
