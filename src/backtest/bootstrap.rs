//! Bootstrap significance check
//!
//! Resamples the per-bet return series with replacement and reports the
//! fraction of resamples whose Sharpe ratio fails to stay positive. A low
//! value means the observed edge is unlikely to be a fluke of ordering or
//! a handful of lucky bets. Seeded RNG keeps the result reproducible run
//! to run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// P-value for the hypothesis that the strategy's true Sharpe is positive:
/// the fraction of `samples` resamples (with replacement) of `returns`
/// whose unannualized Sharpe is zero or negative.
///
/// Returns None when the input has fewer than two observations or zero
/// variance, where a Sharpe ratio is undefined.
pub fn bootstrap_p_value(returns: &[f64], samples: usize, seed: u64) -> Option<f64> {
    let n = returns.len();
    if n < 2 || samples == 0 {
        return None;
    }
    sharpe(returns)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut resample = vec![0.0_f64; n];
    let mut non_positive = 0usize;
    for _ in 0..samples {
        for slot in resample.iter_mut() {
            *slot = returns[rng.gen_range(0..n)];
        }
        match sharpe(&resample) {
            Some(s) if s > 0.0 => {}
            // Degenerate resamples (all identical draws) count against
            // the edge rather than being discarded
            _ => non_positive += 1,
        }
    }
    Some(non_positive as f64 / samples as f64)
}

fn sharpe(returns: &[f64]) -> Option<f64> {
    let n = returns.len();
    if n < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    if var <= 0.0 {
        return None;
    }
    Some(mean / var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_fixed_seed() {
        let returns: Vec<f64> = (0..30)
            .map(|i| if i % 3 == 0 { -1.0 } else { 0.8 })
            .collect();
        let a = bootstrap_p_value(&returns, 500, 42);
        let b = bootstrap_p_value(&returns, 500, 42);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn different_seeds_may_differ_but_stay_in_range() {
        let returns: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { -0.5 } else { 0.6 })
            .collect();
        for seed in [1, 2, 3] {
            let p = bootstrap_p_value(&returns, 300, seed).unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn strong_edge_gives_small_p_value() {
        // 80% winners at +0.5, 20% losers at -1.0: clearly positive mean
        let returns: Vec<f64> = (0..100)
            .map(|i| if i % 5 == 0 { -1.0 } else { 0.5 })
            .collect();
        let p = bootstrap_p_value(&returns, 1000, 42).unwrap();
        assert!(p < 0.05, "expected significant edge, got p={}", p);
    }

    #[test]
    fn pure_noise_gives_large_p_value() {
        // Symmetric wins and losses: no edge
        let returns: Vec<f64> = (0..100)
            .map(|i| if i % 2 == 0 { -0.5 } else { 0.5 })
            .collect();
        let p = bootstrap_p_value(&returns, 1000, 42).unwrap();
        assert!(p > 0.2, "expected insignificant edge, got p={}", p);
    }

    #[test]
    fn undefined_for_degenerate_input() {
        assert!(bootstrap_p_value(&[], 100, 42).is_none());
        assert!(bootstrap_p_value(&[0.5], 100, 42).is_none());
        assert!(bootstrap_p_value(&[0.5, 0.5, 0.5], 100, 42).is_none());
    }
}
