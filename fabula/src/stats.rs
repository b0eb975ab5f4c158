// src/stats.rs
//
// Deterministic ensemble statistics.
// - OnlineStats: Welford running mean/variance with min/max
// - quantile_floor_sorted: floor-index percentile used for Monte Carlo bands
//
// Non-finite samples are dropped everywhere; ordering uses `total_cmp` so the
// result never depends on input order.

use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for OnlineStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl OnlineStats {
    /// Adds a sample if finite.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let delta = x - self.mean;
        self.mean += delta / (self.n as f64);
        self.m2 += delta * (x - self.mean);
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Population variance (divide by n).
    pub fn variance_population(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.m2 / (self.n as f64)
        }
    }

    pub fn stddev_population(&self) -> f64 {
        self.variance_population().sqrt()
    }

    pub fn summary(&self) -> StatSummary {
        StatSummary {
            n: self.n,
            mean: self.mean(),
            std_pop: self.stddev_population(),
            min: self.min(),
            max: self.max(),
        }
    }
}

impl FromIterator<f64> for OnlineStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = OnlineStats::default();
        for x in iter {
            s.add(x);
        }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatSummary {
    pub n: u64,
    pub mean: f64,
    pub std_pop: f64,
    pub min: f64,
    pub max: f64,
}

/// Finite samples, ascending.
pub fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

/// Element at index `clamp(floor(q·(n−1)), 0, n−1)` of an ascending slice.
/// No interpolation. Returns 0 for an empty slice.
pub fn quantile_floor_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let q = if q.is_finite() { q.clamp(0.0, 1.0) } else { 0.0 };
    let idx = ((q * (n - 1) as f64).floor() as usize).min(n - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_direct() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let s: OnlineStats = xs.iter().copied().collect();
        assert_eq!(s.n(), 8);
        assert!((s.mean() - 5.0).abs() < 1e-12);
        assert!((s.stddev_population() - 2.0).abs() < 1e-12);
        assert_eq!(s.min(), 2.0);
        assert_eq!(s.max(), 9.0);
    }

    #[test]
    fn non_finite_ignored() {
        let s: OnlineStats = [1.0, f64::NAN, 3.0, f64::INFINITY].into_iter().collect();
        assert_eq!(s.n(), 2);
        assert_eq!(s.mean(), 2.0);
        assert_eq!(OnlineStats::default().summary().min, 0.0);
    }

    #[test]
    fn floor_quantile_picks_lower_element() {
        let v = sorted_finite(&[5.0, 1.0, 4.0, 2.0, 3.0]);
        assert_eq!(v, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        // n-1 = 4: 0.1*4 = 0.4 -> 0; 0.5*4 = 2; 0.9*4 = 3.6 -> 3
        assert_eq!(quantile_floor_sorted(&v, 0.1), 1.0);
        assert_eq!(quantile_floor_sorted(&v, 0.5), 3.0);
        assert_eq!(quantile_floor_sorted(&v, 0.9), 4.0);
        assert_eq!(quantile_floor_sorted(&v, 1.0), 5.0);
        assert_eq!(quantile_floor_sorted(&[], 0.5), 0.0);
    }
}
