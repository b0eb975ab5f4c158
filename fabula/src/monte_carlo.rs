// src/monte_carlo.rs
//
// Monte Carlo runner: repeat one resolved scenario under seeds
// `base_seed + i` and reduce the ensemble to per-day percentile bands.
//
// Runs may execute on a rayon pool. Each run owns its state and RNG and
// results are collected in run-index order, so output is bit-identical to a
// sequential execution regardless of thread count.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{FabulaError, RunWarning};
use crate::output::series_checksum;
use crate::simulator::{RunOutput, Simulator};
use crate::stats::{quantile_floor_sorted, sorted_finite, OnlineStats, StatSummary};
use crate::types::{Day, MetricKey, SeriesPoint};

pub const P10: f64 = 0.10;
pub const P50: f64 = 0.50;
pub const P90: f64 = 0.90;

/// Per-day percentile band for one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Band {
    pub p10: Vec<f64>,
    pub p50: Vec<f64>,
    pub p90: Vec<f64>,
}

/// Compact record of one ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDigest {
    pub run_index: u64,
    pub seed: u64,
    pub quarantined_on: Option<Day>,
    pub final_s: Option<f64>,
    pub checksum: String,
}

impl RunDigest {
    fn of(run_index: u64, out: &RunOutput) -> Self {
        Self {
            run_index,
            seed: out.seed,
            quarantined_on: out.quarantined_on,
            final_s: out.last().map(|p| p.metrics.s),
            checksum: series_checksum(&out.series),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloResult {
    pub base_seed: u64,
    pub repeats: u64,
    /// Representative series: the run with `base_seed`.
    pub series: Vec<SeriesPoint>,
    /// `None` when `repeats == 1`.
    pub bands: Option<BTreeMap<MetricKey, Band>>,
    pub runs: Vec<RunDigest>,
    /// Warnings of the representative run. Every run shares the same plan,
    /// so plan-level warnings are identical across the ensemble.
    pub warnings: Vec<RunWarning>,
    /// Final-day distribution per banded metric.
    pub final_stats: BTreeMap<MetricKey, StatSummary>,
    /// Fraction of runs that latched quarantine.
    pub quarantine_rate: f64,
}

/// Run the ensemble.
///
/// `repeats` must be >= 1. With `repeats == 1` the single run's series is
/// returned unchanged and `bands` is `None`. `threads <= 1` runs inline.
pub fn run_monte_carlo(
    sim: &Simulator,
    repeats: i64,
    base_seed: u64,
    threads: usize,
    metrics: &[MetricKey],
) -> Result<MonteCarloResult, FabulaError> {
    if repeats < 1 {
        return Err(FabulaError::InvalidRepeats(repeats));
    }
    let n = repeats as u64;
    let keys: Vec<MetricKey> = if metrics.is_empty() {
        vec![MetricKey::S]
    } else {
        let mut k = metrics.to_vec();
        k.sort();
        k.dedup();
        k
    };

    info!(repeats = n, base_seed, threads, "monte carlo start");

    let seeds: Vec<u64> = (0..n).map(|i| base_seed.wrapping_add(i)).collect();
    let runs: Vec<RunOutput> = if threads > 1 && n > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| FabulaError::ThreadPool(e.to_string()))?;
        pool.install(|| seeds.par_iter().map(|&s| sim.run(s)).collect())
    } else {
        seeds.iter().map(|&s| sim.run(s)).collect()
    };

    let digests: Vec<RunDigest> = runs
        .iter()
        .enumerate()
        .map(|(i, r)| RunDigest::of(i as u64, r))
        .collect();

    let final_stats = keys
        .iter()
        .map(|k| {
            let stats: OnlineStats = runs
                .iter()
                .filter_map(|r| r.last().map(|p| k.value(p)))
                .collect();
            (*k, stats.summary())
        })
        .collect();

    let quarantined = runs.iter().filter(|r| r.quarantined_on.is_some()).count();
    let quarantine_rate = quarantined as f64 / n as f64;

    let bands = (n > 1).then(|| {
        keys.iter()
            .map(|k| (*k, band_for(&runs, *k)))
            .collect::<BTreeMap<_, _>>()
    });

    let mut runs = runs.into_iter();
    let base = runs.next().ok_or(FabulaError::InvalidRepeats(repeats))?;

    info!(
        repeats = n,
        quarantine_rate,
        checksum = %digests[0].checksum,
        "monte carlo complete"
    );

    Ok(MonteCarloResult {
        base_seed,
        repeats: n,
        series: base.series,
        bands,
        runs: digests,
        warnings: base.warnings,
        final_stats,
        quarantine_rate,
    })
}

/// p10/p50/p90 of `key` for every day, using floor-index percentiles.
pub fn band_for(runs: &[RunOutput], key: MetricKey) -> Band {
    let days = runs.iter().map(|r| r.series.len()).min().unwrap_or(0);
    let mut band = Band {
        p10: Vec::with_capacity(days),
        p50: Vec::with_capacity(days),
        p90: Vec::with_capacity(days),
    };
    let mut samples = Vec::with_capacity(runs.len());
    for d in 0..days {
        samples.clear();
        samples.extend(runs.iter().map(|r| key.value(&r.series[d])));
        let sorted = sorted_finite(&samples);
        band.p10.push(quantile_floor_sorted(&sorted, P10));
        band.p50.push(quantile_floor_sorted(&sorted, P50));
        band.p90.push(quantile_floor_sorted(&sorted, P90));
    }
    band
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::scenario::ScenarioSpec;

    fn sim(days: i64) -> Simulator {
        let spec = ScenarioSpec::from_json_str(&format!(r#"{{"days": {days}}}"#)).unwrap();
        Simulator::new(&Config::default(), &spec, None).unwrap()
    }

    #[test]
    fn repeats_one_is_identity() {
        let s = sim(10);
        let mc = run_monte_carlo(&s, 1, 7, 1, &[]).unwrap();
        assert!(mc.bands.is_none());
        assert_eq!(mc.series, s.run(7).series);
        assert_eq!(mc.runs.len(), 1);
    }

    #[test]
    fn repeats_zero_rejected() {
        assert!(matches!(
            run_monte_carlo(&sim(3), 0, 1, 1, &[]),
            Err(FabulaError::InvalidRepeats(0))
        ));
    }

    #[test]
    fn seeds_are_consecutive() {
        let mc = run_monte_carlo(&sim(3), 4, u64::MAX - 1, 1, &[]).unwrap();
        let seeds: Vec<u64> = mc.runs.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![u64::MAX - 1, u64::MAX, 0, 1]);
    }

    #[test]
    fn default_band_is_s_and_ordered() {
        let mc = run_monte_carlo(&sim(12), 9, 1, 1, &[]).unwrap();
        let bands = mc.bands.unwrap();
        assert_eq!(bands.keys().copied().collect::<Vec<_>>(), vec![MetricKey::S]);
        let b = &bands[&MetricKey::S];
        assert_eq!(b.p10.len(), 12);
        for d in 0..12 {
            assert!(b.p10[d] <= b.p50[d] && b.p50[d] <= b.p90[d]);
        }
    }
}
