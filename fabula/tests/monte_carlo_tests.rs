// tests/monte_carlo_tests.rs
//
// Ensemble behaviour of run_monte_carlo: band ordering, the repeats == 1
// identity, thread-count independence and multi-metric banding.

use fabula::config::Config;
use fabula::error::FabulaError;
use fabula::monte_carlo::run_monte_carlo;
use fabula::output::series_checksum;
use fabula::scenario::ScenarioSpec;
use fabula::simulator::Simulator;
use fabula::types::MetricKey;

const NOISY: &str = r#"{
    "title": "noisy reactor",
    "days": 40,
    "entity": {"type": "object", "param_bindings": {"A*": 120, "E0": 40, "hazard_rate": 0.3}},
    "noise": {"sigmaE": 6.0, "sigmaA": 3.0, "seed": 17},
    "interventions": [
        {"kind": "shock", "t": 10, "cvarBoost": 0.8, "days": 5},
        {"kind": "patch_plan", "t": 20, "R": 0.9, "s": 2.0},
        {"kind": "auto_quarantine_at_S", "t": 25, "threshold": 0.35}
    ]
}"#;

fn noisy_sim() -> Simulator {
    let spec = ScenarioSpec::from_json_str(NOISY).unwrap();
    Simulator::new(&Config::default(), &spec, None).unwrap()
}

#[test]
fn percentile_bands_are_ordered_every_day() {
    let sim = noisy_sim();
    let mc = run_monte_carlo(&sim, 25, 17, 1, &MetricKey::ALL).unwrap();
    let bands = mc.bands.unwrap();
    assert_eq!(bands.len(), MetricKey::ALL.len());

    for (key, band) in &bands {
        assert_eq!(band.p10.len(), 40, "{key}");
        for d in 0..40 {
            assert!(
                band.p10[d] <= band.p50[d] && band.p50[d] <= band.p90[d],
                "{key} day {d}: {} {} {}",
                band.p10[d],
                band.p50[d],
                band.p90[d]
            );
        }
    }
}

#[test]
fn single_repeat_returns_the_run_unchanged() {
    let sim = noisy_sim();
    let mc = run_monte_carlo(&sim, 1, 99, 4, &[]).unwrap();
    let direct = sim.run(99);

    assert!(mc.bands.is_none());
    assert_eq!(mc.series, direct.series);
    assert_eq!(mc.warnings, direct.warnings);
    assert_eq!(mc.runs[0].checksum, series_checksum(&direct.series));
}

#[test]
fn thread_count_does_not_change_results() {
    let sim = noisy_sim();
    let metrics = [MetricKey::S, MetricKey::Dose, MetricKey::R];
    let seq = run_monte_carlo(&sim, 16, 17, 1, &metrics).unwrap();
    let par = run_monte_carlo(&sim, 16, 17, 4, &metrics).unwrap();

    assert_eq!(seq.runs, par.runs);
    assert_eq!(seq.bands, par.bands);
    assert_eq!(seq.final_stats, par.final_stats);
    assert_eq!(
        series_checksum(&seq.series),
        series_checksum(&par.series)
    );
}

#[test]
fn runs_differ_across_seeds() {
    let sim = noisy_sim();
    let mc = run_monte_carlo(&sim, 4, 17, 1, &[]).unwrap();
    let mut checksums: Vec<&str> = mc.runs.iter().map(|r| r.checksum.as_str()).collect();
    checksums.sort();
    checksums.dedup();
    assert_eq!(checksums.len(), 4);
}

#[test]
fn requested_metrics_are_deduplicated() {
    let sim = noisy_sim();
    let mc = run_monte_carlo(&sim, 3, 1, 1, &[MetricKey::E, MetricKey::S, MetricKey::E]).unwrap();
    let keys: Vec<MetricKey> = mc.bands.unwrap().keys().copied().collect();
    assert_eq!(keys, vec![MetricKey::S, MetricKey::E]);
    assert_eq!(mc.final_stats.len(), 2);
}

#[test]
fn final_stats_bracket_every_run() {
    let sim = noisy_sim();
    let mc = run_monte_carlo(&sim, 10, 5, 2, &[]).unwrap();
    let s = &mc.final_stats[&MetricKey::S];
    assert_eq!(s.n, 10);
    for r in &mc.runs {
        let v = r.final_s.unwrap();
        assert!(s.min <= v && v <= s.max);
    }
    assert!(s.min <= s.mean && s.mean <= s.max);
    assert!((0.0..=1.0).contains(&mc.quarantine_rate));
}

#[test]
fn invalid_repeats_rejected() {
    let sim = noisy_sim();
    for bad in [0, -5] {
        match run_monte_carlo(&sim, bad, 1, 1, &[]) {
            Err(FabulaError::InvalidRepeats(n)) => assert_eq!(n, bad),
            other => panic!("expected InvalidRepeats, got {other:?}"),
        }
    }
}
