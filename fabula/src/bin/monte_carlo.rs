// src/bin/monte_carlo.rs
//
// Monte Carlo harness.
//
// - Deterministic ensembles: run i uses seed + i.
// - Optional rayon pool (--threads); output is identical for any thread count.
// - Per-day p10/p50/p90 bands for the requested metrics (default S).
// - Writes <output-dir>/mc_summary.json atomically.
//
// Run examples:
//   cargo run --bin monte_carlo -- --scenario scenarios/reactor.yaml --repeats 64
//   cargo run --bin monte_carlo -- --scenario s.json --repeats 200 --threads 8 --metric S --metric dose
//
// Profile precedence: --profile > FABULA_CONTROL_PROFILE > scenario `profile` > balanced.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fabula::config::{resolve_effective_profile, Config, ControlProfile, EffectiveProfile};
use fabula::error::RunWarning;
use fabula::monte_carlo::{run_monte_carlo, Band, RunDigest};
use fabula::output::{atomic_write, series_checksum, OUTPUT_SCHEMA_VERSION};
use fabula::registry::ModelRegistry;
use fabula::scenario::ScenarioSpec;
use fabula::simulator::Simulator;
use fabula::stats::StatSummary;
use fabula::types::{Day, MetricKey, SeriesPoint};

const DEFAULT_OUTPUT_DIR: &str = "runs/monte_carlo";

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProfileArg {
    Gentle,
    Balanced,
    Aggressive,
}

impl From<ProfileArg> for ControlProfile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Gentle => ControlProfile::Gentle,
            ProfileArg::Balanced => ControlProfile::Balanced,
            ProfileArg::Aggressive => ControlProfile::Aggressive,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "monte_carlo", about = "fabula Monte Carlo harness", version)]
struct Args {
    /// Scenario file (.json, .yaml, .yml).
    #[arg(long)]
    scenario: PathBuf,

    #[arg(long)]
    registry: Option<PathBuf>,

    /// Number of runs. Defaults to the scenario's noise.repeats, else 1.
    #[arg(long, allow_hyphen_values = true)]
    repeats: Option<i64>,

    /// Base seed. Defaults to the scenario's noise.seed, else 1.
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads; 1 runs inline.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Metric to band (repeatable): S, Pv, Vsigma, E, A, dose, R.
    #[arg(long = "metric", value_parser = parse_metric)]
    metrics: Vec<MetricKey>,

    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Include the representative series in the summary file.
    #[arg(long)]
    with_series: bool,

    /// Only print the final summary line.
    #[arg(long)]
    quiet: bool,
}

fn parse_metric(s: &str) -> std::result::Result<MetricKey, String> {
    MetricKey::parse(s).ok_or_else(|| {
        let names: Vec<&str> = MetricKey::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown metric '{s}' (one of {})", names.join(", "))
    })
}

#[derive(Debug, Serialize)]
struct McSummary<'a> {
    schema_version: u32,
    fabula_version: &'static str,
    title: &'a str,
    entity_type: &'static str,
    era: &'static str,
    days: Day,
    profile: EffectiveProfile,
    repeats: u64,
    base_seed: u64,
    threads: usize,
    quarantine_rate: f64,
    representative_checksum: String,
    final_stats: &'a BTreeMap<MetricKey, StatSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bands: Option<&'a BTreeMap<MetricKey, Band>>,
    runs: &'a [RunDigest],
    warnings: &'a [RunWarning],
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<&'a [SeriesPoint]>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let scenario = ScenarioSpec::from_path(&args.scenario)
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?;

    let effective =
        resolve_effective_profile(args.profile.map(Into::into), scenario.profile.as_deref());
    effective.log_startup();
    let cfg = Config::from_env_or_profile(effective.profile);

    let registry = args
        .registry
        .as_deref()
        .map(|p| {
            ModelRegistry::from_path(p)
                .with_context(|| format!("loading registry {}", p.display()))
        })
        .transpose()?;

    let sim = Simulator::new(&cfg, &scenario, registry.as_ref())?;
    let repeats = args.repeats.unwrap_or_else(|| sim.default_repeats());
    let base_seed = args.seed.unwrap_or_else(|| sim.default_seed());

    println!(
        "fabula-mc v{} | profile={} ({}) repeats={} days={} seed={} threads={} output_dir={}",
        env!("CARGO_PKG_VERSION"),
        effective.profile.as_str(),
        effective.source.as_str(),
        repeats,
        sim.days(),
        base_seed,
        args.threads.max(1),
        args.output_dir.display(),
    );

    let mc = run_monte_carlo(&sim, repeats, base_seed, args.threads, &args.metrics)?;

    if !args.quiet {
        for r in &mc.runs {
            println!(
                "run={:>4} seed={:<20} final_S={:<10} quarantined_on={:<6} checksum={}",
                r.run_index,
                r.seed,
                r.final_s
                    .map(|s| format!("{s:.6}"))
                    .unwrap_or_else(|| "-".to_string()),
                r.quarantined_on
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                &r.checksum[..12],
            );
        }
    }

    let summary = McSummary {
        schema_version: OUTPUT_SCHEMA_VERSION,
        fabula_version: env!("CARGO_PKG_VERSION"),
        title: sim.title(),
        entity_type: sim.kind().as_str(),
        era: sim.era().as_str(),
        days: sim.days(),
        profile: effective,
        repeats: mc.repeats,
        base_seed: mc.base_seed,
        threads: args.threads.max(1),
        quarantine_rate: mc.quarantine_rate,
        representative_checksum: series_checksum(&mc.series),
        final_stats: &mc.final_stats,
        bands: mc.bands.as_ref(),
        runs: &mc.runs,
        warnings: &mc.warnings,
        series: args.with_series.then_some(mc.series.as_slice()),
    };

    let json = serde_json::to_string_pretty(&summary)?;
    let out_path = args.output_dir.join("mc_summary.json");
    atomic_write(&out_path, json.as_bytes())
        .with_context(|| format!("writing {}", out_path.display()))?;

    for (key, s) in &mc.final_stats {
        println!(
            "final {:<6} mean={:.6} std={:.6} min={:.6} max={:.6}",
            key.as_str(),
            s.mean,
            s.std_pop,
            s.min,
            s.max
        );
    }
    println!(
        "quarantine_rate={:.4} checksum={} wrote={}",
        mc.quarantine_rate,
        summary.representative_checksum,
        out_path.display()
    );
    Ok(())
}
