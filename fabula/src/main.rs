// src/main.rs
//
// Scenario CLI for fabula.
//
//   fabula run  --scenario PATH [--registry PATH] [--seed N] [--days N]
//               [--profile P] [--jsonl PATH] [--quiet]
//   fabula eval --entity PATH [--registry PATH] [--era E] [--set k=v]...
//
// Profile precedence: --profile > FABULA_CONTROL_PROFILE > scenario `profile`
// > balanced. Logs go to stderr (RUST_LOG, default info); results go to stdout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fabula::config::{resolve_effective_profile, Config, ControlProfile};
use fabula::eligibility::{self, EligibilityItem};
use fabula::error::RunWarning;
use fabula::metrics;
use fabula::output::RunSummary;
use fabula::registry::{materialize_params, overlay_unlocked, ModelRegistry};
use fabula::scenario::{EntityDescriptor, ScenarioSpec};
use fabula::simulator::Simulator;
use fabula::telemetry::{JsonlSink, NoopSink, SeriesSink};
use fabula::types::{Era, Metrics, ParamBindings, SeriesPoint};

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
#[command(
    name = "fabula",
    about = "Narrative entity metrics and day-stepped scenario simulator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one scenario and print its series and summary.
    Run(RunArgs),
    /// Evaluate one entity card: metrics and eligibility.
    Eval(EvalArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Scenario file (.json, .yaml, .yml).
    #[arg(long)]
    scenario: PathBuf,

    /// Model registry used to materialize the entity's parameters.
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Seed override. Defaults to the scenario's noise.seed, else 1.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of days override.
    #[arg(long, allow_hyphen_values = true)]
    days: Option<i64>,

    /// Control profile preset.
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Write one JSON object per simulated day to PATH.
    #[arg(long)]
    jsonl: Option<PathBuf>,

    /// Suppress the per-day table.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Args)]
struct EvalArgs {
    /// Entity descriptor file (.json, .yaml, .yml).
    #[arg(long)]
    entity: PathBuf,

    #[arg(long)]
    registry: Option<PathBuf>,

    /// Era: current | pre-rector | pre-borders. Defaults to the card's branch.
    #[arg(long, value_parser = parse_era)]
    era: Option<Era>,

    /// Parameter override `name=value`; locked parameters are left untouched.
    #[arg(long = "set", value_parser = parse_binding)]
    set: Vec<(String, f64)>,
}

fn parse_era(s: &str) -> std::result::Result<Era, String> {
    Era::parse(s).ok_or_else(|| format!("unknown era '{s}' (current | pre-rector | pre-borders)"))
}

fn parse_binding(s: &str) -> std::result::Result<(String, f64), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let v: f64 = v
        .trim()
        .parse()
        .map_err(|_| format!("'{v}' is not a number"))?;
    if !v.is_finite() {
        return Err(format!("'{v}' is not finite"));
    }
    Ok((k.trim().to_string(), v))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_registry(path: Option<&Path>) -> Result<Option<ModelRegistry>> {
    path.map(|p| {
        ModelRegistry::from_path(p).with_context(|| format!("loading registry {}", p.display()))
    })
    .transpose()
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Eval(args) => cmd_eval(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let mut scenario = ScenarioSpec::from_path(&args.scenario)
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?;
    if let Some(days) = args.days {
        scenario.days = days;
    }

    let effective =
        resolve_effective_profile(args.profile.map(Into::into), scenario.profile.as_deref());
    effective.log_startup();
    let cfg = Config::from_env_or_profile(effective.profile);

    let registry = load_registry(args.registry.as_deref())?;
    let sim = Simulator::new(&cfg, &scenario, registry.as_ref())?;
    let seed = args.seed.unwrap_or_else(|| sim.default_seed());

    tracing::info!(
        title = sim.title(),
        entity = %sim.kind(),
        era = %sim.era(),
        days = sim.days(),
        seed,
        "run start"
    );

    let mut sink: Box<dyn SeriesSink> = match &args.jsonl {
        Some(path) => Box::new(JsonlSink::create(path)),
        None => Box::new(NoopSink),
    };
    let out = sim.run_with_sink(seed, sink.as_mut());
    drop(sink);

    if !args.quiet {
        print_table(&out.series);
    }

    let summary = RunSummary::new(&sim, &out, Some(effective));
    println!("{}", summary.to_json_pretty()?);

    tracing::info!(
        checksum = %summary.determinism.checksum,
        warnings = out.warnings.len(),
        "run complete"
    );
    Ok(())
}

fn print_table(series: &[SeriesPoint]) {
    println!(
        "{:>4} {:>7} {:>7} {:>7} {:>7} {:>9} {:>9} {:>6} {:>6} {:>6} q",
        "day", "S", "Pv", "Vsigma", "dose", "E", "A", "R", "Cvar", "input"
    );
    for p in series {
        println!(
            "{:>4} {:>7.4} {:>7.4} {:>7.4} {:>7.4} {:>9.3} {:>9.3} {:>6.3} {:>6.3} {:>6.2} {}",
            p.day,
            p.metrics.s,
            p.metrics.pv,
            p.metrics.vsigma,
            p.metrics.dose,
            p.e,
            p.a,
            p.r,
            p.cvar,
            p.input,
            if p.quarantined { "Q" } else { "-" }
        );
    }
}

#[derive(Serialize)]
struct EvalReport<'a> {
    entity_type: &'a str,
    era: &'a str,
    params: &'a ParamBindings,
    metrics: &'a Metrics,
    eligibility: &'a [EligibilityItem],
    warnings: &'a [RunWarning],
}

fn load_entity(path: &Path) -> Result<EntityDescriptor> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading entity {}", path.display()))?;
    let entity = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("parsing entity {}", path.display()))?,
        _ => serde_json::from_str(&text)
            .with_context(|| format!("parsing entity {}", path.display()))?,
    };
    Ok(entity)
}

fn cmd_eval(args: EvalArgs) -> Result<()> {
    let entity = load_entity(&args.entity)?;
    let registry = load_registry(args.registry.as_deref())?;
    let era = args.era.or(entity.branch).unwrap_or_default();

    let (mut params, mut warnings) = materialize_params(&entity, registry.as_ref(), None);
    let overrides: ParamBindings = args.set.into_iter().collect();
    warnings.extend(overlay_unlocked(&mut params, &overrides, &entity.param_locked));

    let m = metrics::evaluate(entity.kind, &params, era);
    let items = eligibility::evaluate(entity.kind, &m, &params);

    let report = EvalReport {
        entity_type: entity.kind.as_str(),
        era: era.as_str(),
        params: &params,
        metrics: &m,
        eligibility: &items,
        warnings: &warnings,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
