//! Fabula core library.
//!
//! Narrative entity metrics and a day-stepped scenario simulator. The
//! binaries (`src/main.rs`, `src/bin/monte_carlo.rs`) are thin harnesses
//! around these components.
//!
//! # Architecture
//!
//! - **Metrics** (`metrics`): pure, total scoring of a parameter set into
//!   `{Pv, Vσ, S, dose, drift, topo, ...}`. Two formula families (object,
//!   character) behind the `MetricModel` trait.
//!
//! - **Registry** (`registry`): parameter schemas with `extends`
//!   inheritance, and materialization of concrete bindings.
//!
//! - **Process / Controller** (`process`, `controller`): the per-day state
//!   update and the PID loop that holds dose near 1.0.
//!
//! - **Scheduler** (`scheduler`): day-indexed interventions and the
//!   trigger-day quarantine check.
//!
//! - **Simulator** (`simulator`): one deterministic run per
//!   `(scenario, seed)`.
//!
//! - **Monte Carlo** (`monte_carlo`): seeded ensembles reduced to per-day
//!   p10/p50/p90 bands, optionally on a rayon pool.
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod config;
pub mod controller;
pub mod eligibility;
pub mod error;
pub mod metrics;
pub mod monte_carlo;
pub mod output;
pub mod process;
pub mod registry;
pub mod scenario;
pub mod scheduler;
pub mod simulator;
pub mod state;
pub mod stats;
pub mod telemetry;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{
    resolve_effective_profile, Config, ControlProfile, EffectiveProfile, ProfileSource,
};
pub use controller::DoseController;
pub use eligibility::EligibilityItem;
pub use error::{FabulaError, RunWarning};
pub use metrics::{evaluate, CharacterModel, MetricModel, ObjectModel};
pub use monte_carlo::{run_monte_carlo, Band, MonteCarloResult, RunDigest};
pub use output::{atomic_write, series_checksum, RunSummary};
pub use process::{ExposureProcess, NoiseSource};
pub use registry::{materialize_params, ModelDef, ModelRegistry, ParamDef};
pub use scenario::{EntityDescriptor, Intervention, InterventionEntry, ScenarioSpec};
pub use scheduler::InterventionScheduler;
pub use simulator::{simulate, RunOutput, Simulator};
pub use state::{RunMode, SimulationState};
pub use stats::OnlineStats;
pub use telemetry::{JsonlSink, NoopSink, SeriesSink, VecSink};
pub use types::{Day, EntityKind, Era, MetricFamily, MetricKey, Metrics, ParamBindings, SeriesPoint};
