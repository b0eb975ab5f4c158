// src/config.rs
//
// Central configuration for fabula.
// Single source of truth for every tunable constant that is not part of a
// scenario file: process rates, PID policy, noise, and the default initial
// state. Scenario files overlay this per run (see scenario.rs).
//
// Runtime loading follows a profile + env-override pattern:
//   CLI --profile > FABULA_CONTROL_PROFILE > scenario `profile` > balanced,
// then FABULA_* numeric overrides on top.

use serde::Serialize;
use tracing::{info, warn};

pub const PROFILE_ENV: &str = "FABULA_CONTROL_PROFILE";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Human-readable config version.
    pub version: &'static str,
    pub process: ProcessConfig,
    pub policy: PolicyConfig,
    pub noise: NoiseConfig,
    pub initial: InitialStateConfig,
}

/// Per-day process rates (`k` block in scenario files).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessConfig {
    /// Exposure lag factor: `E <- rho·E + input`.
    pub rho: f64,
    /// Capacity relaxation rate toward baseline.
    pub k_a_decay: f64,
    /// Moisture buffer leak rate.
    pub k_h_leak: f64,
    /// Moisture replenishment per unit of dose closeness.
    pub k_h_gain: f64,
    /// Capacity added per unit of moisture each day.
    pub h_nudge: f64,
    /// Reliability wear per unit of dose error.
    pub k_r_wear: f64,
    /// Baseline tail-risk decay rate.
    pub k_c_decay: f64,
    /// Capacity baseline when the entity card does not provide `A*`.
    pub a_baseline: f64,
    /// Floor on capacity in dose divisions.
    pub eps: f64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            rho: 0.985,
            k_a_decay: 0.02,
            k_h_leak: 0.01,
            k_h_gain: 0.02,
            h_nudge: 15.0,
            k_r_wear: 0.08,
            k_c_decay: 0.15,
            a_baseline: 100.0,
            eps: 1e-6,
        }
    }
}

/// Dose controller (PID) policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub a_min: f64,
    pub a_max: f64,
    /// Slew limit on the per-day controller output.
    pub du_max: f64,
    /// Dead-band on `|1 - dose|` below which the integrator holds.
    pub settle_band: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kp: 0.6,
            ki: 0.05,
            kd: 0.2,
            a_min: 10.0,
            a_max: 1000.0,
            du_max: 10.0,
            settle_band: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseConfig {
    /// Peak-to-peak amplitude of uniform exposure noise.
    pub sigma_e: f64,
    /// Peak-to-peak amplitude of uniform capacity noise.
    pub sigma_a: f64,
    pub seed: u64,
    pub repeats: i64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            sigma_e: 2.0,
            sigma_a: 1.0,
            seed: 1,
            repeats: 1,
        }
    }
}

/// Initial simulation state used where neither the scenario `state` block nor
/// the entity card provides a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialStateConfig {
    pub e: f64,
    pub a: f64,
    pub h: f64,
    pub r: f64,
    pub mw: f64,
    pub topo: f64,
    pub cvar: f64,
    pub v: f64,
    pub q: f64,
    pub exergy: f64,
    pub infra: f64,
    pub hazard: f64,
    pub causal: f64,
}

impl Default for InitialStateConfig {
    fn default() -> Self {
        Self {
            e: 60.0,
            a: 100.0,
            h: 0.5,
            r: 0.85,
            mw: 0.3,
            topo: 0.2,
            cvar: 0.3,
            v: 20.0,
            q: 0.6,
            exergy: 0.8,
            infra: 0.4,
            hazard: 0.7,
            causal: 0.2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "fabula-0.1",
            process: ProcessConfig::default(),
            policy: PolicyConfig::default(),
            noise: NoiseConfig::default(),
            initial: InitialStateConfig::default(),
        }
    }
}

/// Coarse controller preset used by the CLIs.
///
/// `Balanced` is `Config::default()`; the others only touch the PID gains and
/// slew limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlProfile {
    Gentle,
    Balanced,
    Aggressive,
}

impl ControlProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlProfile::Gentle => "gentle",
            ControlProfile::Balanced => "balanced",
            ControlProfile::Aggressive => "aggressive",
        }
    }

    /// Parse a profile name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<ControlProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gentle" | "g" | "soft" => Some(ControlProfile::Gentle),
            "balanced" | "bal" | "b" => Some(ControlProfile::Balanced),
            "aggressive" | "agg" | "a" => Some(ControlProfile::Aggressive),
            _ => None,
        }
    }
}

/// Where the effective profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    Cli,
    Env,
    Scenario,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Scenario => "scenario",
            ProfileSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveProfile {
    pub profile: ControlProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    pub fn log_startup(&self) {
        info!(
            profile = self.profile.as_str(),
            source = self.source.as_str(),
            "effective control profile"
        );
    }
}

/// Resolve the effective control profile.
///
/// Precedence (highest to lowest):
/// 1. `cli_profile`
/// 2. `FABULA_CONTROL_PROFILE`, if set and parseable
/// 3. `scenario_profile`, if parseable
/// 4. `Balanced`
pub fn resolve_effective_profile(
    cli_profile: Option<ControlProfile>,
    scenario_profile: Option<&str>,
) -> EffectiveProfile {
    if let Some(p) = cli_profile {
        return EffectiveProfile {
            profile: p,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(env_val) = std::env::var(PROFILE_ENV) {
        if !env_val.is_empty() {
            if let Some(p) = ControlProfile::parse(&env_val) {
                return EffectiveProfile {
                    profile: p,
                    source: ProfileSource::Env,
                };
            }
            warn!(value = %env_val, "invalid {PROFILE_ENV}; ignoring");
        }
    }

    if let Some(s) = scenario_profile {
        match ControlProfile::parse(s) {
            Some(p) => {
                return EffectiveProfile {
                    profile: p,
                    source: ProfileSource::Scenario,
                }
            }
            None => warn!(value = %s, "invalid scenario profile; ignoring"),
        }
    }

    EffectiveProfile {
        profile: ControlProfile::Balanced,
        source: ProfileSource::Default,
    }
}

// --- Runtime config loader: profiles + env overrides -------------------------

impl Config {
    pub fn for_profile(profile: ControlProfile) -> Self {
        let mut cfg = Config::default();

        match profile {
            ControlProfile::Balanced => {}
            ControlProfile::Gentle => {
                cfg.policy.kp = 0.3;
                cfg.policy.ki = 0.02;
                cfg.policy.kd = 0.1;
                cfg.policy.du_max = 5.0;
            }
            ControlProfile::Aggressive => {
                cfg.policy.kp = 1.2;
                cfg.policy.ki = 0.1;
                cfg.policy.kd = 0.4;
                cfg.policy.du_max = 20.0;
            }
        }

        cfg
    }

    /// Build a Config from a profile, then apply environment overrides:
    ///
    ///   - FABULA_KP, FABULA_KI, FABULA_KD   (f64)
    ///   - FABULA_DU_MAX                     (f64, >= 0)
    ///   - FABULA_SIGMA_E, FABULA_SIGMA_A    (f64, >= 0)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_profile(profile: ControlProfile) -> Self {
        let mut cfg = Config::for_profile(profile);

        env_override("FABULA_KP", &mut cfg.policy.kp, |v| v);
        env_override("FABULA_KI", &mut cfg.policy.ki, |v| v);
        env_override("FABULA_KD", &mut cfg.policy.kd, |v| v);
        env_override("FABULA_DU_MAX", &mut cfg.policy.du_max, |v| v.max(0.0));
        env_override("FABULA_SIGMA_E", &mut cfg.noise.sigma_e, |v| v.max(0.0));
        env_override("FABULA_SIGMA_A", &mut cfg.noise.sigma_a, |v| v.max(0.0));

        cfg
    }

    /// Profile from `FABULA_CONTROL_PROFILE` (default balanced), then all
    /// other env overrides.
    pub fn from_env_or_default() -> Self {
        let eff = resolve_effective_profile(None, None);
        Self::from_env_or_profile(eff.profile)
    }
}

fn env_override(name: &str, slot: &mut f64, sanitize: impl Fn(f64) -> f64) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => {
            *slot = sanitize(v);
            info!(var = name, value = *slot, "config override from env");
        }
        _ => {
            warn!(
                var = name,
                raw = %raw,
                default = *slot,
                "could not parse env override as f64; using default"
            );
        }
    }
}
