// src/scenario.rs
//
// Scenario descriptor parsing and validation.
//
// A scenario fully defines a reproducible run:
// - days + entity card (type, model_ref, bindings, locks)
// - era (`branch`)
// - interventions (tagged by `kind`, each with a trigger day `t`)
// - optional overlays for the PID policy, noise, process rates and initial state
//
// Files are JSON or YAML, chosen by extension. Shape errors in individual
// interventions do not fail the load: such entries are kept as `Unknown` and
// become run warnings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::FabulaError;
use crate::types::{Day, EntityKind, Era, ParamBindings};

/// Entity card as it appears in scenarios and content indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
    #[serde(default)]
    pub param_bindings: ParamBindings,
    /// Parameter names that overlays must not change.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_locked: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Era>,
}

impl EntityDescriptor {
    pub fn is_locked(&self, name: &str) -> bool {
        self.param_locked.iter().any(|p| p == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
    #[serde(rename = "A_bounds")]
    pub a_bounds: Option<(f64, f64)>,
    pub du_max: Option<f64>,
    pub settle_band: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseSpec {
    #[serde(rename = "sigmaE")]
    pub sigma_e: Option<f64>,
    #[serde(rename = "sigmaA")]
    pub sigma_a: Option<f64>,
    pub seed: Option<u64>,
    pub repeats: Option<i64>,
}

/// Process rate overrides (`k` block).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub rho: Option<f64>,
    #[serde(rename = "kA_decay")]
    pub k_a_decay: Option<f64>,
    #[serde(rename = "kH_leak")]
    pub k_h_leak: Option<f64>,
    #[serde(rename = "kR_wear")]
    pub k_r_wear: Option<f64>,
    #[serde(rename = "kC_decay")]
    pub k_c_decay: Option<f64>,
}

/// Initial state overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSpec {
    #[serde(rename = "E")]
    pub e: Option<f64>,
    #[serde(rename = "A")]
    pub a: Option<f64>,
    #[serde(rename = "H")]
    pub h: Option<f64>,
    #[serde(rename = "R")]
    pub r: Option<f64>,
    #[serde(rename = "Mw")]
    pub mw: Option<f64>,
    #[serde(rename = "Topo")]
    pub topo: Option<f64>,
    #[serde(rename = "Cvar")]
    pub cvar: Option<f64>,
}

/// A discrete, day-indexed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intervention {
    /// Re-plan capacity baseline and exposure knobs.
    ExposurePlan {
        t: Day,
        #[serde(rename = "Astar", alias = "A*", default)]
        a_star: Option<f64>,
        #[serde(default)]
        v: Option<f64>,
        #[serde(default)]
        q: Option<f64>,
        #[serde(default)]
        rho: Option<f64>,
    },
    /// Maintenance: `s` units of patching effort at reliability `R`.
    PatchPlan {
        t: Day,
        #[serde(rename = "R")]
        r: f64,
        s: f64,
    },
    WitnessRally {
        t: Day,
        #[serde(rename = "addMw", default = "default_add_mw")]
        add_mw: f64,
        #[serde(rename = "addTopo", default = "default_add_topo")]
        add_topo: f64,
    },
    /// Temporary tail-risk boost over `[t, t + days)`.
    Shock {
        t: Day,
        #[serde(rename = "cvarBoost")]
        cvar_boost: f64,
        days: Day,
    },
    CausalSurgery {
        t: Day,
        #[serde(rename = "deltaC")]
        delta_c: f64,
    },
    ReliabilityBoost {
        t: Day,
        #[serde(rename = "dR")]
        d_r: f64,
    },
    /// Signed additive deltas on infra and exergy, each floored at 0.
    BudgetCut {
        t: Day,
        #[serde(rename = "dInfra", default)]
        d_infra: f64,
        #[serde(rename = "dExergy", default)]
        d_exergy: f64,
    },
    /// Checked against day `t`'s metrics only: `S < threshold` latches
    /// quarantine and cuts exposure from day `t + 1` on.
    #[serde(rename = "auto_quarantine_at_S")]
    AutoQuarantineAtS { t: Day, threshold: f64 },
}

fn default_add_mw() -> f64 {
    0.3
}

fn default_add_topo() -> f64 {
    0.05
}

impl Intervention {
    pub fn t(&self) -> Day {
        match self {
            Intervention::ExposurePlan { t, .. }
            | Intervention::PatchPlan { t, .. }
            | Intervention::WitnessRally { t, .. }
            | Intervention::Shock { t, .. }
            | Intervention::CausalSurgery { t, .. }
            | Intervention::ReliabilityBoost { t, .. }
            | Intervention::BudgetCut { t, .. }
            | Intervention::AutoQuarantineAtS { t, .. } => *t,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Intervention::ExposurePlan { .. } => "exposure_plan",
            Intervention::PatchPlan { .. } => "patch_plan",
            Intervention::WitnessRally { .. } => "witness_rally",
            Intervention::Shock { .. } => "shock",
            Intervention::CausalSurgery { .. } => "causal_surgery",
            Intervention::ReliabilityBoost { .. } => "reliability_boost",
            Intervention::BudgetCut { .. } => "budget_cut",
            Intervention::AutoQuarantineAtS { .. } => "auto_quarantine_at_S",
        }
    }
}

pub const KNOWN_KINDS: [&str; 8] = [
    "exposure_plan",
    "patch_plan",
    "witness_rally",
    "shock",
    "causal_surgery",
    "reliability_boost",
    "budget_cut",
    "auto_quarantine_at_S",
];

/// One entry of the `interventions` array: either a well-formed intervention
/// or the raw value that failed to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterventionEntry {
    Known(Intervention),
    Unknown(serde_json::Value),
}

impl InterventionEntry {
    /// Human-readable reason an `Unknown` entry was rejected.
    pub fn rejection_detail(&self) -> Option<String> {
        let InterventionEntry::Unknown(raw) = self else {
            return None;
        };
        let detail = match raw.get("kind").and_then(|k| k.as_str()) {
            Some(kind) if KNOWN_KINDS.contains(&kind) => {
                format!("malformed payload for kind '{kind}'")
            }
            Some(kind) => format!("unknown kind '{kind}'"),
            None => "missing 'kind'".to_string(),
        };
        Some(detail)
    }
}

fn default_days() -> i64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default)]
    pub entity: EntityDescriptor,
    /// Era for the whole run; falls back to `entity.branch`.
    #[serde(default)]
    pub branch: Option<Era>,
    #[serde(default)]
    pub interventions: Vec<InterventionEntry>,
    #[serde(default)]
    pub policy: Option<PolicySpec>,
    #[serde(default)]
    pub noise: Option<NoiseSpec>,
    #[serde(default)]
    pub k: Option<ProcessSpec>,
    #[serde(default)]
    pub state: Option<StateSpec>,
    /// Control profile name (gentle | balanced | aggressive).
    #[serde(default)]
    pub profile: Option<String>,
}

impl Default for ScenarioSpec {
    fn default() -> Self {
        Self {
            title: String::new(),
            days: default_days(),
            entity: EntityDescriptor::default(),
            branch: None,
            interventions: Vec::new(),
            policy: None,
            noise: None,
            k: None,
            state: None,
            profile: None,
        }
    }
}

impl ScenarioSpec {
    /// Load a scenario file. `.yaml` / `.yml` parse as YAML, anything else as JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FabulaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| FabulaError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml_str(&contents)
        } else {
            Self::from_json_str(&contents)
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, FabulaError> {
        let spec: ScenarioSpec =
            serde_json::from_str(json).map_err(|e| FabulaError::ScenarioParse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, FabulaError> {
        let spec: ScenarioSpec =
            serde_yaml::from_str(yaml).map_err(|e| FabulaError::ScenarioParse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Reject domain errors before any run state exists.
    pub fn validate(&self) -> Result<(), FabulaError> {
        if self.days < 0 {
            return Err(FabulaError::InvalidDays(self.days));
        }
        if self.days > i64::from(Day::MAX) {
            return Err(FabulaError::ScenarioValidation {
                field: "days".to_string(),
                message: format!("days must be <= {}", Day::MAX),
            });
        }
        if let Some(repeats) = self.noise.as_ref().and_then(|n| n.repeats) {
            if repeats < 1 {
                return Err(FabulaError::InvalidRepeats(repeats));
            }
        }
        if let Some((lo, hi)) = self.policy.as_ref().and_then(|p| p.a_bounds) {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return Err(FabulaError::ScenarioValidation {
                    field: "policy.A_bounds".to_string(),
                    message: format!("expected finite [min, max] with min <= max, got [{lo}, {hi}]"),
                });
            }
        }
        Ok(())
    }

    /// Effective era: scenario `branch`, else the entity's, else current.
    pub fn era(&self) -> Era {
        self.branch.or(self.entity.branch).unwrap_or_default()
    }

    pub fn seed(&self, cfg: &Config) -> u64 {
        self.noise.as_ref().and_then(|n| n.seed).unwrap_or(cfg.noise.seed)
    }

    pub fn repeats(&self, cfg: &Config) -> i64 {
        self.noise
            .as_ref()
            .and_then(|n| n.repeats)
            .unwrap_or(cfg.noise.repeats)
    }

    /// Overlay the scenario's `policy`, `noise` and `k` blocks onto `cfg`.
    ///
    /// Non-finite values are ignored; the `state` block is applied when the
    /// simulator builds its initial state.
    pub fn overlay_config(&self, cfg: &Config) -> Config {
        let mut out = cfg.clone();

        if let Some(p) = &self.policy {
            set_finite(&mut out.policy.kp, p.kp);
            set_finite(&mut out.policy.ki, p.ki);
            set_finite(&mut out.policy.kd, p.kd);
            set_finite(&mut out.policy.du_max, p.du_max.map(f64::abs));
            set_finite(&mut out.policy.settle_band, p.settle_band.map(f64::abs));
            if let Some((lo, hi)) = p.a_bounds {
                if lo.is_finite() && hi.is_finite() && lo <= hi {
                    out.policy.a_min = lo;
                    out.policy.a_max = hi;
                }
            }
        }

        if let Some(n) = &self.noise {
            set_finite(&mut out.noise.sigma_e, n.sigma_e.map(f64::abs));
            set_finite(&mut out.noise.sigma_a, n.sigma_a.map(f64::abs));
            if let Some(seed) = n.seed {
                out.noise.seed = seed;
            }
            if let Some(r) = n.repeats {
                out.noise.repeats = r;
            }
        }

        if let Some(k) = &self.k {
            set_finite(&mut out.process.rho, k.rho);
            set_finite(&mut out.process.k_a_decay, k.k_a_decay);
            set_finite(&mut out.process.k_h_leak, k.k_h_leak);
            set_finite(&mut out.process.k_r_wear, k.k_r_wear);
            set_finite(&mut out.process.k_c_decay, k.k_c_decay);
        }

        out
    }
}

fn set_finite(slot: &mut f64, v: Option<f64>) {
    if let Some(v) = v.filter(|v| v.is_finite()) {
        *slot = v;
    }
}
