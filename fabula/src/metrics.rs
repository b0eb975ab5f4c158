// src/metrics.rs
//
// Metric evaluator: (parameters, entity kind, era) -> Metrics.
//
// Two formula families exist, each behind the `MetricModel` capability:
// - ObjectModel: dose / tail-risk / infrastructure debt scoring
// - CharacterModel: influence / stress / "monstro" risk scoring
//
// Every function here is total. Missing or non-finite parameters fall back to
// the documented defaults below, divisions are guarded, logs are clamped, and
// any non-finite intermediate result is replaced with 0.

use crate::types::{EntityKind, Era, MetricFamily, Metrics, ParamBindings};

/// Capacity below which dose is reported as 0.
pub const DOSE_EPS: f64 = 1e-6;

/// Scale on `max(0, E - A)^2` for the over-exposure risk.
pub const RISK_DRY_COEF: f64 = 1e-3;
/// Scale on `max(0, A - E)` for the under-exposure risk.
pub const RISK_DECAY_COEF: f64 = 2e-3;

/// Scale on object `Pv` when the card declares no verifier (`has_chron = 0`).
pub const NO_VERIFIER_PV_SCALE: f64 = 0.7;

pub fn sigmoid(x: f64) -> f64 {
    if !x.is_finite() {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }
    1.0 / (1.0 + (-x).exp())
}

pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

/// `ln(1 + x)` with the argument held above -1.
pub fn safe_log1p(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.max(-0.999_999).ln_1p()
}

/// `E / A`, or 0 when capacity is not meaningfully positive.
pub fn dose(e: f64, a: f64) -> f64 {
    if !(a > DOSE_EPS) || !e.is_finite() || !a.is_finite() {
        return 0.0;
    }
    finite_or_zero(e / a)
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// First finite value among `keys`, or `default`.
///
/// Aliases are listed in priority order, e.g. `["A*", "A_star"]`.
pub fn param(p: &ParamBindings, keys: &[&str], default: f64) -> f64 {
    keys.iter()
        .filter_map(|k| p.get(*k).copied())
        .find(|v| v.is_finite())
        .unwrap_or(default)
}

/// Weights of the stability sigmoid shared by both families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityWeights {
    pub pv: f64,
    pub vsigma: f64,
    pub drift: f64,
    pub topo: f64,
    pub witness: f64,
}

impl StabilityWeights {
    pub const DEFAULT: Self = Self {
        pv: 1.2,
        vsigma: 1.1,
        drift: 0.9,
        topo: 0.8,
        witness: 0.25,
    };
}

impl Default for StabilityWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `S = sigmoid(a1·Pv − a2·Vσ − a3·drift + a4·topo + a5·log1p(witness)·memory)`.
pub fn stability(
    w: &StabilityWeights,
    pv: f64,
    vsigma: f64,
    drift: f64,
    topo: f64,
    witness: f64,
    era: Era,
) -> f64 {
    let x = w.pv * pv - w.vsigma * vsigma - w.drift * drift
        + w.topo * topo
        + w.witness * safe_log1p(witness) * era.memory_multiplier();
    sigmoid(finite_or_zero(x))
}

/// Capability interface for one formula family.
pub trait MetricModel: Send + Sync {
    fn family(&self) -> MetricFamily;
    fn compute(&self, params: &ParamBindings, era: Era) -> Metrics;
}

// ----------------------------------------------------------------------------
// Object family
// ----------------------------------------------------------------------------

/// Object weights. `exergy`..`dose_penalty` in Vσ can be overridden per card
/// through the `l1`..`l5` parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectWeights {
    pub pv_witness: f64,
    pub pv_topo: f64,
    pub pv_dose: f64,
    pub pv_unreliability: f64,
    pub vs_exergy: f64,
    pub vs_infra: f64,
    pub vs_hazard: f64,
    pub vs_cvar: f64,
    pub vs_causal: f64,
    pub vs_dose: f64,
    pub vs_unreliability: f64,
    pub drift_hazard: f64,
    pub drift_exergy: f64,
    pub drift_infra: f64,
    pub drift_dose: f64,
    pub stability: StabilityWeights,
}

impl ObjectWeights {
    pub const DEFAULT: Self = Self {
        pv_witness: 0.6,
        pv_topo: 0.4,
        pv_dose: 0.3,
        pv_unreliability: 0.1,
        vs_exergy: 0.45,
        vs_infra: 0.35,
        vs_hazard: 0.4,
        vs_cvar: 0.35,
        vs_causal: 0.30,
        vs_dose: 0.35,
        vs_unreliability: 0.25,
        drift_hazard: 0.5,
        drift_exergy: 0.25,
        drift_infra: 0.2,
        drift_dose: 0.15,
        stability: StabilityWeights::DEFAULT,
    };
}

impl Default for ObjectWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Object-family scoring.
///
/// Inputs and defaults (aliases in priority order):
///
/// | input            | keys                    | default |
/// |------------------|-------------------------|---------|
/// | capacity `A`     | `A*`, `A_star`          | 100     |
/// | exposure `E`     | `E`, `E0`               | 0       |
/// | exergy           | `exergy_cost`           | 0       |
/// | infra            | `infra_footprint`       | 0       |
/// | hazard           | `hazard_rate`           | 0       |
/// | topo             | `topo`, `topo_class`    | 0.2     |
/// | witness          | `witness_count`         | 0       |
/// | cvar             | `cvar`, `cvar_alpha`    | 0       |
/// | causal penalty   | `causal_penalty`        | 0       |
/// | reliability `R`  | `reliability`           | 1       |
///
/// `has_chron = 0` marks a card without a verifier and scales `Pv` by
/// `NO_VERIFIER_PV_SCALE`. Any other value, or no binding, leaves it alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectModel {
    pub weights: ObjectWeights,
}

impl MetricModel for ObjectModel {
    fn family(&self) -> MetricFamily {
        MetricFamily::Object
    }

    fn compute(&self, p: &ParamBindings, era: Era) -> Metrics {
        let w = &self.weights;

        let a = param(p, &["A*", "A_star"], 100.0);
        let e = param(p, &["E", "E0"], 0.0);
        let exergy = param(p, &["exergy_cost"], 0.0);
        let infra = param(p, &["infra_footprint"], 0.0);
        let hazard = param(p, &["hazard_rate"], 0.0);
        let topo = param(p, &["topo", "topo_class"], 0.2);
        let witness = param(p, &["witness_count"], 0.0).max(0.0);
        let cvar = param(p, &["cvar", "cvar_alpha"], 0.0);
        let causal = param(p, &["causal_penalty"], 0.0);
        let unreliability = 1.0 - clamp01(param(p, &["reliability"], 1.0));

        let l1 = param(p, &["l1"], w.vs_exergy);
        let l2 = param(p, &["l2"], w.vs_infra);
        let l3 = param(p, &["l3"], w.vs_cvar);
        let l4 = param(p, &["l4"], w.vs_causal);
        let l5 = param(p, &["l5"], w.vs_dose);

        let verifier_scale = match p.get("has_chron") {
            Some(v) if *v == 0.0 => NO_VERIFIER_PV_SCALE,
            _ => 1.0,
        };

        let dose = dose(e, a);
        let dose_err = (1.0 - dose).abs();

        let risk_dry = (e - a).max(0.0).powi(2) * RISK_DRY_COEF;
        let risk_decay = (a - e).max(0.0) * RISK_DECAY_COEF;

        let pv = (w.pv_witness * safe_log1p(witness) + w.pv_topo * topo
            - w.pv_dose * dose_err
            - w.pv_unreliability * unreliability)
            * era.object_pv_scale()
            * verifier_scale;

        let vsigma = (l1 * exergy
            + l2 * infra
            + w.vs_hazard * hazard
            + l3 * cvar
            + l4 * causal
            + l5 * dose_err
            + w.vs_unreliability * unreliability)
            * era.object_vsigma_scale();

        let drift = w.drift_hazard * hazard
            + w.drift_exergy * exergy
            + w.drift_infra * infra
            + w.drift_dose * dose_err;

        let pv = finite_or_zero(pv);
        let vsigma = finite_or_zero(vsigma);
        let drift = finite_or_zero(drift);
        let topo = finite_or_zero(topo);

        Metrics {
            pv,
            vsigma,
            s: stability(&w.stability, pv, vsigma, drift, topo, witness, era),
            dose,
            drift,
            topo,
            influence: None,
            monstro_pr: None,
            risk_dry: Some(finite_or_zero(risk_dry)),
            risk_decay: Some(finite_or_zero(risk_decay)),
        }
    }
}

// ----------------------------------------------------------------------------
// Character family
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterWeights {
    pub infl_will: f64,
    pub infl_competence: f64,
    pub infl_resources: f64,
    pub infl_loyalty_base: f64,
    pub infl_loyalty: f64,
    pub pv_stress: f64,
    pub vs_stress: f64,
    pub vs_dark: f64,
    pub vs_causal: f64,
    pub vs_infra: f64,
    pub drift_stress: f64,
    pub drift_risk: f64,
    pub monstro_stress: f64,
    pub monstro_dark: f64,
    pub monstro_causal: f64,
    pub monstro_loyalty: f64,
    pub stability: StabilityWeights,
}

impl CharacterWeights {
    pub const DEFAULT: Self = Self {
        infl_will: 0.6,
        infl_competence: 0.6,
        infl_resources: 0.4,
        infl_loyalty_base: 0.7,
        infl_loyalty: 0.3,
        pv_stress: 0.2,
        vs_stress: 0.7,
        vs_dark: 0.5,
        vs_causal: 0.25,
        vs_infra: 0.15,
        drift_stress: 0.6,
        drift_risk: 0.2,
        monstro_stress: 0.6,
        monstro_dark: 0.4,
        monstro_causal: 0.3,
        monstro_loyalty: 0.25,
        stability: StabilityWeights::DEFAULT,
    };
}

impl Default for CharacterWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Character-family scoring.
///
/// Defaults: `will`, `competence`, `resources`, `loyalty`, `risk_tolerance`
/// 0.5; `stress` 0.3; `dark_exposure` 0.2; `causal_penalty`,
/// `infra_footprint`, `witness_count` 0; `topo` 0.2. Stress, dark exposure and
/// risk tolerance are clamped to [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterModel {
    pub weights: CharacterWeights,
}

impl MetricModel for CharacterModel {
    fn family(&self) -> MetricFamily {
        MetricFamily::Character
    }

    fn compute(&self, p: &ParamBindings, era: Era) -> Metrics {
        let w = &self.weights;

        let will = param(p, &["will"], 0.5);
        let competence = param(p, &["competence"], 0.5);
        let resources = param(p, &["resources"], 0.5);
        let loyalty = param(p, &["loyalty"], 0.5);
        let stress = clamp01(param(p, &["stress"], 0.3));
        let dark = clamp01(param(p, &["dark_exposure"], 0.2));
        let risk_tol = clamp01(param(p, &["risk_tolerance"], 0.5));
        let causal = param(p, &["causal_penalty"], 0.0);
        let infra = param(p, &["infra_footprint"], 0.0);
        let topo = finite_or_zero(param(p, &["topo", "topo_class"], 0.2));
        let witness = param(p, &["witness_count"], 0.0).max(0.0);
        let a = param(p, &["A*", "A_star"], 100.0);
        let e = param(p, &["E", "E0"], 0.0);

        let influence = (w.infl_will * will
            + w.infl_competence * competence
            + w.infl_resources * resources)
            * (w.infl_loyalty_base + w.infl_loyalty * loyalty);

        // Risk appetite closest to 0.5 is the most useful.
        let risk_dev = (risk_tol - 0.5).abs();
        let pv = influence * (0.8 + 0.2 * (1.0 - 2.0 * risk_dev)) - w.pv_stress * stress;

        let vsigma =
            w.vs_stress * stress + w.vs_dark * dark + w.vs_causal * causal + w.vs_infra * infra;

        let drift = w.drift_stress * stress + w.drift_risk * risk_dev;

        let monstro_pr = clamp01(
            w.monstro_stress * stress + w.monstro_dark * dark + w.monstro_causal * causal
                - w.monstro_loyalty * loyalty,
        );

        let pv = finite_or_zero(pv);
        let vsigma = finite_or_zero(vsigma);
        let drift = finite_or_zero(drift);

        Metrics {
            pv,
            vsigma,
            s: stability(&w.stability, pv, vsigma, drift, topo, witness, era),
            dose: dose(e, a),
            drift,
            topo,
            influence: Some(finite_or_zero(influence)),
            monstro_pr: Some(monstro_pr),
            risk_dry: None,
            risk_decay: None,
        }
    }
}

static OBJECT_MODEL: ObjectModel = ObjectModel {
    weights: ObjectWeights::DEFAULT,
};

static CHARACTER_MODEL: CharacterModel = CharacterModel {
    weights: CharacterWeights::DEFAULT,
};

/// Model with default weights for a formula family.
pub fn model_for(family: MetricFamily) -> &'static dyn MetricModel {
    match family {
        MetricFamily::Object => &OBJECT_MODEL,
        MetricFamily::Character => &CHARACTER_MODEL,
    }
}

/// Evaluate metrics for an entity of `kind` with default weights.
pub fn evaluate(kind: EntityKind, params: &ParamBindings, era: Era) -> Metrics {
    model_for(kind.family()).compute(params, era)
}
