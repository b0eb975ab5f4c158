// src/state.rs
//
// Mutable per-run simulation state.
//
// Exactly one `SimulationState` exists per run; it is created by the
// simulator and passed by `&mut` to every day-step function. Nothing in here
// is shared between runs.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::metrics::{clamp01, param};
use crate::scenario::StateSpec;
use crate::types::{Day, ParamBindings};

/// One-way run mode latch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Running,
    Quarantined,
}

/// PID memory carried between days.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidMemory {
    pub integral: f64,
    pub prev_error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// Exposure.
    pub e: f64,
    /// Capacity.
    pub a: f64,
    /// Moisture buffer in [0, 1].
    pub h: f64,
    /// Reliability in [0, 1].
    pub r: f64,
    /// Witness weight.
    pub mw: f64,
    pub topo: f64,
    /// Baseline tail risk; decays daily.
    pub cvar: f64,
    /// Sum of live shock boosts; leaves only through expiry.
    pub shock_load: f64,

    /// Daily views.
    pub v: f64,
    /// Conversion of views into exposure.
    pub q: f64,
    pub rho: f64,
    /// Capacity baseline that `a` relaxes toward.
    pub a_baseline: f64,

    pub exergy: f64,
    pub infra: f64,
    pub hazard: f64,
    pub causal: f64,

    pub pid: PidMemory,
    pub mode: RunMode,
    /// Day -> total shock boost to remove on that day.
    pub expiries: BTreeMap<Day, f64>,
    /// Exposure input applied on the most recent step.
    pub last_input: f64,
}

impl SimulationState {
    /// Build the initial state.
    ///
    /// Priority per field: scenario `state` block, then entity bindings, then
    /// `cfg`. Process rates come from `cfg`, which already carries the
    /// scenario's `k` overlay; an entity `rho` binding applies only when the
    /// scenario has no `k.rho`.
    pub fn initial(
        cfg: &Config,
        params: &ParamBindings,
        overrides: Option<&StateSpec>,
        scenario_rho: Option<f64>,
    ) -> Self {
        let init = &cfg.initial;
        let s = overrides.cloned().unwrap_or_default();
        let pick = |o: Option<f64>, keys: &[&str], d: f64| {
            o.filter(|v| v.is_finite()).unwrap_or_else(|| param(params, keys, d))
        };

        let a_baseline = param(params, &["A*", "A_star"], cfg.process.a_baseline);
        let rho = scenario_rho
            .filter(|v| v.is_finite())
            .unwrap_or_else(|| param(params, &["rho"], cfg.process.rho));

        Self {
            e: pick(s.e, &["E", "E0"], init.e).max(0.0),
            a: pick(s.a, &["A*", "A_star"], init.a).clamp(cfg.policy.a_min, cfg.policy.a_max),
            h: clamp01(pick(s.h, &["H"], init.h)),
            r: clamp01(pick(s.r, &["reliability"], init.r)),
            mw: pick(s.mw, &["witness_count"], init.mw).max(0.0),
            topo: pick(s.topo, &["topo", "topo_class"], init.topo).max(0.0),
            cvar: pick(s.cvar, &["cvar", "cvar_alpha"], init.cvar).max(0.0),
            shock_load: 0.0,
            v: param(params, &["v", "views"], init.v).max(0.0),
            q: clamp01(param(params, &["q"], init.q)),
            rho,
            a_baseline,
            exergy: param(params, &["exergy_cost"], init.exergy).max(0.0),
            infra: param(params, &["infra_footprint"], init.infra).max(0.0),
            hazard: param(params, &["hazard_rate"], init.hazard).max(0.0),
            causal: param(params, &["causal_penalty"], init.causal).max(0.0),
            pid: PidMemory::default(),
            mode: RunMode::Running,
            expiries: BTreeMap::new(),
            last_input: 0.0,
        }
    }

    pub fn is_quarantined(&self) -> bool {
        self.mode == RunMode::Quarantined
    }

    /// Latch quarantine. Returns true only on the transition.
    pub fn latch_quarantine(&mut self) -> bool {
        if self.is_quarantined() {
            return false;
        }
        self.mode = RunMode::Quarantined;
        true
    }

    /// Reported tail risk: baseline plus live shocks.
    pub fn cvar_total(&self) -> f64 {
        self.cvar + self.shock_load
    }

    /// Metric-evaluator view of the current state, layered over `base`.
    pub fn to_params(&self, base: &ParamBindings) -> ParamBindings {
        let mut p = base.clone();
        for (k, v) in [
            ("E", self.e),
            ("A*", self.a),
            ("exergy_cost", self.exergy),
            ("infra_footprint", self.infra),
            ("hazard_rate", self.hazard),
            ("causal_penalty", self.causal),
            ("cvar", self.cvar_total()),
            ("topo", self.topo),
            ("witness_count", self.mw),
            ("reliability", self.r),
        ] {
            p.insert(k.to_string(), v);
        }
        // Aliases would shadow the live values in the evaluator's lookup order.
        for alias in ["A_star", "E0", "topo_class", "cvar_alpha"] {
            p.remove(alias);
        }
        p
    }

    /// Replace any non-finite field with a safe value and re-clamp bounds.
    pub fn sanitize(&mut self, cfg: &Config) {
        fn fix(x: &mut f64, fallback: f64) {
            if !x.is_finite() {
                *x = fallback;
            }
        }
        fix(&mut self.e, 0.0);
        fix(&mut self.a, cfg.process.a_baseline);
        fix(&mut self.h, 0.0);
        fix(&mut self.r, 0.0);
        fix(&mut self.mw, 0.0);
        fix(&mut self.topo, 0.0);
        fix(&mut self.cvar, 0.0);
        fix(&mut self.shock_load, 0.0);
        fix(&mut self.pid.integral, 0.0);
        fix(&mut self.pid.prev_error, 0.0);

        self.e = self.e.max(0.0);
        self.a = self.a.clamp(cfg.policy.a_min, cfg.policy.a_max);
        self.h = clamp01(self.h);
        self.r = clamp01(self.r);
        self.cvar = self.cvar.max(0.0);
        self.shock_load = self.shock_load.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_state_beats_entity_beats_config() {
        let cfg = Config::default();
        let params: ParamBindings = [("E".to_string(), 50.0), ("A*".to_string(), 120.0)]
            .into_iter()
            .collect();
        let st = SimulationState::initial(&cfg, &params, None, None);
        assert_eq!(st.e, 50.0);
        assert_eq!(st.a, 120.0);
        assert_eq!(st.a_baseline, 120.0);
        assert_eq!(st.h, cfg.initial.h);

        let ov = StateSpec {
            e: Some(10.0),
            ..Default::default()
        };
        let st = SimulationState::initial(&cfg, &params, Some(&ov), Some(0.9));
        assert_eq!(st.e, 10.0);
        assert_eq!(st.rho, 0.9);
    }

    #[test]
    fn quarantine_latch_is_one_way() {
        let cfg = Config::default();
        let mut st = SimulationState::initial(&cfg, &ParamBindings::new(), None, None);
        assert!(st.latch_quarantine());
        assert!(!st.latch_quarantine());
        assert!(st.is_quarantined());
    }

    #[test]
    fn to_params_drops_shadowing_aliases() {
        let cfg = Config::default();
        let base: ParamBindings = [("A_star".to_string(), 1.0), ("will".to_string(), 0.4)]
            .into_iter()
            .collect();
        let st = SimulationState::initial(&cfg, &base, None, None);
        let p = st.to_params(&base);
        assert!(!p.contains_key("A_star"));
        assert_eq!(p["will"], 0.4);
        assert_eq!(p["A*"], st.a);
    }

    #[test]
    fn sanitize_removes_nan() {
        let cfg = Config::default();
        let mut st = SimulationState::initial(&cfg, &ParamBindings::new(), None, None);
        st.e = f64::NAN;
        st.a = f64::INFINITY;
        st.r = 3.0;
        st.sanitize(&cfg);
        assert_eq!(st.e, 0.0);
        assert_eq!(st.a, cfg.process.a_baseline);
        assert_eq!(st.r, 1.0);
    }
}
