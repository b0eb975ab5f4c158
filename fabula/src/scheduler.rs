// src/scheduler.rs
//
// Intervention scheduler and quarantine check.
//
// The scheduler is built once per run from the scenario's intervention list:
// trigger day -> interventions in input order. Each day, before the process
// step, that day's interventions are applied to the state and then the shock
// expiries registered for that day are processed. After the day's metrics
// exist, that day's `auto_quarantine_at_S` entries compare S to their
// threshold; a threshold is only ever checked on its own trigger day.
//
// Malformed, unknown or pointless interventions never fail a run: they are
// skipped and reported as `RunWarning`s.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::RunWarning;
use crate::metrics::clamp01;
use crate::scenario::{Intervention, InterventionEntry};
use crate::state::SimulationState;
use crate::types::Day;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterventionScheduler {
    by_day: BTreeMap<Day, Vec<Intervention>>,
}

impl InterventionScheduler {
    /// Index `entries` by trigger day. Returns the scheduler and any
    /// build-time warnings (unparseable entries, days past the run).
    pub fn build(entries: &[InterventionEntry], days: Day) -> (Self, Vec<RunWarning>) {
        let mut by_day: BTreeMap<Day, Vec<Intervention>> = BTreeMap::new();
        let mut warnings = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            match entry {
                InterventionEntry::Known(iv) => {
                    if iv.t() >= days {
                        warn!(day = iv.t(), kind = iv.kind_str(), days, "intervention never fires");
                        warnings.push(RunWarning::InterventionOutOfRange {
                            day: iv.t(),
                            kind: iv.kind_str().to_string(),
                            days,
                        });
                    }
                    by_day.entry(iv.t()).or_default().push(iv.clone());
                }
                InterventionEntry::Unknown(_) => {
                    let detail = entry
                        .rejection_detail()
                        .unwrap_or_else(|| "unrecognised entry".to_string());
                    warn!(index, %detail, "intervention ignored");
                    warnings.push(RunWarning::UnrecognisedIntervention { index, detail });
                }
            }
        }

        (Self { by_day }, warnings)
    }

    pub fn on_day(&self, day: Day) -> &[Intervention] {
        self.by_day.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Apply every intervention scheduled for `day`, in input order.
    ///
    /// Quarantine entries do nothing here; see `check_quarantine`.
    pub fn apply_day(&self, day: Day, st: &mut SimulationState, warnings: &mut Vec<RunWarning>) {
        for iv in self.on_day(day) {
            if let Some(detail) = invalid_payload(iv) {
                warn!(day, kind = iv.kind_str(), %detail, "intervention ignored");
                warnings.push(RunWarning::IneffectiveIntervention {
                    day,
                    kind: iv.kind_str().to_string(),
                    detail,
                });
                continue;
            }
            apply_one(iv, day, st, warnings);
        }
    }

    /// Compare this day's stability against the quarantine thresholds
    /// scheduled for `day`. Returns true if quarantine latched now.
    pub fn check_quarantine(&self, day: Day, s: f64, st: &mut SimulationState) -> bool {
        let mut latched = false;
        for iv in self.on_day(day) {
            let Intervention::AutoQuarantineAtS { threshold, .. } = *iv else {
                continue;
            };
            // Non-finite thresholds were already reported by `apply_day`.
            if threshold.is_finite() && s < threshold && st.latch_quarantine() {
                debug!(day, s, threshold, "quarantine latched");
                latched = true;
            }
        }
        latched
    }

    /// Remove shock boosts that expire on `day`.
    pub fn expire_shocks(&self, day: Day, st: &mut SimulationState) {
        if let Some(amount) = st.expiries.remove(&day) {
            st.shock_load = (st.shock_load - amount).max(0.0);
            // Exact zero once nothing is pending, so float residue cannot linger.
            if st.expiries.is_empty() {
                st.shock_load = 0.0;
            }
            debug!(day, amount, remaining = st.shock_load, "shock expired");
        }
    }
}

fn invalid_payload(iv: &Intervention) -> Option<String> {
    let fields: Vec<(&str, f64)> = match iv {
        Intervention::ExposurePlan { a_star, v, q, rho, .. } => [
            ("Astar", *a_star),
            ("v", *v),
            ("q", *q),
            ("rho", *rho),
        ]
        .into_iter()
        .filter_map(|(n, x)| x.map(|x| (n, x)))
        .collect(),
        Intervention::PatchPlan { r, s, .. } => vec![("R", *r), ("s", *s)],
        Intervention::WitnessRally { add_mw, add_topo, .. } => {
            vec![("addMw", *add_mw), ("addTopo", *add_topo)]
        }
        Intervention::Shock { cvar_boost, .. } => vec![("cvarBoost", *cvar_boost)],
        Intervention::CausalSurgery { delta_c, .. } => vec![("deltaC", *delta_c)],
        Intervention::ReliabilityBoost { d_r, .. } => vec![("dR", *d_r)],
        Intervention::BudgetCut {
            d_infra, d_exergy, ..
        } => vec![("dInfra", *d_infra), ("dExergy", *d_exergy)],
        Intervention::AutoQuarantineAtS { threshold, .. } => vec![("threshold", *threshold)],
    };
    fields
        .into_iter()
        .find(|(_, x)| !x.is_finite())
        .map(|(name, x)| format!("non-finite '{name}' = {x}"))
}

fn apply_one(
    iv: &Intervention,
    day: Day,
    st: &mut SimulationState,
    warnings: &mut Vec<RunWarning>,
) {
    match *iv {
        Intervention::ExposurePlan { a_star, v, q, rho, .. } => {
            if a_star.is_none() && v.is_none() && q.is_none() && rho.is_none() {
                warn!(day, "exposure_plan without fields");
                warnings.push(RunWarning::IneffectiveIntervention {
                    day,
                    kind: iv.kind_str().to_string(),
                    detail: "no Astar, v, q or rho given".to_string(),
                });
                return;
            }
            if let Some(a) = a_star {
                st.a = a;
                st.a_baseline = a;
            }
            if let Some(v) = v {
                st.v = v.max(0.0);
            }
            if let Some(q) = q {
                st.q = clamp01(q);
            }
            if let Some(rho) = rho {
                st.rho = rho;
            }
        }
        Intervention::PatchPlan { r, s, .. } => {
            let effort = r * s;
            st.exergy = (st.exergy - 0.2 * effort).max(0.0);
            st.infra = (st.infra - 0.05 * effort).max(0.0);
            st.r = clamp01(st.r + 0.05 * effort);
        }
        Intervention::WitnessRally {
            add_mw, add_topo, ..
        } => {
            st.mw = (st.mw + add_mw).max(0.0);
            st.topo = (st.topo + add_topo).max(0.0);
        }
        Intervention::Shock {
            cvar_boost, days, ..
        } => {
            let detail = if days == 0 {
                Some("shock with zero duration".to_string())
            } else if cvar_boost < 0.0 {
                Some(format!("negative cvarBoost {cvar_boost}"))
            } else {
                None
            };
            if let Some(detail) = detail {
                warn!(day, %detail, "shock ignored");
                warnings.push(RunWarning::IneffectiveIntervention {
                    day,
                    kind: iv.kind_str().to_string(),
                    detail,
                });
                return;
            }
            st.shock_load += cvar_boost;
            *st.expiries.entry(day.saturating_add(days)).or_insert(0.0) += cvar_boost;
        }
        Intervention::CausalSurgery { delta_c, .. } => {
            st.causal = (st.causal + delta_c).max(0.0);
        }
        Intervention::ReliabilityBoost { d_r, .. } => {
            st.r = clamp01(st.r + d_r);
        }
        Intervention::BudgetCut {
            d_infra, d_exergy, ..
        } => {
            st.infra = (st.infra + d_infra).max(0.0);
            st.exergy = (st.exergy + d_exergy).max(0.0);
        }
        Intervention::AutoQuarantineAtS { .. } => {}
    }
}
