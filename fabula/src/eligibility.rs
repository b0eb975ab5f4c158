// src/eligibility.rs
//
// Eligibility scoring: which narrative roles an entity is fit for, given its
// instantaneous metrics and parameters.
//
// Each item aggregates a few shaped sub-scores in [0, 1]:
// - prefer_high(x, knee): 0 below the knee, rising to 1 at x = 1
// - prefer_low(x, knee):  1 at x = 0, falling to 0 at the knee
// - z_oriented(x, target, tol): 1 at target, 0 at distance >= tol

use serde::Serialize;

use crate::metrics::{clamp01, param};
use crate::types::{EntityKind, MetricFamily, Metrics, ParamBindings};

/// Default pass threshold on an item's aggregate score.
pub const PASS_SCORE: f64 = 0.55;
pub const LOW_FOOTPRINT_PASS_SCORE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityItem {
    pub key: &'static str,
    pub label: &'static str,
    pub ok: bool,
    pub score: f64,
    pub why: String,
}

impl EligibilityItem {
    fn new(key: &'static str, label: &'static str, score: f64, pass: f64, why: String) -> Self {
        let score = clamp01(score);
        Self {
            key,
            label,
            ok: score >= pass,
            score,
            why,
        }
    }
}

pub fn prefer_high(x: f64, knee: f64) -> f64 {
    clamp01((x - knee) / (1.0 - knee).max(1e-9))
}

pub fn prefer_low(x: f64, knee: f64) -> f64 {
    clamp01((knee - x) / knee.max(1e-9))
}

pub fn z_oriented(x: f64, target: f64, tol: f64) -> f64 {
    clamp01(1.0 - (x - target).abs() / tol.max(1e-9))
}

/// Parameters that drive a given item, for UI highlighting.
pub fn relevant_params(family: MetricFamily, item: &str) -> &'static [&'static str] {
    match (family, item) {
        (MetricFamily::Character, "negotiation") => &[
            "will",
            "competence",
            "resources",
            "loyalty",
            "stress",
            "risk_tolerance",
        ],
        (MetricFamily::Character, "repair_nomonstr") => &[
            "stress",
            "risk_tolerance",
            "mandate_power",
            "resources",
            "topo",
            "dark_exposure",
        ],
        (MetricFamily::Character, "incident_localize") => &[
            "topo",
            "resources",
            "mandate_power",
            "competence",
            "risk_tolerance",
        ],
        (MetricFamily::Object, "deploy_stable") => {
            &["E", "A*", "hazard_rate", "exergy_cost", "infra_footprint", "cvar"]
        }
        (MetricFamily::Object, "low_footprint") => &["exergy_cost", "infra_footprint"],
        (MetricFamily::Object, "crowd_safe") => &["hazard_rate", "witness_count", "topo"],
        (MetricFamily::Object, "incident_localize") => {
            &["topo", "rho", "causal_penalty", "hazard_rate"]
        }
        _ => &[],
    }
}

/// Score every item applicable to `kind`.
pub fn evaluate(kind: EntityKind, m: &Metrics, p: &ParamBindings) -> Vec<EligibilityItem> {
    match kind.family() {
        MetricFamily::Character => character_items(m, p),
        MetricFamily::Object => object_items(m, p),
    }
}

fn character_items(m: &Metrics, p: &ParamBindings) -> Vec<EligibilityItem> {
    let stress = param(p, &["stress"], 0.3);
    let dark = param(p, &["dark_exposure"], 0.2);
    let will = param(p, &["will"], 0.5);
    let competence = param(p, &["competence"], 0.5);
    let resources = param(p, &["resources"], 0.5);
    let loyalty = param(p, &["loyalty"], 0.5);

    let influence = m
        .influence
        .unwrap_or((0.6 * will + 0.6 * competence + 0.4 * resources) * (0.7 + 0.3 * loyalty));
    let monstro = m
        .monstro_pr
        .unwrap_or_else(|| clamp01(0.6 * stress + 0.4 * dark));

    let negotiation = (prefer_high(m.pv, 0.6)
        + prefer_high(influence, 0.6)
        + prefer_high(m.s, 0.5)
        + prefer_low(monstro, 0.3)
        + prefer_low(stress, 0.5))
        / 5.0;

    let repair = (prefer_low(m.vsigma, 0.4)
        + prefer_low(monstro, 0.25)
        + prefer_low(stress, 0.4)
        + prefer_high(m.s, 0.5))
        / 4.0;

    let localize =
        (prefer_low(m.drift, 0.3) + prefer_high(m.topo, 0.6) + prefer_high(m.s, 0.5)) / 3.0;

    vec![
        EligibilityItem::new(
            "negotiation",
            "Negotiation",
            negotiation,
            PASS_SCORE,
            format!(
                "Pv={:.2}, Infl={:.2}, S={:.2}, mon={:.2}, stress={:.2}",
                m.pv, influence, m.s, monstro, stress
            ),
        ),
        EligibilityItem::new(
            "repair_nomonstr",
            "Repair without a monster",
            repair,
            PASS_SCORE,
            format!(
                "Vσ={:.2}, mon={:.2}, stress={:.2}, S={:.2}",
                m.vsigma, monstro, stress, m.s
            ),
        ),
        EligibilityItem::new(
            "incident_localize",
            "Incident localisation",
            localize,
            PASS_SCORE,
            format!("drift={:.2}, topo={:.2}, S={:.2}", m.drift, m.topo, m.s),
        ),
    ]
}

fn object_items(m: &Metrics, p: &ParamBindings) -> Vec<EligibilityItem> {
    let hazard = param(p, &["hazard_rate"], 0.0);
    let exergy = param(p, &["exergy_cost"], 0.0);
    let infra = param(p, &["infra_footprint"], 0.0);
    let witnesses = param(p, &["witness_count"], 0.0);

    let deploy = (z_oriented(m.dose, 1.0, 0.15)
        + prefer_low(m.vsigma, 0.4)
        + prefer_low(hazard, 0.4))
        / 3.0;

    let footprint = (prefer_low(exergy, 0.4) + prefer_low(infra, 0.4)) / 2.0;

    // Crowds near a hazardous object are penalised.
    let crowd_penalty = if hazard > 0.35 {
        clamp01(1.0 - witnesses / 300.0)
    } else {
        1.0
    };
    let crowd = (prefer_low(hazard, 0.35) + prefer_high(m.s, 0.5)) * 0.5 * crowd_penalty;

    let localize = (prefer_low(m.drift, 0.3)
        + prefer_high(m.topo, 0.6)
        + z_oriented(m.dose, 1.0, 0.2))
        / 3.0;

    vec![
        EligibilityItem::new(
            "deploy_stable",
            "Stable deployment",
            deploy,
            PASS_SCORE,
            format!(
                "dose={:.2}, Vσ={:.2}, hazard={:.2}",
                m.dose, m.vsigma, hazard
            ),
        ),
        EligibilityItem::new(
            "low_footprint",
            "Low infrastructure footprint",
            footprint,
            LOW_FOOTPRINT_PASS_SCORE,
            format!("exergy={exergy:.2}, infra={infra:.2}"),
        ),
        EligibilityItem::new(
            "crowd_safe",
            "Safe for crowds",
            crowd,
            PASS_SCORE,
            format!("hazard={:.2}, S={:.2}, witnesses={witnesses}", hazard, m.s),
        ),
        EligibilityItem::new(
            "incident_localize",
            "Incident localisation",
            localize,
            PASS_SCORE,
            format!(
                "drift={:.2}, topo={:.2}, dose={:.2}",
                m.drift, m.topo, m.dose
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use crate::types::Era;

    fn bindings(pairs: &[(&str, f64)]) -> ParamBindings {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn shape_functions() {
        assert_eq!(prefer_high(0.6, 0.6), 0.0);
        assert_eq!(prefer_high(1.0, 0.6), 1.0);
        assert_eq!(prefer_low(0.0, 0.4), 1.0);
        assert_eq!(prefer_low(0.5, 0.4), 0.0);
        assert_eq!(z_oriented(1.0, 1.0, 0.15), 1.0);
        assert_eq!(z_oriented(1.3, 1.0, 0.15), 0.0);
    }

    #[test]
    fn item_sets_by_family() {
        let p = ParamBindings::new();
        let m = Metrics::default();
        let keys: Vec<_> = evaluate(EntityKind::Character, &m, &p)
            .iter()
            .map(|i| i.key)
            .collect();
        assert_eq!(keys, vec!["negotiation", "repair_nomonstr", "incident_localize"]);
        let keys: Vec<_> = evaluate(EntityKind::Place, &m, &p)
            .iter()
            .map(|i| i.key)
            .collect();
        assert_eq!(
            keys,
            vec!["deploy_stable", "low_footprint", "crowd_safe", "incident_localize"]
        );
    }

    #[test]
    fn clean_object_has_low_footprint() {
        let p = bindings(&[("A*", 100.0), ("E", 100.0)]);
        let m = metrics::evaluate(EntityKind::Object, &p, Era::Current);
        let items = evaluate(EntityKind::Object, &m, &p);
        let fp = items.iter().find(|i| i.key == "low_footprint").unwrap();
        assert_eq!(fp.score, 1.0);
        assert!(fp.ok);
    }

    #[test]
    fn hazardous_crowd_penalised() {
        let m = Metrics {
            s: 0.9,
            ..Default::default()
        };
        let calm = bindings(&[("hazard_rate", 0.36), ("witness_count", 0.0)]);
        let crowded = bindings(&[("hazard_rate", 0.36), ("witness_count", 300.0)]);
        let a = evaluate(EntityKind::Object, &m, &calm);
        let b = evaluate(EntityKind::Object, &m, &crowded);
        let score = |v: &[EligibilityItem]| v.iter().find(|i| i.key == "crowd_safe").unwrap().score;
        assert!(score(&a) > 0.0);
        assert_eq!(score(&b), 0.0);
    }

    #[test]
    fn every_item_has_relevant_params() {
        let p = ParamBindings::new();
        let m = Metrics::default();
        for kind in [EntityKind::Character, EntityKind::Object] {
            for item in evaluate(kind, &m, &p) {
                assert!(!relevant_params(kind.family(), item.key).is_empty(), "{}", item.key);
            }
        }
    }
}
