// src/registry.rs
//
// Parameter schemas and their resolution.
//
// A registry maps model keys to `ModelDef`s. A model may `extends` another;
// resolution walks the chain depth-first, base params first, derived params
// overriding. Cycles and dangling `extends` never fail: resolution stops at
// the offending link and the partial schema is returned with a warning.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FabulaError, RunWarning};
use crate::scenario::EntityDescriptor;
use crate::types::{MetricFamily, ParamBindings};

/// One tunable field's allowed range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ParamDef {
    pub fn range(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            step: None,
            label: None,
        }
    }

    /// Schema default. Defined as the lower bound of the range.
    pub fn default_value(&self) -> f64 {
        self.min
    }
}

/// A named parameter schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default)]
    pub params: BTreeMap<String, ParamDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
}

pub type Schema = BTreeMap<String, ParamDef>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelRegistry {
    pub models: BTreeMap<String, ModelDef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    Wrapped { models: BTreeMap<String, ModelDef> },
    Bare(BTreeMap<String, ModelDef>),
}

/// A resolved schema plus anything that went wrong resolving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub schema: Schema,
    pub warnings: Vec<RunWarning>,
}

impl ModelRegistry {
    pub fn new(models: BTreeMap<String, ModelDef>) -> Self {
        Self { models }
    }

    /// Accepts either `{"models": {...}}` or a bare `{key: ModelDef}` map.
    pub fn from_json_str(json: &str) -> Result<Self, FabulaError> {
        let file: RegistryFile =
            serde_json::from_str(json).map_err(|e| FabulaError::RegistryParse(e.to_string()))?;
        Ok(match file {
            RegistryFile::Wrapped { models } | RegistryFile::Bare(models) => Self { models },
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, FabulaError> {
        let file: RegistryFile =
            serde_yaml::from_str(yaml).map_err(|e| FabulaError::RegistryParse(e.to_string()))?;
        Ok(match file {
            RegistryFile::Wrapped { models } | RegistryFile::Bare(models) => Self { models },
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FabulaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| FabulaError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ModelDef> {
        self.models.get(key)
    }

    /// Resolve `key` through its `extends` chain.
    pub fn resolve_schema(&self, key: &str) -> Resolved {
        let mut out = Resolved::default();
        let mut visited = BTreeSet::new();
        self.resolve_into(key, &mut visited, &mut out);
        out
    }

    fn resolve_into(&self, key: &str, visited: &mut BTreeSet<String>, out: &mut Resolved) {
        if !visited.insert(key.to_string()) {
            warn!(model = key, "extends cycle; using partial schema");
            out.warnings.push(RunWarning::ExtendsCycle {
                model: key.to_string(),
            });
            return;
        }
        let Some(def) = self.models.get(key) else {
            warn!(model = key, "model not found in registry");
            out.warnings.push(RunWarning::MissingModel {
                model: key.to_string(),
            });
            return;
        };
        if let Some(base) = &def.extends {
            self.resolve_into(base, visited, out);
        }
        for (name, p) in &def.params {
            out.schema.insert(name.clone(), p.clone());
        }
    }
}

/// Parameter names that refer to the same quantity, canonical name first.
pub const PARAM_ALIASES: [&[&str]; 5] = [
    &["A*", "A_star"],
    &["E", "E0"],
    &["topo", "topo_class"],
    &["cvar", "cvar_alpha"],
    &["v", "views"],
];

/// Schema used when the registry has nothing for an entity.
pub fn fallback_schema(family: MetricFamily) -> Schema {
    let defs: &[(&str, f64, f64)] = match family {
        MetricFamily::Object => &[
            ("A*", 10.0, 1000.0),
            ("E", 0.0, 1000.0),
            ("exergy_cost", 0.0, 10.0),
            ("infra_footprint", 0.0, 10.0),
            ("hazard_rate", 0.0, 1.0),
            ("topo", 0.0, 3.0),
            ("witness_count", 0.0, 500.0),
        ],
        MetricFamily::Character => &[
            ("will", 0.0, 1.0),
            ("loyalty", 0.0, 1.0),
            ("stress", 0.0, 1.0),
            ("resources", 0.0, 1.0),
            ("competence", 0.0, 1.0),
            ("risk_tolerance", 0.0, 1.0),
            ("mandate_power", 0.0, 1.0),
        ],
    };
    defs.iter()
        .map(|(name, min, max)| (name.to_string(), ParamDef::range(*min, *max)))
        .collect()
}

/// Concrete bindings for `entity`: schema defaults overlaid by the entity's
/// own bindings. Unknown binding keys pass through unchanged.
///
/// The model key is `model_ref`, else the entity type, else `fallback_key`.
/// When none of them resolves to anything, the built-in schema for the
/// entity's formula family is used.
pub fn materialize_params(
    entity: &EntityDescriptor,
    registry: Option<&ModelRegistry>,
    fallback_key: Option<&str>,
) -> (ParamBindings, Vec<RunWarning>) {
    let mut warnings = Vec::new();
    let mut schema = Schema::new();

    if let Some(reg) = registry {
        let candidates = [
            entity.model_ref.as_deref(),
            Some(entity.kind.as_str()),
            fallback_key,
        ];
        if let Some(key) = candidates
            .into_iter()
            .flatten()
            .find(|k| reg.get(k).is_some())
        {
            let resolved = reg.resolve_schema(key);
            schema = resolved.schema;
            warnings = resolved.warnings;
        } else if let Some(key) = entity.model_ref.as_deref() {
            warn!(model = key, "model_ref not found; using built-in schema");
            warnings.push(RunWarning::MissingModel {
                model: key.to_string(),
            });
        }
    }

    if schema.is_empty() {
        schema = fallback_schema(entity.kind.family());
    }

    let mut out: ParamBindings = schema
        .iter()
        .map(|(name, def)| (name.clone(), def.default_value()))
        .collect();
    // A bound alias must not be shadowed by a defaulted sibling.
    for group in PARAM_ALIASES {
        if group.iter().any(|k| entity.param_bindings.contains_key(*k)) {
            for k in group.iter() {
                if !entity.param_bindings.contains_key(*k) {
                    out.remove(*k);
                }
            }
        }
    }
    for (k, v) in &entity.param_bindings {
        out.insert(k.clone(), *v);
    }
    (out, warnings)
}

/// Overlay `overrides` onto `bindings`, skipping `locked` names.
pub fn overlay_unlocked(
    bindings: &mut ParamBindings,
    overrides: &ParamBindings,
    locked: &[String],
) -> Vec<RunWarning> {
    let mut warnings = Vec::new();
    for (k, v) in overrides {
        if locked.iter().any(|l| l == k) {
            warn!(param = %k, "parameter is locked; override dropped");
            warnings.push(RunWarning::LockedParam { param: k.clone() });
            continue;
        }
        bindings.insert(k.clone(), *v);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;

    fn registry(json: &str) -> ModelRegistry {
        ModelRegistry::from_json_str(json).unwrap()
    }

    #[test]
    fn derived_overrides_base() {
        let reg = registry(
            r#"{"models": {
                "base": {"params": {"a": {"min": 0, "max": 1}, "b": {"min": 2, "max": 3}}},
                "derived": {"extends": "base", "params": {"b": {"min": 5, "max": 9}}}
            }}"#,
        );
        let r = reg.resolve_schema("derived");
        assert!(r.warnings.is_empty());
        assert_eq!(r.schema["a"].min, 0.0);
        assert_eq!(r.schema["b"].min, 5.0);
    }

    #[test]
    fn bare_map_accepted() {
        let reg = registry(r#"{"x": {"params": {"p": {"min": 1, "max": 2, "label": "P"}}}}"#);
        assert_eq!(reg.get("x").unwrap().params["p"].label.as_deref(), Some("P"));
    }

    #[test]
    fn fallback_schema_used_without_registry() {
        let entity = EntityDescriptor {
            kind: EntityKind::Character,
            param_bindings: [("stress".to_string(), 0.9), ("custom".to_string(), 7.0)]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let (p, w) = materialize_params(&entity, None, None);
        assert!(w.is_empty());
        assert_eq!(p["stress"], 0.9);
        assert_eq!(p["will"], 0.0);
        assert_eq!(p["custom"], 7.0);
        assert!(p.contains_key("mandate_power"));
    }

    #[test]
    fn bound_alias_not_shadowed_by_schema_default() {
        let entity = EntityDescriptor {
            kind: EntityKind::Object,
            param_bindings: [("E0".to_string(), 50.0), ("A_star".to_string(), 80.0)]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let (p, _) = materialize_params(&entity, None, None);
        assert!(!p.contains_key("E"));
        assert!(!p.contains_key("A*"));
        assert_eq!(p["E0"], 50.0);
        assert_eq!(p["hazard_rate"], 0.0);
    }

    #[test]
    fn locked_params_survive_overlay() {
        let mut b: ParamBindings = [("A*".to_string(), 100.0)].into_iter().collect();
        let o: ParamBindings = [("A*".to_string(), 5.0), ("E".to_string(), 3.0)]
            .into_iter()
            .collect();
        let w = overlay_unlocked(&mut b, &o, &["A*".to_string()]);
        assert_eq!(b["A*"], 100.0);
        assert_eq!(b["E"], 3.0);
        assert_eq!(
            w,
            vec![RunWarning::LockedParam {
                param: "A*".to_string()
            }]
        );
    }
}
