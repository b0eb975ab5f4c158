// src/types.rs
//
// Shared value types used across fabula:
// - EntityKind / MetricFamily: what a card is and which formula family scores it
// - Era: narrative timeline segment that scales memory-dependent weights
// - ParamBindings: concrete parameter values for one entity instance
// - Metrics: one instantaneous snapshot of derived scores
// - SeriesPoint: one simulated day (metrics + raw state)
// - MetricKey: selector for banding / summaries
//
// Maps are BTreeMap throughout so that serialisation order (and therefore
// checksums) is stable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Concrete parameter values for one entity instance.
pub type ParamBindings = BTreeMap<String, f64>;

/// Simulated day index.
pub type Day = u32;

/// Card type as found in entity descriptors.
///
/// Unknown type strings map to `Hybrid` rather than failing; content
/// ingestion is not this crate's concern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Character,
    Object,
    Place,
    Protocol,
    Event,
    Document,
    #[default]
    Hybrid,
}

/// Formula family used by the metric evaluator.
///
/// Exactly two exist; every `EntityKind` maps onto one of them once, up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Object,
    Character,
}

impl EntityKind {
    /// Parse a card type (case-insensitive). Plural folder names are accepted.
    pub fn parse(s: &str) -> EntityKind {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" | "characters" => EntityKind::Character,
            "object" | "objects" => EntityKind::Object,
            "place" | "places" => EntityKind::Place,
            "protocol" | "protocols" => EntityKind::Protocol,
            "event" | "events" => EntityKind::Event,
            "document" | "documents" => EntityKind::Document,
            _ => EntityKind::Hybrid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Object => "object",
            EntityKind::Place => "place",
            EntityKind::Protocol => "protocol",
            EntityKind::Event => "event",
            EntityKind::Document => "document",
            EntityKind::Hybrid => "hybrid",
        }
    }

    /// Formula family for this kind. Everything that is not a character is
    /// scored with the object formulas.
    pub fn family(&self) -> MetricFamily {
        match self {
            EntityKind::Character => MetricFamily::Character,
            _ => MetricFamily::Object,
        }
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        EntityKind::parse(&s)
    }
}

impl From<EntityKind> for String {
    fn from(k: EntityKind) -> Self {
        k.as_str().to_string()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrative era ("branch").
///
/// Earlier eras model a society with weaker collective memory: the witness
/// term in `S` is discounted and some object weights are scaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Era {
    #[default]
    Current,
    PreRector,
    PreBorders,
}

impl Era {
    pub fn parse(s: &str) -> Option<Era> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Some(Era::Current),
            "pre-rector" | "pre_rector" | "prerector" => Some(Era::PreRector),
            "pre-borders" | "pre_borders" | "preborders" => Some(Era::PreBorders),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Era::Current => "current",
            Era::PreRector => "pre-rector",
            Era::PreBorders => "pre-borders",
        }
    }

    /// Multiplier on the `log1p(witness)` term of `S`.
    pub fn memory_multiplier(&self) -> f64 {
        match self {
            Era::Current => 1.0,
            Era::PreRector => 0.7,
            Era::PreBorders => 0.4,
        }
    }

    /// Scale on object `Pv`.
    pub fn object_pv_scale(&self) -> f64 {
        match self {
            Era::PreBorders => 0.8,
            _ => 1.0,
        }
    }

    /// Scale on object `Vsigma` (weaker ethical multiplier before the Rector).
    pub fn object_vsigma_scale(&self) -> f64 {
        match self {
            Era::PreRector => 0.95,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instantaneous snapshot of derived scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Predictive value.
    #[serde(rename = "Pv")]
    pub pv: f64,
    /// Ontological debt.
    #[serde(rename = "Vsigma")]
    pub vsigma: f64,
    /// Aggregate stability in (0, 1).
    #[serde(rename = "S")]
    pub s: f64,
    /// Exposure over capacity; target 1.0.
    pub dose: f64,
    pub drift: f64,
    pub topo: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monstro_pr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_dry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_decay: Option<f64>,
}

/// One simulated day: metrics plus the raw state they were computed from.
///
/// A run's series is ordered by `day` and never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub day: Day,
    #[serde(flatten)]
    pub metrics: Metrics,
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "H")]
    pub h: f64,
    #[serde(rename = "R")]
    pub r: f64,
    #[serde(rename = "Mw")]
    pub mw: f64,
    #[serde(rename = "Topo")]
    pub topo_state: f64,
    #[serde(rename = "Cvar")]
    pub cvar: f64,
    /// Exposure input `v·q` actually applied on this day (0 once quarantined).
    pub input: f64,
    /// Quarantine latch as of the end of this day.
    pub quarantined: bool,
}

/// Selector for per-day values that can be banded or summarised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKey {
    S,
    Pv,
    Vsigma,
    E,
    A,
    #[serde(rename = "dose")]
    Dose,
    R,
}

impl MetricKey {
    pub const ALL: [MetricKey; 7] = [
        MetricKey::S,
        MetricKey::Pv,
        MetricKey::Vsigma,
        MetricKey::E,
        MetricKey::A,
        MetricKey::Dose,
        MetricKey::R,
    ];

    pub fn parse(s: &str) -> Option<MetricKey> {
        match s.trim() {
            "S" | "s" => Some(MetricKey::S),
            "Pv" | "pv" => Some(MetricKey::Pv),
            "Vsigma" | "vsigma" | "Vσ" => Some(MetricKey::Vsigma),
            "E" | "e" => Some(MetricKey::E),
            "A" | "a" => Some(MetricKey::A),
            "dose" | "Dose" => Some(MetricKey::Dose),
            "R" | "r" => Some(MetricKey::R),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::S => "S",
            MetricKey::Pv => "Pv",
            MetricKey::Vsigma => "Vsigma",
            MetricKey::E => "E",
            MetricKey::A => "A",
            MetricKey::Dose => "dose",
            MetricKey::R => "R",
        }
    }

    /// Read this metric from a series point.
    pub fn value(&self, p: &SeriesPoint) -> f64 {
        match self {
            MetricKey::S => p.metrics.s,
            MetricKey::Pv => p.metrics.pv,
            MetricKey::Vsigma => p.metrics.vsigma,
            MetricKey::E => p.e,
            MetricKey::A => p.a,
            MetricKey::Dose => p.metrics.dose,
            MetricKey::R => p.r,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
