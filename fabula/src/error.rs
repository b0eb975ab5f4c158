// src/error.rs
//
// Error taxonomy.
//
// - FabulaError: rejected at a call boundary (bad arguments, unreadable or
//   malformed input files). Returned before any simulation state exists.
// - RunWarning: recoverable problems (unknown intervention kinds, malformed
//   payloads, schema cycles, locked parameters). A run always completes; the
//   warnings are collected and handed back with the result.
//
// Numeric problems (division by ~0, log of negatives, NaN) are never surfaced
// at all: they are absorbed by clamping and fallback constants where they occur.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::Day;

#[derive(Debug, Error)]
pub enum FabulaError {
    #[error("days must be >= 0, got {0}")]
    InvalidDays(i64),

    #[error("repeats must be >= 1, got {0}")]
    InvalidRepeats(i64),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    ScenarioParse(String),

    #[error("scenario validation error in '{field}': {message}")]
    ScenarioValidation { field: String, message: String },

    #[error("failed to parse model registry: {0}")]
    RegistryParse(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// A recoverable, collected problem. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum RunWarning {
    /// An intervention entry whose kind is unknown or whose payload is malformed.
    UnrecognisedIntervention { index: usize, detail: String },
    /// A recognised intervention that cannot have any effect.
    IneffectiveIntervention { day: Day, kind: String, detail: String },
    /// An intervention scheduled at or after the end of the run.
    InterventionOutOfRange { day: Day, kind: String, days: Day },
    /// The `extends` chain revisits a model; resolution stopped there.
    ExtendsCycle { model: String },
    /// A model key (directly or via `extends`) is missing from the registry.
    MissingModel { model: String },
    /// An override targeted a locked parameter and was dropped.
    LockedParam { param: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::UnrecognisedIntervention { index, detail } => {
                write!(f, "intervention #{index} ignored: {detail}")
            }
            RunWarning::IneffectiveIntervention { day, kind, detail } => {
                write!(f, "{kind} on day {day} has no effect: {detail}")
            }
            RunWarning::InterventionOutOfRange { day, kind, days } => {
                write!(f, "{kind} on day {day} never fires (run has {days} days)")
            }
            RunWarning::ExtendsCycle { model } => {
                write!(f, "extends cycle at model '{model}'; using partial schema")
            }
            RunWarning::MissingModel { model } => {
                write!(f, "model '{model}' not found in registry")
            }
            RunWarning::LockedParam { param } => {
                write!(f, "parameter '{param}' is locked; override dropped")
            }
        }
    }
}
