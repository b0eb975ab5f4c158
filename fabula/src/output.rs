// src/output.rs
//
// Run output schema.
// - RunSummary: small, stable per-run summary with a determinism checksum
// - series_checksum: SHA-256 over the exact bits of a series
// - atomic_write: temp file + rename, so readers never see partial output

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::EffectiveProfile;
use crate::error::RunWarning;
use crate::simulator::{RunOutput, Simulator};
use crate::types::{Day, Metrics, SeriesPoint};

/// Output schema version.
pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeterminismInfo {
    /// Hex SHA-256 of the series (see `series_checksum`).
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub fabula_version: &'static str,
    pub title: String,
    pub entity_type: String,
    pub era: String,
    pub days: Day,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<EffectiveProfile>,
    pub quarantined_on: Option<Day>,
    /// Metrics on the last simulated day; absent for a zero-day run.
    #[serde(rename = "final")]
    pub final_metrics: Option<Metrics>,
    pub warnings: Vec<RunWarning>,
    pub determinism: DeterminismInfo,
}

impl RunSummary {
    pub fn new(sim: &Simulator, out: &RunOutput, profile: Option<EffectiveProfile>) -> Self {
        Self {
            schema_version: OUTPUT_SCHEMA_VERSION,
            fabula_version: env!("CARGO_PKG_VERSION"),
            title: sim.title().to_string(),
            entity_type: sim.kind().as_str().to_string(),
            era: sim.era().as_str().to_string(),
            days: sim.days(),
            seed: out.seed,
            profile,
            quarantined_on: out.quarantined_on,
            final_metrics: out.last().map(|p| p.metrics),
            warnings: out.warnings.clone(),
            determinism: DeterminismInfo {
                checksum: series_checksum(&out.series),
            },
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// SHA-256 over the raw bits of every field of every point, in day order.
///
/// Two series have equal checksums iff they are bit-for-bit identical
/// (up to hash collisions); no rounding is applied.
pub fn series_checksum(series: &[SeriesPoint]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((series.len() as u64).to_le_bytes());
    for p in series {
        hasher.update(p.day.to_le_bytes());
        let m = &p.metrics;
        for x in [m.pv, m.vsigma, m.s, m.dose, m.drift, m.topo] {
            hasher.update(x.to_bits().to_le_bytes());
        }
        for x in [m.influence, m.monstro_pr, m.risk_dry, m.risk_decay] {
            match x {
                Some(v) => {
                    hasher.update([1u8]);
                    hasher.update(v.to_bits().to_le_bytes());
                }
                None => hasher.update([0u8]),
            }
        }
        for x in [p.e, p.a, p.h, p.r, p.mw, p.topo_state, p.cvar, p.input] {
            hasher.update(x.to_bits().to_le_bytes());
        }
        hasher.update([p.quarantined as u8]);
    }
    hex::encode(hasher.finalize())
}

/// Write a file atomically (temp file in the same directory + rename).
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".tmp_{}_{}", std::process::id(), file_name));

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
