// src/telemetry.rs
//
// Per-day series sinks.
//
// The simulator hands every `SeriesPoint` it produces to a `SeriesSink`.
// Sinks observe; they can never fail or alter a run:
//
// - `NoopSink` discards everything.
// - `JsonlSink` lazily opens (and truncates) its file on first use and
//   writes one JSON object per simulated day. Open or write errors disable the sink for the
//   remainder of the process.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use crate::types::SeriesPoint;

/// Schema version stamped into every JSONL record.
pub const SCHEMA_VERSION: i64 = 1;

pub trait SeriesSink {
    fn log_point(&mut self, point: &SeriesPoint);

    fn flush(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl SeriesSink for NoopSink {
    fn log_point(&mut self, _point: &SeriesPoint) {}
}

/// Collects points in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub points: Vec<SeriesPoint>,
}

impl SeriesSink for VecSink {
    fn log_point(&mut self, point: &SeriesPoint) {
        self.points.push(point.clone());
    }
}

pub struct JsonlSink {
    path: PathBuf,
    enabled: bool,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    /// Truncating sink at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            enabled: true,
            writer: None,
        }
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
            {
                Ok(f) => self.writer = Some(BufWriter::new(f)),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "jsonl sink disabled");
                    self.enabled = false;
                    return None;
                }
            }
        }
        self.writer.as_mut()
    }

    fn log_json(&mut self, value: &JsonValue) {
        let Ok(line) = serde_json::to_string(value) else {
            return;
        };
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        if writeln!(writer, "{line}").is_err() {
            self.enabled = false;
            self.writer = None;
        }
    }
}

impl SeriesSink for JsonlSink {
    fn log_point(&mut self, point: &SeriesPoint) {
        let Ok(mut record) = serde_json::to_value(point) else {
            return;
        };
        if let JsonValue::Object(map) = &mut record {
            map.entry("schema_version")
                .or_insert_with(|| JsonValue::Number(SCHEMA_VERSION.into()));
        }
        self.log_json(&record);
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        SeriesSink::flush(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metrics;

    fn point(day: u32) -> SeriesPoint {
        SeriesPoint {
            day,
            metrics: Metrics {
                s: 0.5,
                dose: 1.0,
                ..Default::default()
            },
            e: 1.0,
            a: 1.0,
            h: 0.5,
            r: 0.9,
            mw: 0.3,
            topo_state: 0.2,
            cvar: 0.1,
            input: 12.0,
            quarantined: false,
        }
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("series.jsonl");
        {
            let mut sink = JsonlSink::create(&path);
            sink.log_point(&point(0));
            sink.log_point(&point(1));
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: JsonValue = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["day"], 1);
        assert_eq!(v["S"], 0.5);
        assert_eq!(v["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn reopening_truncates_previous_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.jsonl");
        {
            let mut sink = JsonlSink::create(&path);
            sink.log_point(&point(0));
            sink.log_point(&point(1));
        }
        JsonlSink::create(&path).log_point(&point(7));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"day\":7"));
    }

    #[test]
    fn unwritable_path_disables_sink() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a file.
        let mut sink = JsonlSink::create(dir.path());
        sink.log_point(&point(0));
        assert!(!sink.enabled);
        assert!(sink.writer.is_none());
        sink.log_point(&point(1));
        assert!(dir.path().is_dir());
    }
}
