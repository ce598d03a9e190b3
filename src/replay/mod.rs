//! Session trace utilities for the deterministic CLI harness.
//!
//! A trace is a recorded sequence of host callbacks (step readings, position
//! fixes and resets) stored as JSON. This module discovers traces on disk,
//! parses optional expectation JSON, and replays the inputs against a fresh
//! `EngineHandle`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationPhase, TrackerSnapshot};
use crate::config::AppConfig;
use crate::engine::{EngineHandle, TrackerInput};
use crate::error::ErrorCode;

/// Default location for trace JSON assets.
pub const DEFAULT_TRACE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

const EXPECT_SUFFIX: &str = ".expect.json";

/// Recorded session inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrace {
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub events: Vec<TrackerInput>,
}

/// Metadata describing an available trace.
#[derive(Clone, Debug)]
pub struct TraceMetadata {
    pub name: String,
    pub trace_path: PathBuf,
    pub expect_path: Option<PathBuf>,
}

/// Loaded trace plus expectations.
pub struct TraceData {
    pub metadata: TraceMetadata,
    pub trace: SessionTrace,
    pub expectations: Option<TraceExpectations>,
}

/// JSON expectation schema for the final state of a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceExpectations {
    pub trace: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub phase: Option<CalibrationPhase>,
    #[serde(default)]
    pub session_steps: Option<u64>,
    #[serde(default)]
    pub step_length_m: Option<f64>,
    #[serde(default)]
    pub cumulative_distance_m: Option<f64>,
    #[serde(default)]
    pub target_step_estimate: Option<u64>,
    #[serde(default)]
    pub rejected: Option<usize>,
    #[serde(default = "default_tolerance")]
    pub tolerance_m: f64,
}

fn default_tolerance() -> f64 {
    1e-3
}

impl TraceExpectations {
    pub fn verify(&self, report: &ReplayReport) -> std::result::Result<(), ExpectationDiff> {
        let actual = &report.final_snapshot;
        let mut failures = Vec::new();

        let mut check = |field: &'static str,
                         matches: bool,
                         expected: serde_json::Value,
                         actual: serde_json::Value| {
            if !matches {
                failures.push(ExpectationFailure {
                    field,
                    expected,
                    actual,
                });
            }
        };

        if let Some(phase) = self.phase {
            check(
                "phase",
                phase == actual.phase,
                serde_json::json!(phase),
                serde_json::json!(actual.phase),
            );
        }
        if let Some(steps) = self.session_steps {
            check(
                "session_steps",
                steps == actual.session_steps,
                serde_json::json!(steps),
                serde_json::json!(actual.session_steps),
            );
        }
        if let Some(step_length) = self.step_length_m {
            check(
                "step_length_m",
                (step_length - actual.step_length_m).abs() <= self.tolerance_m,
                serde_json::json!(step_length),
                serde_json::json!(actual.step_length_m),
            );
        }
        if let Some(distance) = self.cumulative_distance_m {
            check(
                "cumulative_distance_m",
                (distance - actual.cumulative_distance_m).abs() <= self.tolerance_m,
                serde_json::json!(distance),
                serde_json::json!(actual.cumulative_distance_m),
            );
        }
        if let Some(estimate) = self.target_step_estimate {
            check(
                "target_step_estimate",
                Some(estimate) == actual.target_step_estimate,
                serde_json::json!(estimate),
                serde_json::json!(actual.target_step_estimate),
            );
        }
        if let Some(rejected) = self.rejected {
            check(
                "rejected",
                rejected == report.rejected,
                serde_json::json!(rejected),
                serde_json::json!(report.rejected),
            );
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Outcome of comparing the replay with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "field": failure.field,
                    "expected": failure.expected,
                    "actual": failure.actual,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Detailed diff entry for a single field.
#[derive(Debug)]
pub struct ExpectationFailure {
    pub field: &'static str,
    pub expected: serde_json::Value,
    pub actual: serde_json::Value,
}

/// Rejection recorded for one replayed input.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedInput {
    pub code: i32,
    pub message: String,
}

/// Result of applying one trace event.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayRecord {
    pub index: usize,
    pub input: TrackerInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TrackerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<RejectedInput>,
}

/// Full replay output.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub trace: String,
    pub records: Vec<ReplayRecord>,
    pub rejected: usize,
    pub final_snapshot: TrackerSnapshot,
}

/// Catalog responsible for discovering traces on disk.
pub struct TraceCatalog {
    root: PathBuf,
}

impl TraceCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all traces by their metadata.
    pub fn discover(&self) -> Result<Vec<TraceMetadata>> {
        let mut traces = Vec::new();
        if !self.root.exists() {
            return Ok(traces);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let is_trace = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".json") && !name.ends_with(EXPECT_SUFFIX))
                .unwrap_or(false);
            if is_trace {
                traces.push(self.metadata_for_path(&path)?);
            }
        }

        traces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(traces)
    }

    /// Load a trace + expectations for the provided name or path.
    pub fn load(&self, trace: &str, override_expect: Option<PathBuf>) -> Result<TraceData> {
        let trace_path = self.resolve_trace_path(trace)?;
        let metadata = self.metadata_for_path(&trace_path)?;

        let json = fs::read_to_string(&trace_path)
            .with_context(|| format!("reading trace {}", trace_path.display()))?;
        let session: SessionTrace = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", trace_path.display()))?;

        let expectation_path = override_expect.or(metadata.expect_path.clone());
        let expectations = match expectation_path {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading expectation {}", path.display()))?;
                Some(
                    serde_json::from_str(&json)
                        .with_context(|| format!("parsing {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(TraceData {
            metadata,
            trace: session,
            expectations,
        })
    }

    fn resolve_trace_path(&self, trace: &str) -> Result<PathBuf> {
        let as_path = Path::new(trace);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{trace}.json"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Trace '{trace}' not found in {}",
                self.root.display()
            ))
        }
    }

    fn metadata_for_path(&self, trace_path: &Path) -> Result<TraceMetadata> {
        let name = trace_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Invalid trace name for {}", trace_path.display()))?
            .to_string();
        let expect_path = trace_path.with_file_name(format!("{name}{EXPECT_SUFFIX}"));
        Ok(TraceMetadata {
            name,
            trace_path: trace_path.to_path_buf(),
            expect_path: expect_path.exists().then_some(expect_path),
        })
    }
}

impl Default for TraceCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_ROOT)
    }
}

/// Replays trace inputs through a fresh engine.
pub struct TraceRunner {
    config: AppConfig,
}

impl TraceRunner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Apply every event in order; rejected inputs are recorded, not fatal.
    pub fn run(&self, trace: &SessionTrace) -> Result<ReplayReport> {
        let engine = EngineHandle::from_config(self.config.clone());
        let mut records = Vec::with_capacity(trace.events.len());
        let mut rejected = 0;

        for (index, input) in trace.events.iter().copied().enumerate() {
            let record = match engine.apply(input) {
                Ok(snapshot) => ReplayRecord {
                    index,
                    input,
                    snapshot: Some(snapshot),
                    rejected: None,
                },
                Err(err) => {
                    rejected += 1;
                    ReplayRecord {
                        index,
                        input,
                        snapshot: None,
                        rejected: Some(RejectedInput {
                            code: err.code(),
                            message: err.message(),
                        }),
                    }
                }
            };
            records.push(record);
        }

        let final_snapshot = engine
            .snapshot()
            .map_err(|err| anyhow!("reading final snapshot: {err}"))?;

        Ok(ReplayReport {
            trace: trace.name.clone(),
            records,
            rejected,
            final_snapshot,
        })
    }
}

impl Default for TraceRunner {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(events: Vec<TrackerInput>) -> SessionTrace {
        SessionTrace {
            name: "inline".to_string(),
            notes: None,
            events,
        }
    }

    fn steps(raw: &[i64]) -> Vec<TrackerInput> {
        raw.iter()
            .map(|&raw_count| TrackerInput::StepSample { raw_count })
            .collect()
    }

    fn expectations(json: &str) -> TraceExpectations {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn runner_records_rejections_and_continues() {
        let report = TraceRunner::default()
            .run(&trace(steps(&[100, 110, 105, 130, 145])))
            .unwrap();

        assert_eq!(report.records.len(), 5);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.records[2].rejected.as_ref().unwrap().code, 3002);
        assert_eq!(report.final_snapshot.phase, CalibrationPhase::Calibrated);
        assert_eq!(report.final_snapshot.target_step_estimate, Some(150));
    }

    #[test]
    fn expectations_pass_within_tolerance() {
        let report = TraceRunner::default()
            .run(&trace(steps(&[100, 110, 130, 145])))
            .unwrap();
        let expected = expectations(
            r#"{"trace":"inline","phase":"calibrated","session_steps":45,
                "step_length_m":0.6667,"cumulative_distance_m":30.0,
                "target_step_estimate":150,"rejected":0}"#,
        );

        assert!(expected.verify(&report).is_ok());
    }

    #[test]
    fn expectation_diff_lists_failed_fields() {
        let report = TraceRunner::default()
            .run(&trace(steps(&[100, 110])))
            .unwrap();
        let expected = expectations(
            r#"{"trace":"inline","phase":"calibrated","session_steps":10,"target_step_estimate":150}"#,
        );

        let diff = expected.verify(&report).unwrap_err();
        let fields: Vec<_> = diff.failures.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["phase", "target_step_estimate"]);
        assert_eq!(diff.to_json()["failures"][0]["actual"], "calibrating");
    }

    #[test]
    fn catalog_discovers_bundled_traces() {
        let catalog = TraceCatalog::default();
        let traces = catalog.discover().unwrap();
        let walk = traces
            .iter()
            .find(|meta| meta.name == "calibration_walk")
            .expect("calibration_walk trace");
        assert!(walk.expect_path.is_some());
        assert!(traces.iter().all(|meta| !meta.name.ends_with(".expect")));
    }

    #[test]
    fn catalog_loads_and_verifies_bundled_traces() {
        let catalog = TraceCatalog::default();
        for meta in catalog.discover().unwrap() {
            let data = catalog.load(&meta.name, None).unwrap();
            let report = TraceRunner::default().run(&data.trace).unwrap();
            if let Some(expectations) = data.expectations {
                assert!(
                    expectations.verify(&report).is_ok(),
                    "trace {} failed expectations",
                    meta.name
                );
            }
        }
    }

    #[test]
    fn catalog_reports_missing_trace() {
        let catalog = TraceCatalog::default();
        assert!(catalog.load("no_such_trace", None).is_err());
    }
}
