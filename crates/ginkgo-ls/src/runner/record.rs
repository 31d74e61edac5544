//
// runner/record.rs
//
// Decoding of the runner's line-delimited JSON records
//

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RecordError;
use crate::tree::RunStatus;

/// One decoded record from the runner's stdout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunnerRecord {
    /// A spec finished
    Spec(SpecRecord),
    /// The suite finished; always the last record of a complete run
    Suite(SuiteRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecRecord {
    /// Texts of the enclosing containers, outermost first
    #[serde(default)]
    pub hierarchy: Vec<String>,
    /// Text of the spec itself
    pub leaf: String,
    /// Ginkgo spec state (`passed`, `failed`, `panicked`, `skipped`, ...)
    pub state: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub failure: Option<String>,
    /// Nanoseconds
    #[serde(default)]
    pub run_time: Option<u64>,
    /// Source file of the spec, when the reporter knows it
    #[serde(default)]
    pub file: Option<String>,
}

impl SpecRecord {
    /// Full name path: containers followed by the leaf
    pub fn names(&self) -> Vec<String> {
        let mut names = self.hierarchy.clone();
        names.push(self.leaf.clone());
        names
    }

    /// File name (without directories) of the spec's source file
    pub fn file_name(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn status(&self) -> Option<RunStatus> {
        match self.state.to_ascii_lowercase().as_str() {
            "passed" => Some(RunStatus::Passed),
            "failed" | "panicked" | "interrupted" | "aborted" | "timedout" => Some(RunStatus::Failed),
            "skipped" | "pending" => Some(RunStatus::Skipped),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.run_time.map(Duration::from_nanos)
    }

    /// Captured output with the failure message appended
    pub fn captured_output(&self) -> Option<String> {
        match (&self.output, &self.failure) {
            (None, None) => None,
            (Some(out), None) => Some(out.clone()),
            (None, Some(failure)) => Some(failure.clone()),
            (Some(out), Some(failure)) => {
                let mut text = out.clone();
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(failure);
                Some(text)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub run_time: Option<u64>,
}

/// Classification of one line of runner stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Record(RunnerRecord),
    /// Looked like a record but could not be decoded; skip it and keep reading
    Malformed(RecordError),
    /// Ordinary output
    Text(String),
}

pub fn decode_line(line: &str) -> StreamLine {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return StreamLine::Text(line.to_string());
    }

    match serde_json::from_str::<RunnerRecord>(trimmed) {
        Ok(RunnerRecord::Spec(spec)) if spec.status().is_none() => StreamLine::Malformed(RecordError {
            message: format!("unknown spec state '{}'", spec.state),
            line: line.to_string(),
        }),
        Ok(record) => StreamLine::Record(record),
        Err(e) => StreamLine::Malformed(RecordError {
            message: e.to_string(),
            line: line.to_string(),
        }),
    }
}
