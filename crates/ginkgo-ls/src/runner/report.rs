//
// runner/report.rs
//
// Decoding of the JSON report ginkgo writes at the end of a run
//

use serde::Deserialize;

use super::record::{RunnerRecord, SpecRecord, SuiteRecord};
use crate::error::RecordError;
use crate::tree::RunStatus;

/// File name passed to `-json-report`, relative to `-output-dir`
pub const REPORT_NAME: &str = "report.json";

/// Leaf node type of a spec; everything else is suite setup or teardown
const SPEC_NODE_TYPE: &str = "It";

/// Ginkgo's `Report`, one per suite. Only the fields the explorer reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SuiteReport {
    #[serde(default)]
    suite_description: String,
    #[serde(default)]
    suite_succeeded: bool,
    #[serde(default)]
    run_time: Option<i64>,
    #[serde(default)]
    spec_reports: Option<Vec<SpecReport>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpecReport {
    /// `null` for specs outside any container
    #[serde(default)]
    container_hierarchy_texts: Option<Vec<String>>,
    #[serde(default)]
    leaf_node_text: String,
    #[serde(default)]
    leaf_node_type: String,
    #[serde(default)]
    leaf_node_location: Option<Location>,
    state: String,
    #[serde(default)]
    run_time: Option<i64>,
    #[serde(default)]
    captured_std_out_err: String,
    #[serde(default)]
    captured_ginkgo_writer_output: String,
    #[serde(default)]
    failure: Option<Failure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Location {
    #[serde(default)]
    file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Failure {
    #[serde(default)]
    message: String,
}

/// Records recovered from a report, in the order ginkgo listed them
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecodedReport {
    /// Spec records of each suite followed by that suite's summary
    pub records: Vec<RunnerRecord>,
    /// Failure messages of suite-level nodes (`BeforeSuite` and friends)
    pub output: Vec<String>,
}

pub fn decode_report(text: &str) -> Result<DecodedReport, RecordError> {
    let suites: Vec<SuiteReport> = serde_json::from_str(text).map_err(|e| RecordError {
        message: format!("unreadable json report: {}", e),
        line: text.lines().next().unwrap_or_default().to_string(),
    })?;

    let mut decoded = DecodedReport::default();
    for suite in suites {
        let mut summary = SuiteRecord {
            description: suite.suite_description,
            success: suite.suite_succeeded,
            passed: 0,
            failed: 0,
            skipped: 0,
            run_time: nanos(suite.run_time),
        };

        for spec in suite.spec_reports.unwrap_or_default() {
            let failure = spec
                .failure
                .map(|f| f.message)
                .filter(|message| !message.is_empty());

            if spec.leaf_node_type != SPEC_NODE_TYPE {
                if let Some(message) = failure {
                    decoded.output.push(format!("[{}] {}", spec.leaf_node_type, message));
                }
                continue;
            }

            let record = SpecRecord {
                hierarchy: spec.container_hierarchy_texts.unwrap_or_default(),
                leaf: spec.leaf_node_text,
                state: spec.state,
                output: captured(&spec.captured_std_out_err, &spec.captured_ginkgo_writer_output),
                failure,
                run_time: nanos(spec.run_time),
                file: spec
                    .leaf_node_location
                    .map(|l| l.file_name)
                    .filter(|file| !file.is_empty()),
            };
            match record.status() {
                Some(RunStatus::Passed) => summary.passed += 1,
                Some(RunStatus::Failed) => summary.failed += 1,
                Some(RunStatus::Skipped) => summary.skipped += 1,
                _ => {}
            }
            decoded.records.push(RunnerRecord::Spec(record));
        }
        decoded.records.push(RunnerRecord::Suite(summary));
    }
    Ok(decoded)
}

fn nanos(run_time: Option<i64>) -> Option<u64> {
    run_time.map(|t| t.max(0) as u64)
}

fn captured(std_out_err: &str, writer: &str) -> Option<String> {
    match (std_out_err.is_empty(), writer.is_empty()) {
        (true, true) => None,
        (false, true) => Some(std_out_err.to_string()),
        (true, false) => Some(writer.to_string()),
        (false, false) => Some(format!("{}\n{}", std_out_err.trim_end(), writer)),
    }
}
