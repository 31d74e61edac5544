//
// runner/coverage.rs
//
// Coverage generation and Go cover profile parsing
//

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

use super::GinkgoRunner;
use crate::error::RunnerError;
use crate::tool::resolve_executable;

const PROFILE_NAME: &str = "cover.out";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub file: String,
    pub statements: u64,
    pub covered: u64,
}

impl FileCoverage {
    pub fn percent(&self) -> f64 {
        percent(self.covered, self.statements)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub mode: String,
    /// Sorted by file name
    pub files: Vec<FileCoverage>,
}

impl CoverageReport {
    pub fn statements(&self) -> u64 {
        self.files.iter().map(|f| f.statements).sum()
    }

    pub fn covered(&self) -> u64 {
        self.files.iter().map(|f| f.covered).sum()
    }

    pub fn percent(&self) -> f64 {
        percent(self.covered(), self.statements())
    }

    /// Plain text table, one file per line plus a total
    pub fn render_text(&self) -> String {
        let width = self
            .files
            .iter()
            .map(|f| f.file.len())
            .max()
            .unwrap_or(0)
            .max("total".len());

        let mut out = String::new();
        for file in &self.files {
            let _ = writeln!(out, "{:<width$}  {:>6.1}%", file.file, file.percent(), width = width);
        }
        let _ = writeln!(out, "{:<width$}  {:>6.1}%", "total", self.percent(), width = width);
        out
    }
}

fn percent(covered: u64, statements: u64) -> f64 {
    if statements == 0 {
        return 0.0;
    }
    covered as f64 * 100.0 / statements as f64
}

/// Parse a Go cover profile.
///
/// Blocks listed more than once (one entry per test binary) are merged by
/// taking the highest count.
pub fn parse_profile(text: &str) -> Result<CoverageReport, RunnerError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mode = lines
        .next()
        .and_then(|header| header.trim().strip_prefix("mode:"))
        .map(|m| m.trim().to_string())
        .ok_or_else(|| RunnerError::Coverage {
            message: "profile is missing its mode header".to_string(),
        })?;

    // block -> (statements, max count), grouped by file
    let mut blocks: BTreeMap<String, BTreeMap<String, (u64, u64)>> = BTreeMap::new();
    for line in lines {
        let (file, block, statements, count) = parse_block(line).ok_or_else(|| RunnerError::Coverage {
            message: format!("unreadable profile line: {}", line),
        })?;
        let entry = blocks
            .entry(file.to_string())
            .or_default()
            .entry(block.to_string())
            .or_insert((statements, 0));
        entry.1 = entry.1.max(count);
    }

    let files = blocks
        .into_iter()
        .map(|(file, blocks)| {
            let statements = blocks.values().map(|(s, _)| s).sum();
            let covered = blocks.values().filter(|(_, c)| *c > 0).map(|(s, _)| s).sum();
            FileCoverage {
                file,
                statements,
                covered,
            }
        })
        .collect();

    Ok(CoverageReport { mode, files })
}

/// `file.go:10.2,12.16 3 1` -> (file, block, statements, count)
fn parse_block(line: &str) -> Option<(&str, &str, u64, u64)> {
    let (rest, count) = line.trim().rsplit_once(' ')?;
    let (location, statements) = rest.rsplit_once(' ')?;
    let (file, block) = location.rsplit_once(':')?;
    Some((file, block, statements.parse().ok()?, count.parse().ok()?))
}

impl GinkgoRunner {
    /// Run the package's specs with coverage enabled and read back the profile.
    ///
    /// Failing specs do not prevent a report as long as a profile was written.
    pub async fn generate_coverage(&self, package_dir: &Path) -> Result<CoverageReport, RunnerError> {
        let _timing = crate::perf::TimingGuard::with_threshold("ginkgo coverage", 10_000);
        let program = resolve_executable(self.ginkgo_path())?;
        let out_dir = tempfile::tempdir().map_err(|e| RunnerError::Unavailable {
            message: format!("could not create a coverage directory: {}", e),
        })?;

        let output = Command::new(&program)
            .arg("-cover")
            .arg(format!("-coverprofile={}", PROFILE_NAME))
            .arg(format!("-output-dir={}", out_dir.path().display()))
            .arg(package_dir.as_os_str())
            .current_dir(package_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RunnerError::Unavailable {
                message: format!("failed to spawn {}: {}", program.display(), e),
            })?;

        let profile_path = out_dir.path().join(PROFILE_NAME);
        let profile = match tokio::fs::read_to_string(&profile_path).await {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!(
                    "No coverage profile at {} ({}); runner exited with {}",
                    profile_path.display(),
                    e,
                    output.status
                );
                return Err(RunnerError::Coverage {
                    message: format!(
                        "no coverage profile was written: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                });
            }
        };

        let report = parse_profile(&profile)?;
        log::info!(
            "Coverage for {}: {:.1}% of {} statements",
            package_dir.display(),
            report.percent(),
            report.statements()
        );
        Ok(report)
    }
}
