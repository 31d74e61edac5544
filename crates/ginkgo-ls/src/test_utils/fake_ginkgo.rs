//! Fake `ginkgo` executables for subprocess tests.
//!
//! Each fake is a small shell script; only available on unix.

use std::path::{Path, PathBuf};

use serde_json::json;

/// Write an executable `ginkgo` script with `body` into `dir`
#[cfg(unix)]
pub fn write_fake_ginkgo(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ginkgo");
    let script = format!("#!/bin/sh\n{}\n", body);
    std::fs::write(&path, script)
        .unwrap_or_else(|e| panic!("Failed to write fake ginkgo {}: {}", path.display(), e));
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|e| panic!("Failed to make {} executable: {}", path.display(), e));
    path
}

/// Script body for `ginkgo outline`: drains stdin and prints `json`
pub fn outline_script(json: &str) -> String {
    format!("cat > /dev/null\ncat <<'EOF'\n{}\nEOF", json)
}

/// Script body for a run: prints `lines` to stdout, then exits with `code`
pub fn run_script(lines: &[String], code: i32) -> String {
    let mut body = String::new();
    for line in lines {
        body.push_str(&format!("cat <<'EOF'\n{}\nEOF\n", line));
    }
    body.push_str(&format!("exit {}", code));
    body
}

/// Script body for a run that writes `report` as ginkgo's json report into
/// the `-output-dir` it was given, then exits with `code`
pub fn report_script(report: &str, code: i32) -> String {
    format!(
        r#"out=.
for arg in "$@"; do
  case "$arg" in
    -output-dir=*) out="${{arg#-output-dir=}}" ;;
  esac
done
cat > "$out/report.json" <<'EOF'
{}
EOF
exit {}"#,
        report, code
    )
}

/// One entry of a json report's `SpecReports`
pub fn spec_report(hierarchy: &[&str], leaf: &str, state: &str, file: &str) -> serde_json::Value {
    json!({
        "ContainerHierarchyTexts": hierarchy,
        "LeafNodeType": "It",
        "LeafNodeText": leaf,
        "LeafNodeLocation": {"FileName": file, "LineNumber": 1},
        "State": state,
        "RunTime": 1_000_000,
    })
}

/// A json report with one suite holding `specs`
pub fn json_report(succeeded: bool, specs: Vec<serde_json::Value>) -> String {
    json!([{
        "SuiteDescription": "fake suite",
        "SuiteSucceeded": succeeded,
        "SpecReports": specs,
    }])
    .to_string()
}

/// One streamed spec record
pub fn spec_record(hierarchy: &[&str], leaf: &str, state: &str) -> String {
    json!({
        "kind": "spec",
        "hierarchy": hierarchy,
        "leaf": leaf,
        "state": state,
        "runTime": 1_000_000,
    })
    .to_string()
}

/// The closing suite record
pub fn suite_record(success: bool, passed: u32, failed: u32) -> String {
    json!({
        "kind": "suite",
        "description": "fake suite",
        "success": success,
        "passed": passed,
        "failed": failed,
    })
    .to_string()
}
