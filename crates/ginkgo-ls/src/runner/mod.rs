//
// runner/mod.rs
//
// Test runner: spawns ginkgo and streams its results
//

pub mod coverage;
pub mod focus;
pub mod record;
pub mod report;
pub mod session;

pub use coverage::*;
pub use focus::focus_pattern;
pub use record::*;
pub use report::{decode_report, DecodedReport};
pub use session::RunSession;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;

use crate::error::{RecordError, RunnerError};
use crate::tool::resolve_executable;

/// Capacity of a run's event channel
const EVENT_BUFFER: usize = 4096;

/// What to run: a package directory, optionally narrowed by a focus regex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub package_dir: PathBuf,
    pub focus: Option<String>,
}

/// Progress of a run, in arrival order. `Exited` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started,
    Record(RunnerRecord),
    Malformed(RecordError),
    /// stderr or non-record stdout
    Output(String),
    Exited { success: bool, code: Option<i32> },
}

/// Receiving end of a spawned run
#[derive(Debug)]
pub struct RunHandle {
    pub events: mpsc::Receiver<RunEvent>,
}

#[derive(Debug, Clone)]
pub struct GinkgoRunner {
    ginkgo_path: PathBuf,
    extra_args: Vec<String>,
}

impl GinkgoRunner {
    pub fn new(ginkgo_path: PathBuf, extra_args: Vec<String>) -> Self {
        Self {
            ginkgo_path,
            extra_args,
        }
    }

    pub fn ginkgo_path(&self) -> &Path {
        &self.ginkgo_path
    }

    /// `[-focus=<regex>] -json-report=report.json -output-dir=<reportDir>
    /// <extra args> <packageDir>`
    pub fn args(&self, request: &RunRequest, report_dir: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_args.len() + 4);
        if let Some(focus) = &request.focus {
            args.push(format!("-focus={}", focus));
        }
        args.push(format!("-json-report={}", report::REPORT_NAME));
        args.push(format!("-output-dir={}", report_dir.display()));
        args.extend(self.extra_args.iter().cloned());
        args.push(request.package_dir.to_string_lossy().into_owned());
        args
    }

    /// Command for `request` against an already-resolved executable
    pub fn command(&self, program: &Path, request: &RunRequest, report_dir: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(self.args(request, report_dir))
            .current_dir(&request.package_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Spawn a run. Events are delivered on the returned handle as they
    /// arrive; the process runs to completion even if the handle is dropped.
    pub fn run(&self, request: &RunRequest) -> Result<RunHandle, RunnerError> {
        let program = resolve_executable(&self.ginkgo_path)?;
        let report_dir = tempfile::tempdir().map_err(|e| RunnerError::Unavailable {
            message: format!("could not create a report directory: {}", e),
        })?;
        log::info!(
            "Starting test run: {} {}",
            program.display(),
            self.args(request, report_dir.path()).join(" ")
        );

        let mut child = self
            .command(&program, request, report_dir.path())
            .spawn()
            .map_err(|e| RunnerError::Unavailable {
                message: format!("failed to spawn {}: {}", program.display(), e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| RunnerError::Unavailable {
            message: "runner stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| RunnerError::Unavailable {
            message: "runner stderr was not captured".to_string(),
        })?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(drive(child, stdout, stderr, report_dir, tx));
        Ok(RunHandle { events: rx })
    }
}

async fn drive(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    report_dir: TempDir,
    tx: mpsc::Sender<RunEvent>,
) {
    let _timing = crate::perf::TimingGuard::new("test run");
    crate::perf::increment_tool_invocations();
    let _ = tx.send(RunEvent::Started).await;

    let (mut records, _) = tokio::join!(
        read_stream(BufReader::new(stdout), &tx),
        read_output(BufReader::new(stderr), &tx)
    );

    let exited = match child.wait().await {
        Ok(status) => RunEvent::Exited {
            success: status.success(),
            code: status.code(),
        },
        Err(e) => {
            log::warn!("Waiting for the test runner failed: {}", e);
            RunEvent::Exited {
                success: false,
                code: None,
            }
        }
    };
    // Records already streamed on stdout make the report redundant
    if records == 0 {
        records = forward_report(&report_dir.path().join(report::REPORT_NAME), &tx).await;
    }
    log::info!("Test run ended after {} records: {:?}", records, exited);
    let _ = tx.send(exited).await;
}

/// Send the records of the json report at `path`, returning how many were
/// sent. A missing report (the suite failed to compile, say) sends nothing.
async fn forward_report(path: &Path, tx: &mpsc::Sender<RunEvent>) -> usize {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            log::debug!("No json report at {}: {}", path.display(), e);
            return 0;
        }
    };
    match decode_report(&text) {
        Ok(decoded) => {
            for line in decoded.output {
                let _ = tx.send(RunEvent::Output(line)).await;
            }
            let records = decoded.records.len();
            for record in decoded.records {
                let _ = tx.send(RunEvent::Record(record)).await;
            }
            records
        }
        Err(err) => {
            log::warn!("{} ({})", err, path.display());
            let _ = tx.send(RunEvent::Malformed(err)).await;
            0
        }
    }
}

/// Next line of `reader` without its line terminator. Bytes that are not
/// valid UTF-8 are replaced rather than ending the stream.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Decode runner stdout line by line, forwarding each line as soon as it is
/// read. Returns the number of records decoded.
///
/// A send failure (receiver gone) does not stop reading, so the child never
/// blocks on a full pipe.
pub async fn read_stream<R>(mut reader: R, tx: &mpsc::Sender<RunEvent>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut records = 0;
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                let event = match decode_line(&line) {
                    StreamLine::Record(record) => {
                        records += 1;
                        RunEvent::Record(record)
                    }
                    StreamLine::Malformed(err) => {
                        log::warn!("{} (line: {})", err, err.line);
                        RunEvent::Malformed(err)
                    }
                    StreamLine::Text(text) => RunEvent::Output(text),
                };
                let _ = tx.send(event).await;
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("Reading runner output failed: {}", e);
                break;
            }
        }
    }
    records
}

async fn read_output<R>(mut reader: R, tx: &mpsc::Sender<RunEvent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                let _ = tx.send(RunEvent::Output(line)).await;
            }
            Ok(None) => break,
            Err(e) => {
                log::trace!("Reading runner stderr failed: {}", e);
                break;
            }
        }
    }
}
