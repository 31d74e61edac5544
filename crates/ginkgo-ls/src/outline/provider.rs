//
// outline/provider.rs
//
// Outline extraction through `ginkgo outline`
//

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tower_lsp::lsp_types::{Position, Range};

use crate::error::OutlineError;
use crate::tool::{package_dir, resolve_executable};

/// Whether an outline node groups other nodes or is a runnable leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutlineKind {
    Container,
    Spec,
}

/// One container or spec as reported by the outliner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub kind: OutlineKind,
    /// Display name: the node's description, or the DSL function name when it has none
    pub name: String,
    /// DSL function that declared the node (`Describe`, `It`, `FEntry`, ...)
    pub function: String,
    pub range: Range,
    pub focused: bool,
    pub pending: bool,
    pub labels: Vec<String>,
    pub children: Vec<OutlineNode>,
}

/// Structural outline of one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub roots: Vec<OutlineNode>,
}

impl Outline {
    /// Total number of containers and specs
    pub fn len(&self) -> usize {
        fn count(nodes: &[OutlineNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Source of outlines for a file's content.
#[async_trait]
pub trait OutlineProvider: Send + Sync {
    /// Produce the outline of `content`, which is the current text of `path`.
    ///
    /// No retries: a failure is returned to the caller as-is.
    async fn extract_outline(&self, content: &str, path: &Path) -> Result<Outline, OutlineError>;

    /// Short description for log messages
    fn describe(&self) -> String;
}

/// Outline provider backed by `ginkgo outline --format=json`
#[derive(Debug, Clone)]
pub struct GinkgoOutliner {
    ginkgo_path: PathBuf,
    timeout: Duration,
}

impl GinkgoOutliner {
    /// Default timeout for a single outline invocation (30 seconds).
    const OUTLINE_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(ginkgo_path: PathBuf) -> Self {
        Self {
            ginkgo_path,
            timeout: Self::OUTLINE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ginkgo_path(&self) -> &Path {
        &self.ginkgo_path
    }
}

#[async_trait]
impl OutlineProvider for GinkgoOutliner {
    async fn extract_outline(&self, content: &str, path: &Path) -> Result<Outline, OutlineError> {
        let _timing = crate::perf::TimingGuard::with_threshold("ginkgo outline", 2000);
        let executable = resolve_executable(&self.ginkgo_path)?;

        let mut cmd = Command::new(&executable);
        cmd.args(["outline", "--format=json", "-"])
            .current_dir(package_dir(path))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OutlineError::ToolNotFound {
                    path: self.ginkgo_path.clone(),
                }
            } else {
                OutlineError::ToolInvocation {
                    tool: "ginkgo outline".to_string(),
                    status: "spawn failed".to_string(),
                    stderr: e.to_string(),
                }
            }
        })?;

        // Feed stdin from a separate task so a chatty child cannot block on a full stdout pipe
        if let Some(mut stdin) = child.stdin.take() {
            let text = content.to_owned();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    log::trace!("Writing outline input failed: {}", e);
                }
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| OutlineError::ToolInvocation {
                tool: "ginkgo outline".to_string(),
                status: "wait failed".to_string(),
                stderr: e.to_string(),
            })?,
            Err(_) => {
                return Err(OutlineError::ToolInvocation {
                    tool: "ginkgo outline".to_string(),
                    status: format!("timed out after {:?}", self.timeout),
                    stderr: String::new(),
                });
            }
        };

        if !output.status.success() {
            return Err(OutlineError::ToolInvocation {
                tool: "ginkgo outline".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let outline = decode_outline(&stdout, content)?;
        log::trace!(
            "Outlined {} ({} nodes)",
            path.display(),
            outline.len()
        );
        Ok(outline)
    }

    fn describe(&self) -> String {
        format!("{} outline", self.ginkgo_path.display())
    }
}

/// Node as emitted by `ginkgo outline --format=json`
#[derive(Debug, Deserialize)]
struct RawNode {
    name: String,
    #[serde(default)]
    text: String,
    start: usize,
    end: usize,
    #[serde(default)]
    spec: bool,
    #[serde(default)]
    focused: bool,
    #[serde(default)]
    pending: bool,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    nodes: Vec<RawNode>,
}

/// Decode the outliner's JSON for `content`.
///
/// Byte offsets are converted to LSP positions. Setup nodes (`BeforeEach`,
/// `By`, ...) are dropped and their containers/specs lifted to the nearest
/// kept ancestor.
pub fn decode_outline(json: &str, content: &str) -> Result<Outline, OutlineError> {
    let trimmed = json.trim();
    let raw: Vec<RawNode> = if trimmed.is_empty() || trimmed == "null" {
        Vec::new()
    } else {
        serde_json::from_str(trimmed).map_err(|e| OutlineError::Decode {
            message: e.to_string(),
        })?
    };

    let rope = Rope::from_str(content);
    let mut roots = Vec::new();
    for node in raw {
        convert(node, &rope, &mut roots);
    }
    Ok(Outline { roots })
}

fn convert(raw: RawNode, rope: &Rope, out: &mut Vec<OutlineNode>) {
    match classify(&raw) {
        Some(kind) => {
            let mut children = Vec::new();
            if kind == OutlineKind::Container {
                for child in raw.nodes {
                    convert(child, rope, &mut children);
                }
            }
            let name = if raw.text.is_empty() {
                raw.name.clone()
            } else {
                raw.text
            };
            out.push(OutlineNode {
                kind,
                name,
                range: Range::new(
                    offset_to_position(rope, raw.start),
                    offset_to_position(rope, raw.end),
                ),
                function: raw.name,
                focused: raw.focused,
                pending: raw.pending,
                labels: raw.labels.unwrap_or_default(),
                children,
            });
        }
        None => {
            for child in raw.nodes {
                convert(child, rope, out);
            }
        }
    }
}

fn classify(raw: &RawNode) -> Option<OutlineKind> {
    let base = match raw.name.strip_prefix(['F', 'P', 'X']) {
        Some(rest) if is_known_function(rest) => rest,
        _ => raw.name.as_str(),
    };
    match base {
        "Describe" | "Context" | "When" | "DescribeTable" | "DescribeTableSubtree" => {
            Some(OutlineKind::Container)
        }
        "It" | "Specify" | "Entry" => Some(OutlineKind::Spec),
        _ if raw.spec => Some(OutlineKind::Spec),
        _ => None,
    }
}

fn is_known_function(name: &str) -> bool {
    matches!(
        name,
        "Describe"
            | "Context"
            | "When"
            | "DescribeTable"
            | "DescribeTableSubtree"
            | "It"
            | "Specify"
            | "Entry"
    )
}

/// Convert a byte offset into a position with a UTF-16 column
pub fn offset_to_position(rope: &Rope, offset: usize) -> Position {
    let offset = offset.min(rope.len_bytes());
    let line = rope.byte_to_line(offset);
    let line_start = rope.line_to_char(line);
    let char_idx = rope.byte_to_char(offset);
    let column = rope.char_to_utf16_cu(char_idx) - rope.char_to_utf16_cu(line_start);
    Position::new(line as u32, column as u32)
}
