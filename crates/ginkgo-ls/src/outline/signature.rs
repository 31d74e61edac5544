//
// outline/signature.rs
//
// Content signatures used to validate cached outlines
//

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::SystemTime;

/// Identity of a document's content at one point in time.
///
/// Open documents carry no modification time; their signature is the size
/// and hash of the in-memory text. Closed files also record the on-disk
/// modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentSignature {
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub content_hash: u64,
}

impl ContentSignature {
    /// Signature of an in-memory buffer
    pub fn from_text(text: &str) -> Self {
        Self {
            size: text.len() as u64,
            mtime: None,
            content_hash: hash_text(text),
        }
    }

    /// Read a file from disk and return its content with a signature.
    pub fn from_disk(path: &Path) -> std::io::Result<(String, Self)> {
        let content = std::fs::read_to_string(path)?;
        let metadata = std::fs::metadata(path)?;
        let signature = Self {
            size: metadata.len(),
            mtime: metadata.modified().ok(),
            content_hash: hash_text(&content),
        };
        Ok((content, signature))
    }

    /// Check whether a cached signature still describes the current content
    pub fn matches(&self, current: &ContentSignature) -> bool {
        self == current
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
