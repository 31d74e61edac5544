//
// tree/key.rs
//
// Stable node identity derived from the path of names
//

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One step of a key: a node name and its position among same-named siblings.
///
/// `ordinal` is 0 for the first sibling with a given name, 1 for the second,
/// and so on in source order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySegment {
    pub name: String,
    pub ordinal: usize,
}

/// Identity of a node, used to correlate nodes across re-parses and runner output.
///
/// The root (the file itself) has no segments. Displayed as the names joined
/// by `/`; a duplicate sibling carries `#<ordinal>`. `/`, `#` and `\` inside
/// names are escaped with `\`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    segments: Vec<KeySegment>,
}

impl NodeKey {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Key of a child of this node
    pub fn child(&self, name: impl Into<String>, ordinal: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(KeySegment {
            name: name.into(),
            ordinal,
        });
        Self { segments }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: names
                .into_iter()
                .map(|name| KeySegment {
                    name: name.into(),
                    ordinal: 0,
                })
                .collect(),
        }
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.name.as_str())
    }

    pub fn parent(&self) -> Option<NodeKey> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Names joined by a single space: the text Ginkgo matches `-focus` against
    pub fn full_text(&self) -> String {
        self.names().collect::<Vec<_>>().join(" ")
    }

    /// Inverse of `Display`
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::root();
        }

        let mut segments = Vec::new();
        let mut name = String::new();
        let mut ordinal: Option<String> = None;
        let mut chars = s.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    // Marks an empty name; `0` itself is never escaped
                    Some(EMPTY_NAME) => {}
                    Some(escaped) => push_char(&mut name, &mut ordinal, escaped),
                    None => {}
                },
                '/' => {
                    segments.push(finish_segment(&mut name, &mut ordinal));
                }
                '#' if ordinal.is_none() => ordinal = Some(String::new()),
                _ => push_char(&mut name, &mut ordinal, c),
            }
        }
        segments.push(finish_segment(&mut name, &mut ordinal));

        Self { segments }
    }
}

/// Escaped stand-in for an empty segment name, so that no key but the root
/// displays as the empty string
const EMPTY_NAME: char = '0';

fn push_char(name: &mut String, ordinal: &mut Option<String>, c: char) {
    match ordinal {
        Some(digits) => digits.push(c),
        None => name.push(c),
    }
}

fn finish_segment(name: &mut String, ordinal: &mut Option<String>) -> KeySegment {
    let ordinal = ordinal
        .take()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0);
    KeySegment {
        name: std::mem::take(name),
        ordinal,
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            if segment.name.is_empty() {
                write!(f, "\\{EMPTY_NAME}")?;
            }
            for c in segment.name.chars() {
                if matches!(c, '/' | '#' | '\\') {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            if segment.ordinal > 0 {
                write!(f, "#{}", segment.ordinal)?;
            }
        }
        Ok(())
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeKey::parse(&s))
    }
}
