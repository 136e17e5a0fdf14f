use crate::error::{FrError, Result};
use crate::node::Node;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Phenotype label carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Case,
    Ctrl,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Case => "case",
            Label::Ctrl => "ctrl",
        }
    }
}

impl FromStr for Label {
    type Err = FrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "case" => Ok(Label::Case),
            "ctrl" | "control" => Ok(Label::Ctrl),
            other => Err(FrError::invalid_data(format!(
                "unknown sample label '{}' (expected case, ctrl or control)",
                other
            ))),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled individual. Identity is the sample name.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub label: Option<Label>,
}

impl Sample {
    pub fn new(name: impl Into<String>, label: Option<Label>) -> Self {
        Self {
            name: name.into(),
            label,
        }
    }

    pub fn is_case(&self) -> bool {
        self.label == Some(Label::Case)
    }

    pub fn is_ctrl(&self) -> bool {
        self.label == Some(Label::Ctrl)
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Sample {}

impl Hash for Sample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Ord for Sample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A sample's ordered walk through the graph, or a contiguous slice of one.
///
/// Equality and ordering follow the sample, not the nodes: a subpath compares
/// equal to the full path it was cut from.
#[derive(Debug, Clone)]
pub struct Path {
    sample: Arc<Sample>,
    nodes: Vec<Arc<Node>>,
}

impl Path {
    pub const WEIGHT: f64 = 1.0;

    pub fn new(sample: Arc<Sample>, nodes: Vec<Arc<Node>>) -> Self {
        Self { sample, nodes }
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    pub fn name(&self) -> &str {
        &self.sample.name
    }

    pub fn label(&self) -> Option<Label> {
        self.sample.label
    }

    pub fn is_case(&self) -> bool {
        self.sample.is_case()
    }

    pub fn is_ctrl(&self) -> bool {
        self.sample.is_ctrl()
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, node: &Node) -> Option<usize> {
        self.nodes.iter().position(|n| **n == *node)
    }

    pub fn traverses(&self, node: &Node) -> bool {
        self.position(node).is_some()
    }

    /// Slice by node index, both ends inclusive.
    pub(crate) fn slice(&self, first: usize, last: usize) -> Path {
        Path {
            sample: self.sample.clone(),
            nodes: self.nodes[first..=last].to_vec(),
        }
    }

    /// The contiguous run of this path from `left` to `right`, inclusive.
    pub fn subpath(&self, left: &Node, right: &Node) -> Result<Path> {
        let first = self.position(left).ok_or(FrError::MissingNode { id: left.id })?;
        let last = self
            .position(right)
            .ok_or(FrError::MissingNode { id: right.id })?;
        if last < first {
            return Err(FrError::invalid_data(format!(
                "empty subpath of {}: node {} precedes node {}",
                self.name(),
                right.id,
                left.id
            )));
        }
        Ok(self.slice(first, last))
    }

    /// True if `that`'s nodes occur in this path as one unbroken run.
    ///
    /// Matching starts at the first node of `that` and stops at the first
    /// mismatch afterwards.
    pub fn contains(&self, that: &Path) -> bool {
        if that.nodes.len() > self.nodes.len() {
            return false;
        }
        let Some(first) = that.nodes.first() else {
            return true;
        };
        let Some(start) = self.position(first) else {
            return false;
        };
        let mut matched = 0;
        for node in &self.nodes[start..] {
            if matched == that.nodes.len() {
                break;
            }
            if **node != *that.nodes[matched] {
                break;
            }
            matched += 1;
        }
        matched == that.nodes.len()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.sample == other.sample
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sample.hash(state);
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sample.cmp(&other.sample)
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `name.label:[id,id,...]`, or `name:[...]` for an unlabeled sample.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.nodes.iter().map(|n| n.id.to_string()).collect();
        match self.sample.label {
            Some(label) => write!(f, "{}.{}:[{}]", self.sample.name, label, ids.join(",")),
            None => write!(f, "{}:[{}]", self.sample.name, ids.join(",")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str, ids: &[u64]) -> Path {
        let sample = Arc::new(Sample::new(name, Some(Label::Case)));
        Path::new(sample, ids.iter().map(|&id| Arc::new(Node::new(id))).collect())
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("CASE".parse::<Label>().unwrap(), Label::Case);
        assert_eq!("Control".parse::<Label>().unwrap(), Label::Ctrl);
        assert!("tumor".parse::<Label>().is_err());
    }

    #[test]
    fn test_subpath_and_contains() {
        let p = path("s1", &[1, 2, 3, 4, 5]);
        let sub = p.subpath(&Node::new(2), &Node::new(4)).unwrap();
        assert_eq!(sub.to_string(), "s1.case:[2,3,4]");
        assert!(p.contains(&sub));
        assert!(!sub.contains(&p));
        assert!(!p.contains(&path("s1", &[2, 4])));
        assert!(p.subpath(&Node::new(4), &Node::new(2)).is_err());
        assert_eq!(sub, p);
    }
}
