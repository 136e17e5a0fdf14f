use crate::error::{FrError, Result};
use crate::graph::PangenomicGraph;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Genotype strings that mark a node as a no-call.
const NO_CALL_GENOTYPES: [&str; 2] = ["./.", "00"];

/// A genotype at a locus: the unit vertex of the pangenomic graph.
///
/// Nodes are created once by whoever builds the graph and are then shared
/// read-only (`Arc<Node>`) by paths, node sets and frequented regions.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub contig: Option<String>,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub rs_id: Option<String>,
    pub genotype: Option<String>,
    pub genotype_frequency: f64,
    pub is_called: bool,
}

impl Node {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            contig: None,
            start: None,
            end: None,
            rs_id: None,
            genotype: None,
            genotype_frequency: 0.0,
            is_called: true,
        }
    }

    pub fn with_locus(mut self, contig: impl Into<String>, start: u64, end: u64) -> Self {
        self.contig = Some(contig.into());
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_genotype(mut self, genotype: impl Into<String>, frequency: f64) -> Self {
        let genotype = genotype.into();
        self.is_called = !NO_CALL_GENOTYPES.contains(&genotype.as_str());
        self.genotype = Some(genotype);
        self.genotype_frequency = frequency;
        self
    }

    pub fn with_rs_id(mut self, rs_id: impl Into<String>) -> Self {
        self.rs_id = Some(rs_id.into());
        self
    }

    fn full_locus(&self) -> Option<(&str, u64, u64, &str)> {
        Some((
            self.contig.as_deref()?,
            self.start?,
            self.end?,
            self.genotype.as_deref()?,
        ))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id {
            return false;
        }
        // Same id but a different locus means two importers disagreed.
        match (self.full_locus(), other.full_locus()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Parses the ids out of a canonical `[id,id,...]` string. Whitespace around
/// ids is tolerated; `[]` yields an empty list.
pub fn parse_node_ids(input: &str) -> Result<Vec<u64>> {
    let malformed = || FrError::NodeSetFormat {
        input: input.to_string(),
    };
    let trimmed = input.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(malformed)?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|field| field.trim().parse::<u64>().map_err(|_| malformed()))
        .collect()
}

/// An ordered, duplicate-free set of graph nodes.
///
/// Nodes are kept ascending by id. Equality and hashing use that id
/// sequence; ordering uses the canonical `[id1,id2,...]` string, which is
/// also the textual form written to and read from FR tables.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: Vec<Arc<Node>>,
    canonical: String,
}

impl NodeSet {
    pub fn new(nodes: impl IntoIterator<Item = Arc<Node>>) -> Self {
        let mut nodes: Vec<Arc<Node>> = nodes.into_iter().collect();
        nodes.sort_by_key(|n| n.id);
        nodes.dedup_by_key(|n| n.id);
        Self::from_sorted(nodes)
    }

    fn from_sorted(nodes: Vec<Arc<Node>>) -> Self {
        let ids: Vec<String> = nodes.iter().map(|n| n.id.to_string()).collect();
        let canonical = format!("[{}]", ids.join(","));
        Self { nodes, canonical }
    }

    pub fn singleton(node: Arc<Node>) -> Self {
        Self::from_sorted(vec![node])
    }

    /// Builds a set from graph node ids in any order.
    pub fn from_ids(graph: &PangenomicGraph, ids: &[u64]) -> Result<Self> {
        let nodes = ids
            .iter()
            .map(|&id| graph.node(id).cloned().ok_or(FrError::MissingNode { id }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(nodes))
    }

    /// Parses a `[id,id,...]` string against the nodes of `graph`.
    pub fn parse(graph: &PangenomicGraph, input: &str) -> Result<Self> {
        let ids = parse_node_ids(input)?;
        Self::from_ids(graph, &ids)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn first(&self) -> Option<&Arc<Node>> {
        self.nodes.first()
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.nodes.binary_search_by_key(&id, |n| n.id).is_ok()
    }

    pub fn contains(&self, node: &Node) -> bool {
        match self.nodes.binary_search_by_key(&node.id, |n| n.id) {
            Ok(idx) => *self.nodes[idx] == *node,
            Err(_) => false,
        }
    }

    pub fn contains_all(&self, other: &NodeSet) -> bool {
        other.nodes.iter().all(|n| self.contains(n))
    }

    pub fn contains_any(&self, other: &NodeSet) -> bool {
        other.nodes.iter().any(|n| self.contains(n))
    }

    /// Union of two sets. No statistics are involved; the result is a plain
    /// node set.
    pub fn merge(a: &NodeSet, b: &NodeSet) -> NodeSet {
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.nodes.len() && j < b.nodes.len() {
            match a.nodes[i].id.cmp(&b.nodes[j].id) {
                Ordering::Less => {
                    merged.push(a.nodes[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(b.nodes[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(a.nodes[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend(a.nodes[i..].iter().cloned());
        merged.extend(b.nodes[j..].iter().cloned());
        NodeSet::from_sorted(merged)
    }

    /// True iff this set is strictly larger than `other` and holds every one
    /// of its nodes.
    pub fn is_superset_of(&self, other: &NodeSet) -> bool {
        self.len() > other.len() && self.contains_all(other)
    }

    /// True iff every node sits at the same contig and start coordinate.
    pub fn same_position(&self) -> bool {
        let Some(first) = self.nodes.first() else {
            return true;
        };
        self.nodes
            .iter()
            .all(|n| n.contig == first.contig && n.start == first.start)
    }

    /// True iff all nodes that carry a contig share the same one.
    pub fn single_contig(&self) -> bool {
        let mut contigs = self.nodes.iter().filter_map(|n| n.contig.as_deref());
        match contigs.next() {
            Some(first) => contigs.all(|c| c == first),
            None => true,
        }
    }

    pub fn has_no_calls(&self) -> bool {
        self.nodes.iter().any(|n| !n.is_called)
    }

    /// Levenshtein distance between the two ordered node lists, using one
    /// rolling row sized to the shorter set.
    pub fn distance(a: &NodeSet, b: &NodeSet) -> usize {
        let (long, short) = if a.len() >= b.len() {
            (&a.nodes, &b.nodes)
        } else {
            (&b.nodes, &a.nodes)
        };
        let mut row: Vec<usize> = (0..=short.len()).collect();
        for (i, ln) in long.iter().enumerate() {
            let mut diagonal = row[0];
            row[0] = i + 1;
            for (j, sn) in short.iter().enumerate() {
                let substitution = diagonal + usize::from(ln != sn);
                let deletion = row[j + 1] + 1;
                let insertion = row[j] + 1;
                diagonal = row[j + 1];
                row[j + 1] = substitution.min(deletion).min(insertion);
            }
        }
        row[short.len()]
    }
}

impl PartialEq for NodeSet {
    fn eq(&self, other: &Self) -> bool {
        self.nodes.len() == other.nodes.len()
            && self
                .nodes
                .iter()
                .zip(&other.nodes)
                .all(|(a, b)| a.id == b.id)
    }
}

impl Eq for NodeSet {}

impl Hash for NodeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodes.len().hash(state);
        for node in &self.nodes {
            node.id.hash(state);
        }
    }
}

impl Ord for NodeSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl PartialOrd for NodeSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u64]) -> NodeSet {
        NodeSet::new(ids.iter().map(|&id| Arc::new(Node::new(id))))
    }

    #[test]
    fn test_parse_node_ids() {
        assert_eq!(parse_node_ids("[3, 1,2]").unwrap(), vec![3, 1, 2]);
        assert_eq!(parse_node_ids("[]").unwrap(), Vec::<u64>::new());
        assert!(parse_node_ids("1,2").is_err());
        assert!(parse_node_ids("[1,x]").is_err());
    }

    #[test]
    fn test_canonical_string() {
        assert_eq!(set(&[10, 2, 2, 1]).to_string(), "[1,2,10]");
        assert_eq!(set(&[]).to_string(), "[]");
    }

    #[test]
    fn test_distance_simple() {
        assert_eq!(NodeSet::distance(&set(&[1, 2, 3]), &set(&[1, 2, 3])), 0);
        assert_eq!(NodeSet::distance(&set(&[1, 2, 3]), &set(&[1, 3])), 1);
        assert_eq!(NodeSet::distance(&set(&[1, 2]), &set(&[3, 4])), 2);
        assert_eq!(NodeSet::distance(&set(&[]), &set(&[3, 4, 5])), 3);
    }

    #[test]
    fn test_node_equality_checks_locus() {
        let a = Node::new(1).with_locus("1", 100, 100).with_genotype("0/1", 0.5);
        let b = Node::new(1).with_locus("1", 100, 100).with_genotype("1/1", 0.1);
        let bare = Node::new(1);
        assert_ne!(a, b);
        assert_eq!(a, bare);
        assert!(!Node::new(2).with_genotype("./.", 0.0).is_called);
    }
}
