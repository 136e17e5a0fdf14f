use crate::error::{FrError, Result};
use crate::fisher::FisherExact;
use crate::node::Node;
use crate::path::{Label, Path, Sample};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{debug, info};

/// Placeholder written for absent optional fields in the graph text dump.
const MISSING: &str = ".";

/// Case-vs-control odds ratio for `case_on`/`ctrl_on` labeled hits out of
/// `case_total`/`ctrl_total` labeled paths.
///
/// Returns 0 when no case hits, and `+inf` when only cases hit.
pub fn odds_ratio(case_on: usize, ctrl_on: usize, case_total: usize, ctrl_total: usize) -> f64 {
    if case_on == 0 || case_total == 0 {
        return 0.0;
    }
    if ctrl_on == 0 || ctrl_total == 0 {
        return f64::INFINITY;
    }
    (case_on as f64 * ctrl_total as f64) / (ctrl_on as f64 * case_total as f64)
}

/// A directed acyclic graph of genotype nodes whose edges come from the
/// labeled sample paths walking through it.
///
/// The path-derived indices (`node_paths`, `label_counts`, edges) and the
/// Fisher's exact helper are built together at construction and never
/// updated in place; transforms return a new graph.
#[derive(Debug, Clone)]
pub struct PangenomicGraph {
    nodes: BTreeMap<u64, Arc<Node>>,
    paths: Vec<Path>,
    edges: BTreeSet<(u64, u64)>,
    node_paths: HashMap<u64, Vec<usize>>,
    label_counts: HashMap<Label, usize>,
    fisher: FisherExact,
}

impl PangenomicGraph {
    /// Builds a graph from its nodes and `(sample, node ids)` walks.
    ///
    /// Fails when a walk references an unknown node, repeats a node, reuses
    /// a sample name, or when the walks together form a cycle.
    pub fn new(
        nodes: impl IntoIterator<Item = Node>,
        walks: impl IntoIterator<Item = (Sample, Vec<u64>)>,
    ) -> Result<Self> {
        let mut node_map = BTreeMap::new();
        for node in nodes {
            let id = node.id;
            if node_map.insert(id, Arc::new(node)).is_some() {
                return Err(FrError::invalid_data(format!("duplicate node id {}", id)));
            }
        }

        let mut names = HashSet::new();
        let mut paths = Vec::new();
        for (sample, ids) in walks {
            if !names.insert(sample.name.clone()) {
                return Err(FrError::invalid_data(format!(
                    "duplicate sample name '{}'",
                    sample.name
                )));
            }
            let mut seen = HashSet::with_capacity(ids.len());
            let mut path_nodes = Vec::with_capacity(ids.len());
            for id in ids {
                if !seen.insert(id) {
                    return Err(FrError::invalid_data(format!(
                        "path {} visits node {} more than once",
                        sample.name, id
                    )));
                }
                let node = node_map.get(&id).ok_or(FrError::MissingNode { id })?;
                path_nodes.push(node.clone());
            }
            paths.push(Path::new(Arc::new(sample), path_nodes));
        }

        Self::from_paths(node_map, paths)
    }

    fn from_paths(nodes: BTreeMap<u64, Arc<Node>>, paths: Vec<Path>) -> Result<Self> {
        let mut edges = BTreeSet::new();
        let mut node_paths: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut label_counts = HashMap::new();
        for (idx, path) in paths.iter().enumerate() {
            for pair in path.nodes().windows(2) {
                edges.insert((pair[0].id, pair[1].id));
            }
            for node in path.nodes() {
                node_paths.entry(node.id).or_default().push(idx);
            }
            if let Some(label) = path.label() {
                *label_counts.entry(label).or_insert(0) += 1;
            }
        }
        check_acyclic(&nodes, &edges)?;

        let fisher = FisherExact::new(paths.len());
        debug!(
            nodes = nodes.len(),
            paths = paths.len(),
            edges = edges.len(),
            "built pangenomic graph"
        );
        Ok(Self {
            nodes,
            paths,
            edges,
            node_paths,
            label_counts,
            fisher,
        })
    }

    pub fn node(&self, id: u64) -> Option<&Arc<Node>> {
        self.nodes.get(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn edges(&self) -> &BTreeSet<(u64, u64)> {
        &self.edges
    }

    pub fn successors(&self, id: u64) -> impl Iterator<Item = u64> + '_ {
        self.edges
            .range((id, 0)..=(id, u64::MAX))
            .map(|&(_, to)| to)
    }

    /// Indices into `paths()` of every path traversing node `id`, ascending.
    pub fn node_paths(&self, id: u64) -> &[usize] {
        self.node_paths.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn label_count(&self, label: Label) -> usize {
        self.label_counts.get(&label).copied().unwrap_or(0)
    }

    pub fn case_paths(&self) -> usize {
        self.label_count(Label::Case)
    }

    pub fn ctrl_paths(&self) -> usize {
        self.label_count(Label::Ctrl)
    }

    pub fn fisher(&self) -> &FisherExact {
        &self.fisher
    }

    fn require_node(&self, id: u64) -> Result<()> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(FrError::MissingNode { id })
        }
    }

    fn count_labels<'a>(&self, paths: impl Iterator<Item = &'a Path>) -> (usize, usize) {
        paths.fold((0, 0), |(case, ctrl), p| match p.label() {
            Some(Label::Case) => (case + 1, ctrl),
            Some(Label::Ctrl) => (case, ctrl + 1),
            None => (case, ctrl),
        })
    }

    /// `(case, ctrl)` counts of paths traversing node `id`.
    pub fn node_label_counts(&self, id: u64) -> Result<(usize, usize)> {
        self.require_node(id)?;
        Ok(self.count_labels(self.node_paths(id).iter().map(|&i| &self.paths[i])))
    }

    /// `(case, ctrl)` counts of paths stepping from `from` directly to `to`.
    pub fn edge_label_counts(&self, from: u64, to: u64) -> Result<(usize, usize)> {
        self.require_node(from)?;
        self.require_node(to)?;
        let traversing = self.node_paths(from).iter().map(|&i| &self.paths[i]).filter(|p| {
            p.nodes()
                .windows(2)
                .any(|pair| pair[0].id == from && pair[1].id == to)
        });
        Ok(self.count_labels(traversing))
    }

    fn table_p(&self, case_on: usize, ctrl_on: usize) -> f64 {
        let case_total = self.case_paths();
        let ctrl_total = self.ctrl_paths();
        self.fisher.two_tailed_p(
            case_on,
            case_total.saturating_sub(case_on),
            ctrl_on,
            ctrl_total.saturating_sub(ctrl_on),
        )
    }

    pub fn odds_ratio(&self, id: u64) -> Result<f64> {
        let (case_on, ctrl_on) = self.node_label_counts(id)?;
        Ok(odds_ratio(case_on, ctrl_on, self.case_paths(), self.ctrl_paths()))
    }

    pub fn fisher_exact_p(&self, id: u64) -> Result<f64> {
        let (case_on, ctrl_on) = self.node_label_counts(id)?;
        Ok(self.table_p(case_on, ctrl_on))
    }

    pub fn edge_odds_ratio(&self, from: u64, to: u64) -> Result<f64> {
        let (case_on, ctrl_on) = self.edge_label_counts(from, to)?;
        Ok(odds_ratio(case_on, ctrl_on, self.case_paths(), self.ctrl_paths()))
    }

    pub fn edge_fisher_exact_p(&self, from: u64, to: u64) -> Result<f64> {
        let (case_on, ctrl_on) = self.edge_label_counts(from, to)?;
        Ok(self.table_p(case_on, ctrl_on))
    }

    /// A new graph without no-call nodes; paths skip over the removed nodes.
    pub fn without_no_calls(&self) -> Result<Self> {
        let nodes: BTreeMap<u64, Arc<Node>> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.is_called)
            .map(|(&id, n)| (id, n.clone()))
            .collect();
        let paths = self
            .paths
            .iter()
            .map(|p| {
                let kept = p.nodes().iter().filter(|n| n.is_called).cloned().collect();
                Path::new(p.sample().clone(), kept)
            })
            .collect();
        info!(
            removed = self.nodes.len() - nodes.len(),
            "dropped no-call nodes"
        );
        Self::from_paths(nodes, paths)
    }

    /// A new graph with equal case and control path counts, made by randomly
    /// dropping paths of the larger label. Unlabeled paths are kept.
    pub fn equalized(&self, seed: u64) -> Result<Self> {
        let case = self.case_paths();
        let ctrl = self.ctrl_paths();
        if case == ctrl {
            return Ok(self.clone());
        }
        let (larger, keep) = if case > ctrl {
            (Label::Case, ctrl)
        } else {
            (Label::Ctrl, case)
        };

        let mut candidates: Vec<usize> = self
            .paths
            .iter()
            .enumerate()
            .filter(|(_, p)| p.label() == Some(larger))
            .map(|(i, _)| i)
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        candidates.shuffle(&mut rng);
        let dropped: HashSet<usize> = candidates.into_iter().skip(keep).collect();

        let paths: Vec<Path> = self
            .paths
            .iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, p)| p.clone())
            .collect();
        info!(
            label = %larger,
            dropped = dropped.len(),
            "equalized case/control path counts"
        );
        Self::from_paths(self.nodes.clone(), paths)
    }

    /// Reads `<prefix>.nodes.txt` and `<prefix>.paths.txt`.
    pub fn read_txt(prefix: &str) -> Result<Self> {
        let nodes = read_nodes_txt(FsPath::new(&format!("{}.nodes.txt", prefix)))?;
        let walks = read_paths_txt(FsPath::new(&format!("{}.paths.txt", prefix)))?;
        let graph = Self::new(nodes, walks)?;
        info!(
            nodes = graph.node_count(),
            paths = graph.path_count(),
            case = graph.case_paths(),
            ctrl = graph.ctrl_paths(),
            "loaded graph from {}",
            prefix
        );
        Ok(graph)
    }

    /// Writes `<prefix>.nodes.txt` and `<prefix>.paths.txt`.
    pub fn write_txt(&self, prefix: &str) -> Result<()> {
        let mut nodes_out = BufWriter::new(File::create(format!("{}.nodes.txt", prefix))?);
        writeln!(nodes_out, "#id\tcontig\tstart\tend\trsId\tgenotype\tgf")?;
        for node in self.nodes.values() {
            writeln!(
                nodes_out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                node.id,
                node.contig.as_deref().unwrap_or(MISSING),
                opt_to_string(node.start),
                opt_to_string(node.end),
                node.rs_id.as_deref().unwrap_or(MISSING),
                node.genotype.as_deref().unwrap_or(MISSING),
                node.genotype_frequency
            )?;
        }
        nodes_out.flush()?;

        let mut paths_out = BufWriter::new(File::create(format!("{}.paths.txt", prefix))?);
        writeln!(paths_out, "#name\tlabel\tnodes")?;
        for path in &self.paths {
            let ids: Vec<String> = path.nodes().iter().map(|n| n.id.to_string()).collect();
            let label = path.label().map(|l| l.as_str()).unwrap_or(MISSING);
            writeln!(paths_out, "{}\t{}\t{}", path.name(), label, ids.join(","))?;
        }
        paths_out.flush()?;
        Ok(())
    }
}

fn opt_to_string(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_string())
}

fn optional_field(field: &str) -> Option<&str> {
    let field = field.trim();
    if field.is_empty() || field == MISSING {
        None
    } else {
        Some(field)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, name: &str, line: usize) -> Result<T> {
    field
        .trim()
        .parse::<T>()
        .map_err(|_| FrError::parse(line, format!("invalid {} '{}'", name, field)))
}

fn tsv_reader(path: &FsPath) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)?)
}

fn read_nodes_txt(path: &FsPath) -> Result<Vec<Node>> {
    let mut reader = tsv_reader(path)?;
    let mut nodes = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 1);
        if record.len() < 7 {
            return Err(FrError::parse(line, "expected 7 tab-separated node fields"));
        }
        let mut node = Node::new(parse_field(&record[0], "node id", line)?);
        if let Some(contig) = optional_field(&record[1]) {
            let start = parse_field(&record[2], "start", line)?;
            let end = parse_field(&record[3], "end", line)?;
            node = node.with_locus(contig, start, end);
        }
        if let Some(rs_id) = optional_field(&record[4]) {
            node = node.with_rs_id(rs_id);
        }
        if let Some(genotype) = optional_field(&record[5]) {
            let gf = parse_field(&record[6], "genotype frequency", line)?;
            node = node.with_genotype(genotype, gf);
        }
        nodes.push(node);
    }
    Ok(nodes)
}

fn read_paths_txt(path: &FsPath) -> Result<Vec<(Sample, Vec<u64>)>> {
    let mut reader = tsv_reader(path)?;
    let mut walks = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 1);
        if record.len() < 2 {
            return Err(FrError::parse(line, "expected name, label and node list"));
        }
        let label = optional_field(&record[1])
            .map(|l| l.parse::<Label>())
            .transpose()
            .map_err(|e| FrError::parse(line, e.to_string()))?;
        let ids = match record.get(2).and_then(optional_field) {
            Some(list) => list
                .split(',')
                .map(|id| parse_field(id, "node id", line))
                .collect::<Result<Vec<u64>>>()?,
            None => Vec::new(),
        };
        walks.push((Sample::new(record[0].trim(), label), ids));
    }
    Ok(walks)
}

/// Kahn's algorithm over the path-derived edges.
fn check_acyclic(nodes: &BTreeMap<u64, Arc<Node>>, edges: &BTreeSet<(u64, u64)>) -> Result<()> {
    let mut in_degree: HashMap<u64, usize> = nodes.keys().map(|&id| (id, 0)).collect();
    for &(_, to) in edges {
        *in_degree.entry(to).or_insert(0) += 1;
    }
    let mut queue: VecDeque<u64> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for &(_, to) in edges.range((id, 0)..=(id, u64::MAX)) {
            if let Some(d) = in_degree.get_mut(&to) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(to);
                }
            }
        }
    }
    if visited != in_degree.len() {
        return Err(FrError::invalid_data(
            "sample paths traverse nodes in conflicting orders (graph has a cycle)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odds_ratio_sentinels() {
        assert_eq!(odds_ratio(0, 3, 10, 10), 0.0);
        assert_eq!(odds_ratio(5, 0, 10, 10), f64::INFINITY);
        assert!((odds_ratio(4, 2, 10, 5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cycle_rejected() {
        let nodes = (1..=2).map(Node::new);
        let walks = vec![
            (Sample::new("a", Some(Label::Case)), vec![1, 2]),
            (Sample::new("b", Some(Label::Ctrl)), vec![2, 1]),
        ];
        assert!(PangenomicGraph::new(nodes, walks).is_err());
    }
}
