#![allow(dead_code)]

use frfinder::{Label, Node, PangenomicGraph, Sample};

pub fn walk(name: &str, label: Option<Label>, ids: &[u64]) -> (Sample, Vec<u64>) {
    (Sample::new(name, label), ids.to_vec())
}

pub fn locus_nodes(ids: impl IntoIterator<Item = u64>) -> Vec<Node> {
    ids.into_iter()
        .map(|id| {
            Node::new(id)
                .with_locus("1", id * 100, id * 100 + 1)
                .with_genotype("0/1", 0.5)
        })
        .collect()
}

/// Six nodes on one contig, three case and three control paths.
///
/// Per-node (case, ctrl) traversal counts:
/// 1:(3,2) 2:(3,1) 3:(2,1) 4:(1,2) 5:(1,2) 6:(2,1)
pub fn case_control_graph() -> PangenomicGraph {
    let walks = vec![
        walk("case1", Some(Label::Case), &[1, 2, 3, 5]),
        walk("case2", Some(Label::Case), &[1, 2, 3, 6]),
        walk("case3", Some(Label::Case), &[1, 2, 4, 6]),
        walk("ctrl1", Some(Label::Ctrl), &[1, 4, 5]),
        walk("ctrl2", Some(Label::Ctrl), &[2, 4, 6]),
        walk("ctrl3", Some(Label::Ctrl), &[1, 3, 5]),
    ];
    PangenomicGraph::new(locus_nodes(1..=6), walks).expect("fixture graph is valid")
}

/// A larger layered graph: `width` alternative nodes per layer, each path
/// picking one node per layer. Case paths favour the first alternative.
pub fn layered_graph(layers: u64, width: u64, paths_per_label: usize) -> PangenomicGraph {
    let nodes = locus_nodes(1..=layers * width);
    let mut walks = Vec::new();
    for (label, prefix) in [(Label::Case, "case"), (Label::Ctrl, "ctrl")] {
        for p in 0..paths_per_label {
            let ids: Vec<u64> = (0..layers)
                .map(|layer| {
                    let choice = match label {
                        Label::Case if (p as u64 + layer) % 3 != 0 => 0,
                        _ => (p as u64 * 7 + layer * 3) % width,
                    };
                    layer * width + choice + 1
                })
                .collect();
            walks.push(walk(&format!("{}{}", prefix, p), Some(label), &ids));
        }
    }
    PangenomicGraph::new(nodes, walks).expect("layered graph is valid")
}

fn node_at(id: u64, contig: &str, start: u64) -> Node {
    Node::new(id)
        .with_locus(contig, start, start + 1)
        .with_genotype("0/1", 0.5)
}

/// Nodes 1,2 on contig "1" and nodes 3,4 on contig "2"; every case path
/// runs across both contigs.
pub fn two_contig_graph() -> PangenomicGraph {
    let nodes = vec![
        node_at(1, "1", 100),
        node_at(2, "1", 200),
        node_at(3, "2", 100),
        node_at(4, "2", 200),
    ];
    let walks = vec![
        walk("case1", Some(Label::Case), &[1, 2, 3, 4]),
        walk("case2", Some(Label::Case), &[1, 2, 3, 4]),
        walk("case3", Some(Label::Case), &[1, 2, 3, 4]),
        walk("ctrl1", Some(Label::Ctrl), &[1]),
        walk("ctrl2", Some(Label::Ctrl), &[2, 3]),
        walk("ctrl3", Some(Label::Ctrl), &[4]),
    ];
    PangenomicGraph::new(nodes, walks).expect("two-contig graph is valid")
}

/// Nodes 1,2 share one position and nodes 3,4 share another.
pub fn shared_position_graph() -> PangenomicGraph {
    let nodes = vec![
        node_at(1, "1", 100),
        node_at(2, "1", 100),
        node_at(3, "1", 200),
        node_at(4, "1", 200),
    ];
    let walks = vec![
        walk("case1", Some(Label::Case), &[1, 2, 3, 4]),
        walk("case2", Some(Label::Case), &[1, 2, 3, 4]),
        walk("case3", Some(Label::Case), &[1, 2, 3, 4]),
        walk("ctrl1", Some(Label::Ctrl), &[1, 3]),
        walk("ctrl2", Some(Label::Ctrl), &[2, 4]),
        walk("ctrl3", Some(Label::Ctrl), &[3, 4]),
    ];
    PangenomicGraph::new(nodes, walks).expect("shared-position graph is valid")
}
