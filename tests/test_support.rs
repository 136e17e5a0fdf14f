mod common;

use approx::assert_relative_eq;
use common::walk;
use frfinder::fisher::FisherExact;
use frfinder::frequented_region::{compute_priority, ODDS_RATIO_PRIORITY_CAP};
use frfinder::{
    FrStatistics, FrequentedRegion, Kappa, Label, NodeSet, PangenomicGraph, PriorityOption,
    SupportParams,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn params(alpha: f64, kappa: Kappa) -> SupportParams {
    SupportParams::new(alpha, kappa, PriorityOption::default())
}

fn support(graph: &PangenomicGraph, ids: &[u64], alpha: f64, kappa: Kappa) -> usize {
    let nodes = NodeSet::from_ids(graph, ids).unwrap();
    FrequentedRegion::evaluate(graph, nodes, params(alpha, kappa))
        .unwrap()
        .support()
}

#[test]
fn test_singleton_support() {
    let graph = PangenomicGraph::new(
        common::locus_nodes(1..=3),
        vec![
            walk("p1", Some(Label::Case), &[1, 2]),
            walk("p2", Some(Label::Ctrl), &[1, 3]),
            walk("p3", Some(Label::Ctrl), &[2, 3]),
        ],
    )
    .unwrap();
    let nodes = NodeSet::from_ids(&graph, &[1]).unwrap();
    let fr = FrequentedRegion::evaluate(&graph, nodes, params(1.0, Kappa::Finite(0))).unwrap();
    assert_eq!(fr.support(), 2);
    assert_eq!(fr.case_support(), 1);
    assert_eq!(fr.ctrl_support(), 1);
    let samples: Vec<&str> = fr.subpaths().iter().map(|p| p.name()).collect();
    assert_eq!(samples, vec!["p1", "p2"]);
}

#[test]
fn test_penetrance_and_insertions() {
    let graph = PangenomicGraph::new(
        common::locus_nodes(1..=5),
        vec![walk("a", Some(Label::Case), &[1, 2, 3, 4, 5])],
    )
    .unwrap();
    let odd = [1, 3, 5];
    assert_eq!(support(&graph, &odd, 1.0, Kappa::Finite(0)), 0);
    assert_eq!(support(&graph, &odd, 1.0, Kappa::Finite(1)), 1);
    assert_eq!(support(&graph, &odd, 1.0, Kappa::Infinite), 1);
    assert_eq!(support(&graph, &odd, 0.5, Kappa::Finite(0)), 0);
    // Any single member is enough; each isolated member is its own span.
    assert_eq!(support(&graph, &odd, 0.0, Kappa::Finite(0)), 3);

    let nodes = NodeSet::from_ids(&graph, &odd).unwrap();
    let spans = FrequentedRegion::compute_support(&nodes, &graph.paths()[0], 0.6, Kappa::Finite(1));
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].to_string(), "a.case:[1,2,3,4,5]");
}

#[test]
fn test_support_is_monotone() {
    let graph = common::layered_graph(6, 3, 12);
    let all: Vec<u64> = (1..=18).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let kappas = [
        Kappa::Finite(0),
        Kappa::Finite(1),
        Kappa::Finite(3),
        Kappa::Infinite,
    ];
    for _ in 0..40 {
        let n = rng.gen_range(1..=5);
        let ids: Vec<u64> = all.choose_multiple(&mut rng, n).copied().collect();

        // Insertion tolerance only widens full-penetrance spans.
        let by_kappa: Vec<usize> = kappas.iter().map(|&k| support(&graph, &ids, 1.0, k)).collect();
        assert!(by_kappa.windows(2).all(|w| w[0] <= w[1]), "{:?}", by_kappa);

        for &kappa in &kappas {
            let by_alpha: Vec<usize> = [0.0, 0.25, 0.5, 0.75, 1.0]
                .iter()
                .map(|&alpha| support(&graph, &ids, alpha, kappa))
                .collect();
            assert!(by_alpha.windows(2).all(|w| w[0] >= w[1]), "{:?}", by_alpha);
        }
    }
}

#[test]
fn test_infinite_odds_ratio() {
    let mut walks = Vec::new();
    for i in 0..10 {
        let ids: &[u64] = if i < 5 { &[1, 2] } else { &[2] };
        walks.push(walk(&format!("case{}", i), Some(Label::Case), ids));
        walks.push(walk(&format!("ctrl{}", i), Some(Label::Ctrl), &[2]));
    }
    let graph = PangenomicGraph::new(common::locus_nodes(1..=2), walks).unwrap();
    assert_eq!(graph.case_paths(), 10);
    assert_eq!(graph.ctrl_paths(), 10);

    let nodes = NodeSet::from_ids(&graph, &[1]).unwrap();
    let priority: PriorityOption = "3:case".parse().unwrap();
    let fr = FrequentedRegion::evaluate(
        &graph,
        nodes,
        SupportParams::new(1.0, Kappa::Finite(0), priority),
    )
    .unwrap();
    assert_eq!(fr.case_support(), 5);
    assert_eq!(fr.ctrl_support(), 0);
    assert!(fr.odds_ratio().is_infinite() && fr.odds_ratio() > 0.0);
    assert_eq!(fr.priority(), ODDS_RATIO_PRIORITY_CAP);
    assert!(fr.p_value() > 0.0 && fr.p_value() < 0.05);
}

#[test]
fn test_labeled_p_value_priority() {
    let stats = |odds_ratio: f64| FrStatistics {
        support: 10,
        case_support: 6,
        ctrl_support: 4,
        odds_ratio,
        p_value: 0.01,
        priority: 0,
    };
    let score = |option: &str, odds_ratio: f64| {
        compute_priority(&option.parse::<PriorityOption>().unwrap(), &stats(odds_ratio))
    };
    assert_eq!(score("4", 3.0), 200);
    assert_eq!(score("4", 0.2), 200);
    assert_eq!(score("4:case", 3.0), 200);
    assert_eq!(score("4:case", 0.2), -200);
    assert_eq!(score("4:ctrl", 0.2), 200);
    assert_eq!(score("4:ctrl", 3.0), -200);
    assert_eq!(score("4:case", 1.0), -200);
    assert_eq!(score("4:ctrl", 1.0), -200);
}

#[test]
fn test_fisher_reference_values() {
    let fisher = FisherExact::new(24);
    assert_relative_eq!(fisher.two_tailed_p(3, 1, 1, 3), 0.485714, epsilon = 1e-5);
    assert_relative_eq!(fisher.two_tailed_p(1, 9, 11, 3), 0.002759, epsilon = 1e-6);
    assert_relative_eq!(fisher.two_tailed_p(2, 2, 2, 2), 1.0, epsilon = 1e-12);
}

#[test]
fn test_fr_total_order() {
    let graph = common::case_control_graph();
    let fr = |ids: &[u64], priority: i64, support: usize| {
        FrequentedRegion::with_statistics(
            NodeSet::from_ids(&graph, ids).unwrap(),
            params(1.0, Kappa::Finite(0)),
            FrStatistics {
                support,
                priority,
                p_value: 1.0,
                ..FrStatistics::default()
            },
            Vec::new(),
        )
    };
    let mut frs = vec![
        fr(&[1, 2], 5, 3),
        fr(&[1, 2, 3], 5, 3),
        fr(&[4, 6], 5, 3),
        fr(&[1], 9, 1),
        fr(&[2], 5, 4),
    ];
    frs.sort_by(|a, b| b.cmp(a));
    let order: Vec<String> = frs.iter().map(|f| f.nodes().to_string()).collect();
    assert_eq!(order, vec!["[1]", "[2]", "[4,6]", "[1,2]", "[1,2,3]"]);

    // Equality ignores statistics.
    assert_eq!(fr(&[1, 2], 0, 0), fr(&[1, 2], 7, 7));
}
