mod common;

use frfinder::fr_utils::write_frequented_regions;
use frfinder::{
    FinderConfig, FrError, FrFinder, FrequentedRegion, Kappa, KeepOption, Label, NodeSet,
    PangenomicGraph, Termination,
};
use std::sync::Arc;
use tempfile::tempdir;

fn run(graph: &PangenomicGraph, config: FinderConfig) -> Vec<Arc<FrequentedRegion>> {
    FrFinder::new(graph, config).unwrap().run().unwrap()
}

fn names(frs: &[Arc<FrequentedRegion>]) -> Vec<String> {
    frs.iter().map(|fr| fr.nodes().to_string()).collect()
}

fn table(frs: &[Arc<FrequentedRegion>]) -> String {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frs.tsv");
    write_frequented_regions(&path, frs.iter().map(Arc::as_ref)).unwrap();
    std::fs::read_to_string(&path).unwrap()
}

#[test]
fn test_first_rounds() {
    let graph = common::case_control_graph();
    let mut finder = FrFinder::new(
        &graph,
        FinderConfig {
            max_round: Some(2),
            threads: Some(2),
            ..FinderConfig::default()
        },
    )
    .unwrap();
    let frs = finder.run().unwrap();
    assert_eq!(names(&frs), vec!["[1,2]", "[4,6]"]);
    assert_eq!(finder.round(), 2);
    assert_eq!(finder.termination(), Some(Termination::MaxRound));
    assert_eq!(finder.allowed_starting_nodes().len(), 6);

    let best = &frs[0];
    assert_eq!(best.support(), 3);
    assert_eq!(best.case_support(), 3);
    assert_eq!(best.ctrl_support(), 0);
    assert!(best.odds_ratio().is_infinite());
    assert!((best.p_value() - 0.1).abs() < 1e-9);
    assert_eq!(best.subpaths().len(), 3);
}

#[test]
fn test_runs_are_deterministic_across_thread_counts() {
    let graph = common::layered_graph(5, 3, 10);
    let config = |threads| FinderConfig {
        priority: "4:case".parse().unwrap(),
        max_round: Some(6),
        threads: Some(threads),
        ..FinderConfig::default()
    };
    let serial = run(&graph, config(1));
    let parallel = run(&graph, config(4));
    assert!(!serial.is_empty());
    assert_eq!(table(&serial), table(&parallel));
}

#[test]
fn test_exhausts_without_round_limit() {
    let graph = common::case_control_graph();
    let mut finder = FrFinder::new(&graph, FinderConfig::default()).unwrap();
    let frs = finder.run().unwrap();
    assert_eq!(finder.termination(), Some(Termination::Exhausted));
    assert!(frs.len() <= finder.round());
    // every accepted FR is distinct
    let mut unique = names(&frs);
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), frs.len());
}

#[test]
fn test_best_node_set_grows_one_node_per_round() {
    let graph = common::case_control_graph();
    let mut finder = FrFinder::new(
        &graph,
        FinderConfig {
            require_best_node_set: true,
            ..FinderConfig::default()
        },
    )
    .unwrap();
    let mut frs = finder.run().unwrap();
    frs.sort_by_key(|fr| fr.size());
    assert_eq!(names(&frs), vec!["[1,2]", "[1,2,3]", "[1,2,3,6]"]);
    assert_eq!(finder.termination(), Some(Termination::Exhausted));
}

#[test]
fn test_subset_keep_option() {
    let graph = common::layered_graph(5, 3, 10);
    let frs = run(
        &graph,
        FinderConfig {
            priority: "3".parse().unwrap(),
            keep_option: Some(KeepOption::Subset(1)),
            max_round: Some(10),
            threads: Some(2),
            ..FinderConfig::default()
        },
    );
    assert!(!frs.is_empty());
    for a in &frs {
        for b in &frs {
            assert!(
                !(a.nodes().is_superset_of(b.nodes()) && a.priority() <= b.priority()),
                "{} should have been dropped in favour of {}",
                a.nodes(),
                b.nodes()
            );
        }
    }
}

#[test]
fn test_subset_keep_option_respects_min_size() {
    let walks = vec![
        common::walk("c1", Some(Label::Case), &[1, 2, 3]),
        common::walk("c2", Some(Label::Case), &[1, 2, 3]),
        common::walk("c3", Some(Label::Case), &[3]),
        common::walk("d1", Some(Label::Ctrl), &[4]),
    ];
    let graph = PangenomicGraph::new(common::locus_nodes(1..=4), walks).unwrap();
    let with = |keep_option: Option<KeepOption>| {
        names(&run(
            &graph,
            FinderConfig {
                alpha: 0.3,
                priority: "3".parse().unwrap(),
                keep_option,
                max_round: Some(6),
                threads: Some(1),
                ..FinderConfig::default()
            },
        ))
    };
    let kept = with(None);
    assert!(kept.len() > 1);
    assert_eq!(with(Some(KeepOption::Subset(100))), kept);
}

#[test]
fn test_distance_keep_option() {
    let graph = common::layered_graph(5, 3, 10);
    let frs = run(
        &graph,
        FinderConfig {
            keep_option: Some(KeepOption::Distance(1)),
            max_round: Some(10),
            threads: Some(2),
            ..FinderConfig::default()
        },
    );
    for (i, a) in frs.iter().enumerate() {
        for b in &frs[i + 1..] {
            if NodeSet::distance(a.nodes(), b.nodes()) <= 1 {
                assert_ne!(a.priority(), b.priority());
            }
        }
    }
}

#[test]
fn test_node_constraints() {
    let graph = common::case_control_graph();
    let with = |required: Vec<u64>, included: Vec<u64>, excluded: Vec<u64>| {
        run(
            &graph,
            FinderConfig {
                required_nodes: required,
                included_nodes: included,
                excluded_nodes: excluded,
                threads: Some(1),
                ..FinderConfig::default()
            },
        )
    };

    let frs = with(vec![], vec![], vec![2]);
    assert!(!frs.is_empty());
    assert!(frs.iter().all(|fr| !fr.nodes().contains_id(2)));

    let unconstrained = with(vec![], vec![], vec![]);
    assert!(unconstrained.iter().any(|fr| !fr.nodes().contains_id(5)));
    let frs = with(vec![], vec![5], vec![]);
    assert!(!frs.is_empty());
    assert!(frs.iter().all(|fr| fr.nodes().contains_id(5)));

    let frs = with(vec![3], vec![], vec![]);
    assert!(!frs.is_empty());
    assert!(frs.iter().all(|fr| fr.nodes().contains_id(3)));
}

#[test]
fn test_finite_kappa_keeps_frs_on_one_contig() {
    let graph = common::two_contig_graph();
    let with = |kappa: Kappa| {
        run(
            &graph,
            FinderConfig {
                kappa,
                threads: Some(2),
                ..FinderConfig::default()
            },
        )
    };

    let frs = with(Kappa::Finite(0));
    assert!(!frs.is_empty());
    assert!(frs.iter().all(|fr| fr.nodes().single_contig()));

    let frs = with(Kappa::Infinite);
    assert!(names(&frs).contains(&"[2,3]".to_string()));
    assert!(frs.iter().any(|fr| !fr.nodes().single_contig()));
}

#[test]
fn test_require_same_position() {
    let graph = common::shared_position_graph();
    let with = |require_same_position: bool| {
        run(
            &graph,
            FinderConfig {
                require_same_position,
                threads: Some(1),
                ..FinderConfig::default()
            },
        )
    };

    let frs = with(true);
    let mut found = names(&frs);
    found.sort();
    assert_eq!(found, vec!["[1,2]", "[3,4]"]);
    assert!(frs.iter().all(|fr| fr.nodes().same_position()));

    let frs = with(false);
    assert!(frs.iter().any(|fr| !fr.nodes().same_position()));
}

#[test]
fn test_size_and_support_bounds() {
    let graph = common::layered_graph(5, 3, 10);
    let frs = run(
        &graph,
        FinderConfig {
            min_size: 2,
            max_size: Some(3),
            min_support: 2,
            max_round: Some(8),
            threads: Some(2),
            ..FinderConfig::default()
        },
    );
    assert!(!frs.is_empty());
    for fr in &frs {
        assert!((2..=3).contains(&fr.size()), "{}", fr);
        assert!(fr.support() >= 2, "{}", fr);
    }
}

#[test]
fn test_invalid_configurations() {
    let graph = common::case_control_graph();
    let err = |config: FinderConfig| FrFinder::new(&graph, config).err();

    assert!(matches!(
        err(FinderConfig {
            required_nodes: vec![3],
            excluded_nodes: vec![3],
            ..FinderConfig::default()
        }),
        Some(FrError::Config { .. })
    ));
    assert!(matches!(
        err(FinderConfig {
            required_nodes: vec![99],
            ..FinderConfig::default()
        }),
        Some(FrError::MissingNode { id: 99 })
    ));
    assert!(matches!(
        err(FinderConfig {
            alpha: 1.5,
            ..FinderConfig::default()
        }),
        Some(FrError::Config { .. })
    ));
    assert!(matches!(
        err(FinderConfig {
            max_size: Some(2),
            min_size: 3,
            ..FinderConfig::default()
        }),
        Some(FrError::Config { .. })
    ));
}

#[test]
fn test_clock_time_budget() {
    let graph = common::layered_graph(5, 3, 10);
    let mut finder = FrFinder::new(
        &graph,
        FinderConfig {
            max_clocktime_minutes: Some(1e-9),
            ..FinderConfig::default()
        },
    )
    .unwrap();
    let frs = finder.run().unwrap();
    assert!(frs.is_empty());
    assert_eq!(finder.round(), 0);
    assert_eq!(finder.termination(), Some(Termination::ClockTime));
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let graph = common::layered_graph(5, 3, 10);
    let config = |max_round| FinderConfig {
        priority: "1:case".parse().unwrap(),
        keep_option: Some(KeepOption::Subset(2)),
        max_round: Some(max_round),
        threads: Some(2),
        ..FinderConfig::default()
    };
    let uninterrupted = run(&graph, config(5));

    let dir = tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint");
    let mut first = FrFinder::new(
        &graph,
        FinderConfig {
            checkpoint_dir: Some(checkpoint.clone()),
            ..config(2)
        },
    )
    .unwrap();
    first.run().unwrap();
    assert!(checkpoint.join("state.tsv").exists());

    let mut resumed = FrFinder::resume(&graph, &checkpoint, |c| c.max_round = Some(5)).unwrap();
    assert_eq!(resumed.round(), 2);
    assert_eq!(resumed.frequented_regions().len(), 2);
    let frs = resumed.run().unwrap();
    assert_eq!(resumed.round(), 5);
    assert_eq!(table(&frs), table(&uninterrupted));
    // restored FRs carry their subpaths again
    assert!(frs.iter().all(|fr| fr.subpaths().len() == fr.support()));
}
