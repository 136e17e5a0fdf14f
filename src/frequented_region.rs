use crate::config::{FinderConfig, Kappa, PriorityLabel, PriorityMetric, PriorityOption};
use crate::error::{FrError, Result};
use crate::graph::{odds_ratio, PangenomicGraph};
use crate::node::NodeSet;
use crate::path::{Label, Path};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Priority assigned to an infinite (or zero, negated) odds ratio.
pub const ODDS_RATIO_PRIORITY_CAP: i64 = 10_000;
/// Priority assigned to a p-value that underflows to zero.
pub const P_VALUE_PRIORITY_CAP: i64 = 10_000;

/// Slack on the α·|C| threshold so that e.g. 0.7·10 still accepts 7 nodes.
const PENETRANCE_EPSILON: f64 = 1e-9;

/// The parameters every FR of one run is evaluated with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportParams {
    pub alpha: f64,
    pub kappa: Kappa,
    pub priority: PriorityOption,
}

impl SupportParams {
    pub fn new(alpha: f64, kappa: Kappa, priority: PriorityOption) -> Self {
        Self {
            alpha,
            kappa,
            priority,
        }
    }
}

impl From<&FinderConfig> for SupportParams {
    fn from(config: &FinderConfig) -> Self {
        Self::new(config.alpha, config.kappa, config.priority)
    }
}

/// Derived statistics of an FR, as written to and read from FR tables.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrStatistics {
    pub support: usize,
    pub case_support: usize,
    pub ctrl_support: usize,
    pub odds_ratio: f64,
    pub p_value: f64,
    pub priority: i64,
}

/// A node set together with the subpaths that support it and the
/// statistics derived from them.
///
/// Equality and hashing use the node set alone. The ordering ranks FRs by
/// priority, then support, then smaller size, then canonical node-set
/// string; greater is better.
#[derive(Debug, Clone)]
pub struct FrequentedRegion {
    nodes: NodeSet,
    params: SupportParams,
    subpaths: Vec<Path>,
    stats: FrStatistics,
}

impl FrequentedRegion {
    /// An FR with no support computed yet.
    pub fn new(nodes: NodeSet, params: SupportParams) -> Self {
        Self {
            nodes,
            params,
            subpaths: Vec::new(),
            stats: FrStatistics {
                p_value: 1.0,
                ..FrStatistics::default()
            },
        }
    }

    /// Builds an FR and computes its support and statistics on `graph`.
    pub fn evaluate(graph: &PangenomicGraph, nodes: NodeSet, params: SupportParams) -> Result<Self> {
        let mut fr = Self::new(nodes, params);
        fr.update(graph)?;
        Ok(fr)
    }

    /// An FR restored from stored statistics; support is not recomputed.
    pub fn with_statistics(
        nodes: NodeSet,
        params: SupportParams,
        stats: FrStatistics,
        subpaths: Vec<Path>,
    ) -> Self {
        Self {
            nodes,
            params,
            subpaths,
            stats,
        }
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn params(&self) -> &SupportParams {
        &self.params
    }

    pub fn subpaths(&self) -> &[Path] {
        &self.subpaths
    }

    pub(crate) fn set_subpaths(&mut self, subpaths: Vec<Path>) {
        self.subpaths = subpaths;
    }

    pub fn statistics(&self) -> &FrStatistics {
        &self.stats
    }

    pub fn support(&self) -> usize {
        self.stats.support
    }

    pub fn case_support(&self) -> usize {
        self.stats.case_support
    }

    pub fn ctrl_support(&self) -> usize {
        self.stats.ctrl_support
    }

    pub fn label_support(&self, label: Label) -> usize {
        match label {
            Label::Case => self.stats.case_support,
            Label::Ctrl => self.stats.ctrl_support,
        }
    }

    pub fn priority(&self) -> i64 {
        self.stats.priority
    }

    pub fn p_value(&self) -> f64 {
        self.stats.p_value
    }

    pub fn odds_ratio(&self) -> f64 {
        self.stats.odds_ratio
    }

    /// Number of this FR's subpaths that were cut from `path`'s sample.
    pub fn path_support(&self, path: &Path) -> usize {
        self.subpaths.iter().filter(|s| *s == path).count()
    }

    /// Recomputes subpaths and support on every path that traverses at least
    /// one of the FR's nodes, then the odds ratio, p-value and priority.
    pub fn update(&mut self, graph: &PangenomicGraph) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(FrError::invalid_data("cannot evaluate an empty node set"));
        }
        for node in self.nodes.iter() {
            if graph.node(node.id).is_none() {
                return Err(FrError::MissingNode { id: node.id });
            }
        }

        let mut path_indices: Vec<usize> = self
            .nodes
            .iter()
            .flat_map(|n| graph.node_paths(n.id).iter().copied())
            .collect();
        path_indices.sort_unstable();
        path_indices.dedup();

        let mut subpaths = Vec::new();
        for idx in path_indices {
            let path = &graph.paths()[idx];
            subpaths.extend(Self::compute_support(
                &self.nodes,
                path,
                self.params.alpha,
                self.params.kappa,
            ));
        }

        let case_support = subpaths.iter().filter(|p| p.is_case()).count();
        let ctrl_support = subpaths.iter().filter(|p| p.is_ctrl()).count();
        let case_paths = graph.case_paths();
        let ctrl_paths = graph.ctrl_paths();
        let or = odds_ratio(case_support, ctrl_support, case_paths, ctrl_paths);
        let p_value = graph.fisher().two_tailed_p(
            case_support,
            case_paths.saturating_sub(case_support),
            ctrl_support,
            ctrl_paths.saturating_sub(ctrl_support),
        );

        self.stats = FrStatistics {
            support: subpaths.len(),
            case_support,
            ctrl_support,
            odds_ratio: or,
            p_value,
            priority: 0,
        };
        self.stats.priority = compute_priority(&self.params.priority, &self.stats);
        self.subpaths = subpaths;
        Ok(())
    }

    /// The maximal subpaths of `path` that support node set `nodes`.
    ///
    /// A span starts at each member node and extends over following member
    /// nodes as long as no run of non-member nodes between them exceeds
    /// `kappa`. It is kept when it covers at least `alpha·|nodes|` members
    /// and is not contained in an earlier kept span.
    pub fn compute_support(nodes: &NodeSet, path: &Path, alpha: f64, kappa: Kappa) -> Vec<Path> {
        let positions: Vec<usize> = path
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| nodes.contains(n))
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Vec::new();
        }

        let required = alpha * nodes.len() as f64 - PENETRANCE_EPSILON;
        let mut accepted: Vec<Path> = Vec::new();
        for i in 0..positions.len() {
            let j = if kappa.is_infinite() {
                positions.len() - 1
            } else {
                let mut j = i;
                while j + 1 < positions.len()
                    && kappa.allows(positions[j + 1] - positions[j] - 1)
                {
                    j += 1;
                }
                j
            };
            let num = j - i + 1;
            if (num as f64) < required {
                continue;
            }
            let span = path.slice(positions[i], positions[j]);
            if !accepted.iter().any(|s| s.contains(&span)) {
                accepted.push(span);
            }
        }
        accepted
    }
}

fn signed_by_label(score: i64, label: Option<PriorityLabel>) -> i64 {
    match label {
        Some(PriorityLabel::Case) => score,
        Some(PriorityLabel::Ctrl) => -score,
        Some(PriorityLabel::Alt) | None => score.abs(),
    }
}

/// Integer priority of an FR under `option`; see `PriorityMetric`.
pub fn compute_priority(option: &PriorityOption, stats: &FrStatistics) -> i64 {
    let case = stats.case_support as i64;
    let ctrl = stats.ctrl_support as i64;
    match option.metric {
        PriorityMetric::Support => match option.label {
            Some(PriorityLabel::Case) => case,
            Some(PriorityLabel::Ctrl) => ctrl,
            Some(PriorityLabel::Alt) | None => stats.support as i64,
        },
        PriorityMetric::SupportDifference => signed_by_label(case - ctrl, option.label),
        PriorityMetric::AbsoluteDifference => (case - ctrl).abs(),
        PriorityMetric::OddsRatio => {
            let or = stats.odds_ratio;
            let score = if or.is_nan() {
                0
            } else if or == 0.0 {
                -ODDS_RATIO_PRIORITY_CAP
            } else if or.is_infinite() {
                ODDS_RATIO_PRIORITY_CAP
            } else {
                ((1000.0 * or.log10()).round() as i64)
                    .clamp(-ODDS_RATIO_PRIORITY_CAP, ODDS_RATIO_PRIORITY_CAP)
            };
            signed_by_label(score, option.label)
        }
        PriorityMetric::PValue => {
            let score = if stats.p_value <= 0.0 {
                P_VALUE_PRIORITY_CAP
            } else {
                ((-100.0 * stats.p_value.log10()).round() as i64).min(P_VALUE_PRIORITY_CAP)
            };
            let leans = match option.label {
                Some(PriorityLabel::Case) => stats.odds_ratio > 1.0,
                Some(PriorityLabel::Ctrl) => stats.odds_ratio < 1.0,
                Some(PriorityLabel::Alt) | None => true,
            };
            if leans {
                score
            } else {
                -score
            }
        }
    }
}

impl PartialEq for FrequentedRegion {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for FrequentedRegion {}

impl Hash for FrequentedRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodes.hash(state);
    }
}

impl Ord for FrequentedRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stats
            .priority
            .cmp(&other.stats.priority)
            .then(self.stats.support.cmp(&other.stats.support))
            .then(other.nodes.len().cmp(&self.nodes.len()))
            .then_with(|| self.nodes.cmp(&other.nodes))
    }
}

impl PartialOrd for FrequentedRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One FR table row: `nodes size support caseSupport ctrlSupport OR p priority`.
impl fmt::Display for FrequentedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.nodes,
            self.size(),
            self.stats.support,
            self.stats.case_support,
            self.stats.ctrl_support,
            self.stats.odds_ratio,
            self.stats.p_value,
            self.stats.priority
        )
    }
}
