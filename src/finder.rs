//! Round-based frequented-region search.
//!
//! Every graph node seeds a singleton FR. Each round merges every pair of
//! FRs in the candidate pool, computes support for the merged node sets, and
//! keeps the "interesting" ones. All interesting merges join the pool for the
//! next round; only the best of them is accepted into the output.
//!
//! The outer `fr1` loop is serial so that every inner pass sees the same
//! pool; the inner `fr2` pass runs on a rayon pool.

use crate::config::{FinderConfig, KeepOption};
use crate::error::{FrError, Result};
use crate::fr_utils::{
    read_frequented_regions, read_parameters, write_frequented_regions, write_parameters,
};
use crate::frequented_region::{FrequentedRegion, SupportParams};
use crate::graph::PangenomicGraph;
use crate::node::{parse_node_ids, NodeSet};
use crate::progress::count_progress_bar;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POOL_FILE: &str = "pool.tsv";
const OUTPUT_FILE: &str = "output.tsv";
const PAIRS_FILE: &str = "pairs.tsv";
const REJECTED_FILE: &str = "rejected.txt";
const STATE_FILE: &str = "state.tsv";
const PARAMS_FILE: &str = "params.tsv";

/// A merge of two pool FRs and the FR evaluated from the merged node set.
#[derive(Debug, Clone)]
pub struct FrPair {
    pub fr1: NodeSet,
    pub fr2: NodeSet,
    pub merged: Arc<FrequentedRegion>,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A round produced no interesting merge.
    Exhausted,
    /// `max_round` rounds were run.
    MaxRound,
    /// The wall-clock budget ran out.
    ClockTime,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::Exhausted => "exhausted",
            Termination::MaxRound => "maxRound",
            Termination::ClockTime => "clockTime",
        })
    }
}

enum RoundOutcome {
    Accepted {
        winner: Arc<FrequentedRegion>,
        interesting: Vec<Arc<FrequentedRegion>>,
    },
    Exhausted(Option<Arc<FrequentedRegion>>),
    TimedOut,
}

/// Result of evaluating one `fr1 ∪ fr2` merge.
enum Merge {
    Skipped,
    Rejected(Arc<FrequentedRegion>),
    Interesting(Arc<FrequentedRegion>),
}

pub struct FrFinder<'g> {
    graph: &'g PangenomicGraph,
    config: FinderConfig,
    params: SupportParams,
    required: Option<NodeSet>,
    included: Option<NodeSet>,
    excluded: Option<NodeSet>,
    all_frequented_regions: BTreeMap<NodeSet, Arc<FrequentedRegion>>,
    frequented_regions: BTreeMap<NodeSet, Arc<FrequentedRegion>>,
    allowed_starting_nodes: BTreeSet<u64>,
    frpairs: Mutex<HashMap<NodeSet, FrPair>>,
    rejected: Mutex<HashSet<NodeSet>>,
    best: Option<Arc<FrequentedRegion>>,
    round: usize,
    elapsed: Duration,
    termination: Option<Termination>,
    workers: rayon::ThreadPool,
}

fn optional_node_set(graph: &PangenomicGraph, ids: &[u64]) -> Result<Option<NodeSet>> {
    if ids.is_empty() {
        Ok(None)
    } else {
        NodeSet::from_ids(graph, ids).map(Some)
    }
}

impl<'g> FrFinder<'g> {
    /// Validates `config` and resolves its node constraints against `graph`.
    pub fn new(graph: &'g PangenomicGraph, config: FinderConfig) -> Result<Self> {
        config.validate()?;
        let required = optional_node_set(graph, &config.required_nodes)?;
        let included = optional_node_set(graph, &config.included_nodes)?;
        let excluded = optional_node_set(graph, &config.excluded_nodes)?;
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads())
            .build()
            .map_err(|e| FrError::config(format!("cannot build worker pool: {}", e)))?;
        let params = SupportParams::from(&config);

        Ok(Self {
            graph,
            config,
            params,
            required,
            included,
            excluded,
            all_frequented_regions: BTreeMap::new(),
            frequented_regions: BTreeMap::new(),
            allowed_starting_nodes: BTreeSet::new(),
            frpairs: Mutex::new(HashMap::new()),
            rejected: Mutex::new(HashSet::new()),
            best: None,
            round: 0,
            elapsed: Duration::ZERO,
            termination: None,
            workers,
        })
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn allowed_starting_nodes(&self) -> &BTreeSet<u64> {
        &self.allowed_starting_nodes
    }

    /// The candidate pool, in canonical node-set order.
    pub fn candidates(&self) -> impl Iterator<Item = &Arc<FrequentedRegion>> {
        self.all_frequented_regions.values()
    }

    /// Accepted FRs, best first.
    pub fn frequented_regions(&self) -> Vec<Arc<FrequentedRegion>> {
        let mut frs: Vec<_> = self.frequented_regions.values().cloned().collect();
        frs.sort_by(|a, b| b.cmp(a));
        frs
    }

    /// Settings plus run metadata, for the parameters record.
    pub fn run_parameters(&self) -> Vec<(String, String)> {
        let mut params = self.config.to_parameters();
        params.push(("rounds".into(), self.round.to_string()));
        params.push((
            "elapsedSeconds".into(),
            format!("{:.3}", self.elapsed.as_secs_f64()),
        ));
        params.push((
            "termination".into(),
            self.termination
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".into()),
        ));
        params.push(("frCount".into(), self.frequented_regions.len().to_string()));
        params
    }

    fn evaluate(&self, nodes: NodeSet) -> Result<FrequentedRegion> {
        FrequentedRegion::evaluate(self.graph, nodes, self.params)
    }

    /// Seeds the pool with one FR per allowed node, plus the required and
    /// included node sets when given.
    fn initialize(&mut self) -> Result<()> {
        let nodes: Vec<_> = self
            .graph
            .nodes()
            .filter(|n| !self.excluded.as_ref().is_some_and(|x| x.contains(n)))
            .cloned()
            .collect();

        let seeds: Vec<FrequentedRegion> = self.workers.install(|| {
            nodes
                .par_iter()
                .map(|n| self.evaluate(NodeSet::singleton(n.clone())))
                .collect::<Result<Vec<_>>>()
        })?;

        let alpha_is_one = self.config.alpha >= 1.0;
        for fr in seeds {
            // With full penetrance no merge can out-support its singletons.
            if alpha_is_one && fr.support() < self.config.min_support {
                continue;
            }
            if let Some(node) = fr.nodes().first() {
                self.allowed_starting_nodes.insert(node.id);
            }
            self.all_frequented_regions
                .insert(fr.nodes().clone(), Arc::new(fr));
        }

        for seed in [self.required.clone(), self.included.clone()]
            .into_iter()
            .flatten()
        {
            if seed.len() > 1 && !self.all_frequented_regions.contains_key(&seed) {
                let fr = self.evaluate(seed.clone())?;
                self.all_frequented_regions.insert(seed, Arc::new(fr));
            }
        }

        info!(
            nodes = self.graph.node_count(),
            paths = self.graph.path_count(),
            seeds = self.all_frequented_regions.len(),
            "seeded candidate pool"
        );
        Ok(())
    }

    /// Runs rounds until no interesting merge remains or a budget runs out.
    /// Returns the accepted FRs, best first.
    pub fn run(&mut self) -> Result<Vec<Arc<FrequentedRegion>>> {
        let started = Instant::now();
        let prior = self.elapsed;
        let budget = self
            .config
            .max_clocktime_minutes
            .map(|m| Duration::from_secs_f64(m * 60.0));

        if self.all_frequented_regions.is_empty() {
            self.initialize()?;
        }
        info!(
            alpha = self.config.alpha,
            kappa = %self.config.kappa,
            priority = %self.config.priority,
            "starting frequented region search"
        );

        self.termination = None;
        while self.termination.is_none() {
            if self.config.max_round.is_some_and(|max| self.round >= max) {
                self.termination = Some(Termination::MaxRound);
                break;
            }
            let round = self.round + 1;
            match self.run_round(round, started, budget)? {
                RoundOutcome::Accepted {
                    winner,
                    interesting,
                } => {
                    self.round = round;
                    self.accept(round, winner, interesting)?;
                }
                RoundOutcome::Exhausted(best_rejected) => {
                    self.round = round;
                    match best_rejected {
                        Some(fr) => info!(round, best_rejected = %fr, "no interesting merge"),
                        None => info!(round, "no merge left to evaluate"),
                    }
                    self.termination = Some(Termination::Exhausted);
                }
                RoundOutcome::TimedOut => {
                    warn!(round, "clock time budget exceeded; discarding partial round");
                    self.termination = Some(Termination::ClockTime);
                }
            }
            self.elapsed = prior + started.elapsed();
            if let Some(dir) = self.config.checkpoint_dir.clone() {
                self.write_checkpoint(&dir)?;
            }
        }

        self.elapsed = prior + started.elapsed();
        info!(
            rounds = self.round,
            accepted = self.frequented_regions.len(),
            termination = ?self.termination,
            elapsed = ?self.elapsed,
            "search finished"
        );
        Ok(self.frequented_regions())
    }

    fn run_round(
        &self,
        round: usize,
        started: Instant,
        budget: Option<Duration>,
    ) -> Result<RoundOutcome> {
        let pool: Vec<Arc<FrequentedRegion>> =
            self.all_frequented_regions.values().cloned().collect();
        let seen: Mutex<HashSet<NodeSet>> = Mutex::new(HashSet::new());
        let mut interesting: BTreeSet<Arc<FrequentedRegion>> = BTreeSet::new();
        let mut best_rejected: Option<Arc<FrequentedRegion>> = None;

        let progress = count_progress_bar(
            format!("Round {}", round),
            "FRs",
            Some(pool.len() as u64),
            self.config.show_progress,
        );

        for fr1 in &pool {
            if budget.is_some_and(|b| started.elapsed() > b) {
                progress.abandon_with_message("clock time exceeded");
                return Ok(RoundOutcome::TimedOut);
            }
            progress.inc(1);
            if !self.is_allowed_fr1(fr1) {
                continue;
            }

            let merges: Vec<Merge> = self.workers.install(|| {
                pool.par_iter()
                    .map(|fr2| self.evaluate_merge(fr1, fr2, &seen))
                    .collect::<Result<Vec<_>>>()
            })?;

            for merge in merges {
                match merge {
                    Merge::Interesting(fr) => {
                        interesting.insert(fr);
                    }
                    Merge::Rejected(fr) => {
                        if best_rejected.as_ref().map_or(true, |b| fr > *b) {
                            best_rejected = Some(fr);
                        }
                    }
                    Merge::Skipped => {}
                }
            }
        }
        progress.finish_and_clear();

        debug!(round, interesting = interesting.len(), "round evaluated");
        let winner = interesting.iter().next_back().cloned();
        match winner {
            Some(winner) => Ok(RoundOutcome::Accepted {
                winner,
                interesting: interesting.into_iter().collect(),
            }),
            None => Ok(RoundOutcome::Exhausted(best_rejected)),
        }
    }

    /// Adds a round's interesting merges to the pool and its winner to the
    /// output.
    fn accept(
        &mut self,
        round: usize,
        winner: Arc<FrequentedRegion>,
        interesting: Vec<Arc<FrequentedRegion>>,
    ) -> Result<()> {
        for fr in interesting {
            self.all_frequented_regions
                .entry(fr.nodes().clone())
                .or_insert(fr);
        }

        // Restored from a checkpoint without subpaths.
        let winner = if winner.subpaths().is_empty() && winner.support() > 0 {
            Arc::new(self.evaluate(winner.nodes().clone())?)
        } else {
            winner
        };

        if let Some(KeepOption::Subset(min_size)) = self.config.keep_option {
            let evicted: Vec<NodeSet> = self
                .frequented_regions
                .values()
                .filter(|fr| {
                    fr.size() >= min_size
                        && fr.nodes().is_superset_of(winner.nodes())
                        && fr.priority() <= winner.priority()
                })
                .map(|fr| fr.nodes().clone())
                .collect();
            for nodes in evicted {
                debug!(evicted = %nodes, "superseded by subset");
                self.frequented_regions.remove(&nodes);
            }
        }

        info!(
            round,
            nodes = %winner.nodes(),
            size = winner.size(),
            support = winner.support(),
            case = winner.case_support(),
            ctrl = winner.ctrl_support(),
            or = winner.odds_ratio(),
            p = winner.p_value(),
            priority = winner.priority(),
            "accepted frequented region"
        );
        self.frequented_regions
            .insert(winner.nodes().clone(), winner.clone());
        if self.config.require_best_node_set {
            self.required = Some(winner.nodes().clone());
            self.best = Some(winner);
        }
        Ok(())
    }

    fn is_allowed_fr1(&self, fr1: &FrequentedRegion) -> bool {
        if self.config.require_best_node_set {
            if let Some(best) = &self.best {
                return fr1.nodes() == best.nodes();
            }
        }
        match &self.required {
            Some(required) => fr1.nodes().contains_all(required),
            None => true,
        }
    }

    /// Constraint checks that depend only on the merged node set; a failure
    /// is remembered for the rest of the run.
    fn static_rejection(&self, merged: &NodeSet) -> Option<&'static str> {
        if !self.config.kappa.is_infinite() && !merged.single_contig() {
            return Some("spans chromosomes");
        }
        if self.config.max_size.is_some_and(|max| merged.len() > max) {
            return Some("too large");
        }
        if self.excluded.as_ref().is_some_and(|x| merged.contains_any(x)) {
            return Some("holds excluded node");
        }
        if self.included.as_ref().is_some_and(|x| !merged.contains_any(x)) {
            return Some("holds no included node");
        }
        if self.config.require_same_position && !merged.same_position() {
            return Some("mixes positions");
        }
        None
    }

    fn is_interesting(&self, fr: &FrequentedRegion) -> bool {
        fr.support() >= self.config.min_support
            && fr.size() >= self.config.min_size
            && self.config.max_size.map_or(true, |max| fr.size() <= max)
            && fr.priority() >= self.config.min_priority
    }

    /// False if an accepted FR of at least equal priority makes `fr` redundant
    /// under the keep option.
    fn passes_keep_option(&self, fr: &FrequentedRegion) -> bool {
        match self.config.keep_option {
            None => true,
            Some(KeepOption::Subset(min_size)) => {
                fr.size() < min_size
                    || !self.frequented_regions.values().any(|accepted| {
                        fr.nodes().is_superset_of(accepted.nodes())
                            && accepted.priority() >= fr.priority()
                    })
            }
            Some(KeepOption::Distance(max_distance)) => {
                !self.frequented_regions.values().any(|accepted| {
                    accepted.priority() >= fr.priority()
                        && NodeSet::distance(fr.nodes(), accepted.nodes()) <= max_distance
                })
            }
        }
    }

    fn evaluate_merge(
        &self,
        fr1: &Arc<FrequentedRegion>,
        fr2: &Arc<FrequentedRegion>,
        seen: &Mutex<HashSet<NodeSet>>,
    ) -> Result<Merge> {
        let merged = NodeSet::merge(fr1.nodes(), fr2.nodes());
        if merged.len() == fr1.size().max(fr2.size()) {
            return Ok(Merge::Skipped);
        }
        if self.config.require_best_node_set && self.best.is_some() && fr2.size() != 1 {
            return Ok(Merge::Skipped);
        }
        if self.frequented_regions.contains_key(&merged) {
            return Ok(Merge::Skipped);
        }
        if self.required.as_ref().is_some_and(|r| !merged.contains_all(r)) {
            return Ok(Merge::Skipped);
        }
        if self.rejected.lock().contains(&merged) {
            return Ok(Merge::Skipped);
        }
        if !seen.lock().insert(merged.clone()) {
            return Ok(Merge::Skipped);
        }
        if let Some(reason) = self.static_rejection(&merged) {
            debug!(merged = %merged, reason, "rejected merge");
            self.rejected.lock().insert(merged);
            return Ok(Merge::Skipped);
        }

        let cached = self.frpairs.lock().get(&merged).map(|p| p.merged.clone());
        let fr = match cached {
            Some(fr) => fr,
            None => {
                let fr = Arc::new(self.evaluate(merged.clone())?);
                self.frpairs.lock().insert(
                    merged.clone(),
                    FrPair {
                        fr1: fr1.nodes().clone(),
                        fr2: fr2.nodes().clone(),
                        merged: fr.clone(),
                    },
                );
                fr
            }
        };

        if !self.is_interesting(&fr) {
            self.rejected.lock().insert(merged);
            return Ok(Merge::Rejected(fr));
        }
        if !self.passes_keep_option(&fr) {
            return Ok(Merge::Rejected(fr));
        }
        Ok(Merge::Interesting(fr))
    }
}

/// Writes through a temporary sibling file so an interrupted checkpoint never
/// leaves a truncated file behind.
fn write_replacing(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let tmp = path.with_extension("tmp");
    write(&tmp)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn state_value<'a>(state: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    state
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| FrError::invalid_data(format!("checkpoint state lacks '{}'", key)))
}

impl<'g> FrFinder<'g> {
    /// Persists the pool, accepted pairs, rejected keys, output and round
    /// state into `dir`.
    pub fn write_checkpoint(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_replacing(&dir.join(PARAMS_FILE), |p| {
            write_parameters(p, &self.config.to_parameters())
        })?;
        write_replacing(&dir.join(POOL_FILE), |p| {
            write_frequented_regions(p, self.all_frequented_regions.values().map(Arc::as_ref))
        })?;
        write_replacing(&dir.join(OUTPUT_FILE), |p| {
            write_frequented_regions(p, self.frequented_regions.values().map(Arc::as_ref))
        })?;

        write_replacing(&dir.join(PAIRS_FILE), |p| {
            let pairs = self.frpairs.lock();
            let mut keys: Vec<&NodeSet> = pairs.keys().collect();
            keys.sort();
            let mut out = BufWriter::new(File::create(p)?);
            for key in keys {
                let pair = &pairs[key];
                writeln!(out, "{}\t{}\t{}", pair.fr1, pair.fr2, pair.merged)?;
            }
            out.flush()?;
            Ok(())
        })?;

        write_replacing(&dir.join(REJECTED_FILE), |p| {
            let rejected = self.rejected.lock();
            let mut keys: Vec<&NodeSet> = rejected.iter().collect();
            keys.sort();
            let mut out = BufWriter::new(File::create(p)?);
            for key in keys {
                writeln!(out, "{}", key)?;
            }
            out.flush()?;
            Ok(())
        })?;

        let describe = |nodes: Option<&NodeSet>| {
            nodes
                .map(|n| n.to_string())
                .unwrap_or_else(|| "none".to_string())
        };
        let state = vec![
            ("round".to_string(), self.round.to_string()),
            (
                "elapsedSeconds".to_string(),
                self.elapsed.as_secs_f64().to_string(),
            ),
            (
                "best".to_string(),
                describe(self.best.as_ref().map(|b| b.nodes())),
            ),
            ("required".to_string(), describe(self.required.as_ref())),
        ];
        write_replacing(&dir.join(STATE_FILE), |p| write_parameters(p, &state))?;
        debug!(round = self.round, dir = %dir.display(), "wrote checkpoint");
        Ok(())
    }

    /// Restores a finder from a checkpoint directory. `adjust` may change
    /// budgets and runtime settings before the finder is rebuilt.
    pub fn resume(
        graph: &'g PangenomicGraph,
        dir: &Path,
        adjust: impl FnOnce(&mut FinderConfig),
    ) -> Result<Self> {
        let params = read_parameters(&dir.join(PARAMS_FILE))?;
        let mut config = FinderConfig::from_parameters(&params)?;
        config.checkpoint_dir = Some(dir.to_path_buf());
        adjust(&mut config);
        let mut finder = Self::new(graph, config)?;
        let support_params = finder.params;

        let state = read_parameters(&dir.join(STATE_FILE))?;
        finder.round = state_value(&state, "round")?
            .parse()
            .map_err(|_| FrError::invalid_data("checkpoint round is not a number"))?;
        let seconds: f64 = state_value(&state, "elapsedSeconds")?
            .parse()
            .map_err(|_| FrError::invalid_data("checkpoint elapsed time is not a number"))?;
        finder.elapsed = Duration::from_secs_f64(seconds);
        let required = state_value(&state, "required")?;
        if required != "none" {
            finder.required = Some(NodeSet::parse(graph, required)?);
        }

        for fr in read_frequented_regions(&dir.join(POOL_FILE), graph, support_params)? {
            if fr.size() == 1 {
                if let Some(node) = fr.nodes().first() {
                    finder.allowed_starting_nodes.insert(node.id);
                }
            }
            finder
                .all_frequented_regions
                .insert(fr.nodes().clone(), Arc::new(fr));
        }

        let stored = read_frequented_regions(&dir.join(OUTPUT_FILE), graph, support_params)?;
        let output: Vec<FrequentedRegion> = finder.workers.install(|| {
            stored
                .into_par_iter()
                .map(|fr| FrequentedRegion::evaluate(graph, fr.nodes().clone(), support_params))
                .collect::<Result<Vec<_>>>()
        })?;
        for fr in output {
            finder
                .frequented_regions
                .insert(fr.nodes().clone(), Arc::new(fr));
        }

        let best = state_value(&state, "best")?;
        if best != "none" {
            let nodes = NodeSet::parse(graph, best)?;
            finder.best = finder.frequented_regions.get(&nodes).cloned();
        }

        {
            let mut pairs = finder.frpairs.lock();
            let reader = BufReader::new(File::open(dir.join(PAIRS_FILE))?);
            for (idx, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() < 3 {
                    return Err(FrError::parse(idx + 1, "expected fr1, fr2 and FR columns"));
                }
                let fr1 = NodeSet::from_ids(graph, &parse_node_ids(fields[0])?)?;
                let fr2 = NodeSet::from_ids(graph, &parse_node_ids(fields[1])?)?;
                let merged = crate::fr_utils::parse_fr_fields(
                    &fields[2..],
                    idx + 1,
                    graph,
                    support_params,
                )?;
                pairs.insert(
                    merged.nodes().clone(),
                    FrPair {
                        fr1,
                        fr2,
                        merged: Arc::new(merged),
                    },
                );
            }
        }

        {
            let mut rejected = finder.rejected.lock();
            let reader = BufReader::new(File::open(dir.join(REJECTED_FILE))?);
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    rejected.insert(NodeSet::parse(graph, &line)?);
                }
            }
        }

        info!(
            round = finder.round,
            pool = finder.all_frequented_regions.len(),
            accepted = finder.frequented_regions.len(),
            "resumed from checkpoint {}",
            dir.display()
        );
        Ok(finder)
    }
}
