//! # Finder configuration
//!
//! `FinderConfig` is the single context object handed to `FrFinder`. It holds
//! the search parameters (α, κ, priority), the interest thresholds, node
//! constraints, run budgets and runtime knobs. String grammars:
//!
//! - priority: `N[:case|ctrl|alt]`, `N` in `0..=4`
//! - keep option: `subset[:N]` or `distance[:N]`
//! - kappa: a non-negative integer, or `inf` / `infinite` / `-1`
//! - node lists: `[id,id,...]`

use crate::error::{FrError, Result};
use crate::node::parse_node_ids;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Maximum number of contiguous non-member nodes tolerated inside a
/// supporting span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kappa {
    Finite(usize),
    Infinite,
}

impl Kappa {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Kappa::Infinite)
    }

    /// True if a run of `gap` inserted nodes is tolerated.
    pub fn allows(&self, gap: usize) -> bool {
        match self {
            Kappa::Finite(k) => gap <= *k,
            Kappa::Infinite => true,
        }
    }
}

impl FromStr for Kappa {
    type Err = FrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inf" | "infinite" | "infinity" | "-1" => Ok(Kappa::Infinite),
            other => other
                .parse::<usize>()
                .map(Kappa::Finite)
                .map_err(|_| FrError::config(format!("invalid kappa '{}'", s))),
        }
    }
}

impl fmt::Display for Kappa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kappa::Finite(k) => write!(f, "{}", k),
            Kappa::Infinite => f.write_str("inf"),
        }
    }
}

/// Which statistic drives an FR's priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityMetric {
    /// 0: raw support (or one label's subpath count)
    Support,
    /// 1: signed case/control support difference
    SupportDifference,
    /// 2: absolute case/control support difference
    AbsoluteDifference,
    /// 3: log-scaled odds ratio
    OddsRatio,
    /// 4: log-scaled Fisher's exact p-value, `round(100 × −log10 p)`.
    ///
    /// With a `case` or `ctrl` label the score is negated unless the FR leans
    /// toward that label (OR > 1 for case, OR < 1 for ctrl). An OR of exactly
    /// 1 leans toward neither.
    PValue,
}

impl PriorityMetric {
    pub fn code(&self) -> u8 {
        match self {
            PriorityMetric::Support => 0,
            PriorityMetric::SupportDifference => 1,
            PriorityMetric::AbsoluteDifference => 2,
            PriorityMetric::OddsRatio => 3,
            PriorityMetric::PValue => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PriorityMetric::Support),
            1 => Some(PriorityMetric::SupportDifference),
            2 => Some(PriorityMetric::AbsoluteDifference),
            3 => Some(PriorityMetric::OddsRatio),
            4 => Some(PriorityMetric::PValue),
            _ => None,
        }
    }
}

/// Label qualifier on a priority option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityLabel {
    Case,
    Ctrl,
    /// Either direction; magnitude only.
    Alt,
}

impl PriorityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLabel::Case => "case",
            PriorityLabel::Ctrl => "ctrl",
            PriorityLabel::Alt => "alt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityOption {
    pub metric: PriorityMetric,
    pub label: Option<PriorityLabel>,
}

impl PriorityOption {
    pub fn new(metric: PriorityMetric, label: Option<PriorityLabel>) -> Result<Self> {
        if metric == PriorityMetric::SupportDifference && label.is_none() {
            return Err(FrError::config(
                "priority option 1 (support difference) requires a case, ctrl or alt label",
            ));
        }
        Ok(Self { metric, label })
    }
}

impl Default for PriorityOption {
    fn default() -> Self {
        Self {
            metric: PriorityMetric::Support,
            label: None,
        }
    }
}

impl FromStr for PriorityOption {
    type Err = FrError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || FrError::config(format!("unsupported priority option '{}'", s));
        let (code, label) = match s.trim().split_once(':') {
            Some((code, label)) => (code, Some(label)),
            None => (s.trim(), None),
        };
        let metric = code
            .parse::<u8>()
            .ok()
            .and_then(PriorityMetric::from_code)
            .ok_or_else(invalid)?;
        let label = match label.map(|l| l.trim().to_ascii_lowercase()) {
            None => None,
            Some(l) => Some(match l.as_str() {
                "case" => PriorityLabel::Case,
                "ctrl" | "control" => PriorityLabel::Ctrl,
                "alt" => PriorityLabel::Alt,
                _ => return Err(invalid()),
            }),
        };
        PriorityOption::new(metric, label)
    }
}

impl fmt::Display for PriorityOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(label) => write!(f, "{}:{}", self.metric.code(), label.as_str()),
            None => write!(f, "{}", self.metric.code()),
        }
    }
}

/// Policy for discarding merges that duplicate an already accepted FR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepOption {
    /// Drop a merge of size >= N that is a superset of an accepted FR with
    /// priority >= its own.
    Subset(usize),
    /// Drop a merge within edit distance N of an accepted FR with priority
    /// >= its own.
    Distance(usize),
}

impl FromStr for KeepOption {
    type Err = FrError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            FrError::config(format!(
                "keep option '{}' must be subset[:N] or distance[:N]",
                s
            ))
        };
        let trimmed = s.trim();
        let (kind, n) = match trimmed.split_once(':') {
            Some((kind, n)) => (kind, Some(n.trim().parse::<usize>().map_err(|_| invalid())?)),
            None => (trimmed, None),
        };
        match kind {
            "subset" => Ok(KeepOption::Subset(n.unwrap_or(0))),
            "distance" => Ok(KeepOption::Distance(n.unwrap_or(1))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for KeepOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepOption::Subset(n) => write!(f, "subset:{}", n),
            KeepOption::Distance(n) => write!(f, "distance:{}", n),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Penetrance: minimum fraction of an FR's nodes a supporting span holds.
    pub alpha: f64,
    /// Insertion tolerance.
    pub kappa: Kappa,
    pub priority: PriorityOption,
    pub min_support: usize,
    pub min_size: usize,
    pub max_size: Option<usize>,
    pub min_priority: i64,
    pub max_round: Option<usize>,
    pub max_clocktime_minutes: Option<f64>,
    pub keep_option: Option<KeepOption>,
    pub required_nodes: Vec<u64>,
    pub included_nodes: Vec<u64>,
    pub excluded_nodes: Vec<u64>,
    pub require_best_node_set: bool,
    pub require_same_position: bool,
    pub threads: Option<usize>,
    pub show_progress: bool,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            kappa: Kappa::Finite(0),
            priority: PriorityOption::default(),
            min_support: 1,
            min_size: 1,
            max_size: None,
            min_priority: i64::MIN,
            max_round: None,
            max_clocktime_minutes: None,
            keep_option: None,
            required_nodes: Vec::new(),
            included_nodes: Vec::new(),
            excluded_nodes: Vec::new(),
            require_best_node_set: false,
            require_same_position: false,
            threads: None,
            show_progress: false,
            checkpoint_dir: None,
        }
    }
}

impl FinderConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(FrError::config(format!(
                "alpha must lie in [0, 1], got {}",
                self.alpha
            )));
        }
        if let Some(max_size) = self.max_size {
            if max_size == 0 || max_size < self.min_size {
                return Err(FrError::config(format!(
                    "max size {} must be positive and at least min size {}",
                    max_size, self.min_size
                )));
            }
        }
        if self.max_round == Some(0) {
            return Err(FrError::config("max round must be at least 1"));
        }
        if let Some(minutes) = self.max_clocktime_minutes {
            if !(minutes > 0.0) {
                return Err(FrError::config(format!(
                    "max clock time must be positive, got {}",
                    minutes
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(FrError::config("thread count must be at least 1"));
        }
        if self.priority.metric == PriorityMetric::SupportDifference && self.priority.label.is_none()
        {
            return Err(FrError::config(
                "priority option 1 (support difference) requires a label",
            ));
        }
        if let Some(id) = self
            .required_nodes
            .iter()
            .find(|id| self.excluded_nodes.contains(id))
        {
            return Err(FrError::config(format!(
                "node {} is both required and excluded",
                id
            )));
        }
        Ok(())
    }

    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    /// Key/value record of every setting, for the run parameters file.
    pub fn to_parameters(&self) -> Vec<(String, String)> {
        let ids = |ids: &[u64]| {
            let parts: Vec<String> = ids.iter().map(u64::to_string).collect();
            format!("[{}]", parts.join(","))
        };
        let opt = |v: Option<String>| v.unwrap_or_else(|| "none".to_string());
        vec![
            ("alpha".into(), self.alpha.to_string()),
            ("kappa".into(), self.kappa.to_string()),
            ("priorityOption".into(), self.priority.to_string()),
            ("minSupport".into(), self.min_support.to_string()),
            ("minSize".into(), self.min_size.to_string()),
            ("maxSize".into(), opt(self.max_size.map(|v| v.to_string()))),
            ("minPriority".into(), self.min_priority.to_string()),
            ("maxRound".into(), opt(self.max_round.map(|v| v.to_string()))),
            (
                "maxClocktimeMinutes".into(),
                opt(self.max_clocktime_minutes.map(|v| v.to_string())),
            ),
            ("keepOption".into(), opt(self.keep_option.map(|k| k.to_string()))),
            ("requiredNodes".into(), ids(&self.required_nodes)),
            ("includedNodes".into(), ids(&self.included_nodes)),
            ("excludedNodes".into(), ids(&self.excluded_nodes)),
            (
                "requireBestNodeSet".into(),
                self.require_best_node_set.to_string(),
            ),
            (
                "requireSamePosition".into(),
                self.require_same_position.to_string(),
            ),
        ]
    }

    /// Rebuilds a configuration from a parameters record. Keys that are
    /// absent keep their defaults; unknown keys are ignored.
    pub fn from_parameters(params: &BTreeMap<String, String>) -> Result<Self> {
        fn num<T: FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| FrError::config(format!("invalid {} '{}'", key, value)))
        }
        fn optional<T: FromStr>(key: &str, value: &str) -> Result<Option<T>> {
            if value.trim() == "none" {
                Ok(None)
            } else {
                num(key, value).map(Some)
            }
        }

        let mut config = FinderConfig::default();
        for (key, value) in params {
            match key.as_str() {
                "alpha" => config.alpha = num(key, value)?,
                "kappa" => config.kappa = value.parse()?,
                "priorityOption" => config.priority = value.parse()?,
                "minSupport" => config.min_support = num(key, value)?,
                "minSize" => config.min_size = num(key, value)?,
                "maxSize" => config.max_size = optional(key, value)?,
                "minPriority" => config.min_priority = num(key, value)?,
                "maxRound" => config.max_round = optional(key, value)?,
                "maxClocktimeMinutes" => config.max_clocktime_minutes = optional(key, value)?,
                "keepOption" => {
                    config.keep_option = if value.trim() == "none" {
                        None
                    } else {
                        Some(value.parse()?)
                    }
                }
                "requiredNodes" => config.required_nodes = parse_node_ids(value)?,
                "includedNodes" => config.included_nodes = parse_node_ids(value)?,
                "excludedNodes" => config.excluded_nodes = parse_node_ids(value)?,
                "requireBestNodeSet" => config.require_best_node_set = num(key, value)?,
                "requireSamePosition" => config.require_same_position = num(key, value)?,
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_grammar() {
        let p: PriorityOption = "3:ctrl".parse().unwrap();
        assert_eq!(p.metric, PriorityMetric::OddsRatio);
        assert_eq!(p.label, Some(PriorityLabel::Ctrl));
        assert_eq!(p.to_string(), "3:ctrl");
        assert!("5".parse::<PriorityOption>().is_err());
        assert!("1".parse::<PriorityOption>().is_err());
        assert!("2:tumor".parse::<PriorityOption>().is_err());
    }

    #[test]
    fn test_keep_option_grammar() {
        assert_eq!("subset".parse::<KeepOption>().unwrap(), KeepOption::Subset(0));
        assert_eq!("subset:3".parse::<KeepOption>().unwrap(), KeepOption::Subset(3));
        assert_eq!("distance".parse::<KeepOption>().unwrap(), KeepOption::Distance(1));
        assert!("superset:2".parse::<KeepOption>().is_err());
        assert!("distance:x".parse::<KeepOption>().is_err());
    }

    #[test]
    fn test_kappa_grammar() {
        assert_eq!("inf".parse::<Kappa>().unwrap(), Kappa::Infinite);
        assert_eq!("-1".parse::<Kappa>().unwrap(), Kappa::Infinite);
        assert_eq!("3".parse::<Kappa>().unwrap(), Kappa::Finite(3));
        assert!(Kappa::Finite(2).allows(2));
        assert!(!Kappa::Finite(2).allows(3));
    }

    #[test]
    fn test_validate_bounds() {
        let mut config = FinderConfig::default();
        assert!(config.validate().is_ok());
        config.min_size = 4;
        config.max_size = Some(2);
        assert!(config.validate().is_err());

        let config = FinderConfig {
            alpha: 1.5,
            ..FinderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parameters_round_trip() {
        let config = FinderConfig {
            alpha: 0.5,
            kappa: Kappa::Infinite,
            priority: "4:case".parse().unwrap(),
            keep_option: Some(KeepOption::Distance(2)),
            required_nodes: vec![3, 7],
            max_round: Some(5),
            ..FinderConfig::default()
        };
        let params: BTreeMap<String, String> = config.to_parameters().into_iter().collect();
        let restored = FinderConfig::from_parameters(&params).unwrap();
        assert_eq!(restored.alpha, 0.5);
        assert_eq!(restored.kappa, Kappa::Infinite);
        assert_eq!(restored.priority, config.priority);
        assert_eq!(restored.keep_option, Some(KeepOption::Distance(2)));
        assert_eq!(restored.required_nodes, vec![3, 7]);
        assert_eq!(restored.max_round, Some(5));
        assert_eq!(restored.max_size, None);
    }
}
