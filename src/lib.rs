//! Frequented-region discovery on pangenomic graphs.
//!
//! A graph of variant nodes is traversed by one path per labeled sample.
//! `FrFinder` grows node sets round by round, keeping the ones whose
//! supporting subpaths best separate case from control samples.

pub mod config;
pub mod error;
pub mod finder;
pub mod fisher;
pub mod fr_utils;
pub mod frequented_region;
pub mod graph;
pub mod node;
pub mod path;
pub mod progress;

pub use config::{FinderConfig, Kappa, KeepOption, PriorityLabel, PriorityMetric, PriorityOption};
pub use error::{FrError, Result};
pub use finder::{FrFinder, FrPair, Termination};
pub use frequented_region::{FrStatistics, FrequentedRegion, SupportParams};
pub use graph::PangenomicGraph;
pub use node::{Node, NodeSet};
pub use path::{Label, Path, Sample};
