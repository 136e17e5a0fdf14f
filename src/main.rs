use clap::{Args, Parser, Subcommand, ValueEnum};
use frfinder::fr_utils::{
    read_frequented_regions, read_subpaths, write_fr_path_matrix_tsv, write_frequented_regions,
    write_matrix_npy, write_parameters, write_path_fr_matrix_tsv, write_subpaths, fr_path_matrix,
    path_fr_matrix, prune, PruneOptions,
};
use frfinder::progress::spinner_progress;
use frfinder::{
    FinderConfig, FrFinder, FrequentedRegion, Kappa, KeepOption, PangenomicGraph, PriorityOption,
    Result, SupportParams,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// frfinder: frequented regions of a case/control pangenomic graph
#[derive(Parser, Debug)]
#[command(
    name = "frfinder",
    about = "Find frequented regions that separate case and control paths in a pangenomic graph",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Log debug events
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the frequented-region search on a graph dump
    Find(FindArgs),
    /// Filter an FR table by size, support, p-value and priority
    Prune(PruneArgs),
    /// Write the path × FR membership matrix of an FR table
    Matrix(MatrixArgs),
}

#[derive(Args, Debug, Clone)]
struct GraphArgs {
    /// Graph dump prefix (reads PREFIX.nodes.txt and PREFIX.paths.txt)
    #[arg(short, long, value_name = "PREFIX")]
    graph: String,
    /// Drop no-call nodes before searching
    #[arg(long)]
    remove_no_calls: bool,
    /// Randomly drop paths so case and control counts match
    #[arg(long, value_name = "SEED")]
    equalize: Option<u64>,
}

impl GraphArgs {
    fn load(&self) -> Result<PangenomicGraph> {
        let mut graph = PangenomicGraph::read_txt(&self.graph)?;
        if self.remove_no_calls {
            graph = graph.without_no_calls()?;
        }
        if let Some(seed) = self.equalize {
            graph = graph.equalized(seed)?;
        }
        Ok(graph)
    }
}

#[derive(Args, Debug, Clone)]
struct SupportArgs {
    /// Penetrance: minimum fraction of FR nodes a supporting subpath covers
    #[arg(short, long, default_value_t = 1.0)]
    alpha: f64,
    /// Insertion tolerance: longest run of foreign nodes inside a subpath (integer or inf)
    #[arg(short, long, default_value = "0")]
    kappa: Kappa,
    /// Priority option N[:case|ctrl|alt], N in 0..=4
    #[arg(short, long, default_value = "0")]
    priority: PriorityOption,
}

impl SupportArgs {
    fn params(&self) -> SupportParams {
        SupportParams::new(self.alpha, self.kappa, self.priority)
    }
}

#[derive(Args, Debug)]
struct FindArgs {
    #[command(flatten)]
    graph: GraphArgs,
    #[command(flatten)]
    support: SupportArgs,
    /// Output prefix for PREFIX.frs.txt, PREFIX.subpaths.txt and PREFIX.params.txt
    #[arg(short, long, value_name = "PREFIX")]
    output: String,
    #[arg(long, default_value_t = 1)]
    min_support: usize,
    #[arg(long, default_value_t = 1)]
    min_size: usize,
    #[arg(long)]
    max_size: Option<usize>,
    #[arg(long, allow_hyphen_values = true)]
    min_priority: Option<i64>,
    #[arg(long)]
    max_round: Option<usize>,
    #[arg(long, value_name = "MINUTES")]
    max_clocktime: Option<f64>,
    /// subset[:N] or distance[:N]
    #[arg(long)]
    keep_option: Option<KeepOption>,
    /// Node ids every FR must contain, e.g. 4,5,6
    #[arg(long, value_delimiter = ',')]
    required_nodes: Vec<u64>,
    /// Node ids of which every FR must contain at least one
    #[arg(long, value_delimiter = ',')]
    included_nodes: Vec<u64>,
    /// Node ids no FR may contain
    #[arg(long, value_delimiter = ',')]
    excluded_nodes: Vec<u64>,
    /// Grow only the previous winner, one node per round
    #[arg(long)]
    require_best_node_set: bool,
    /// Only merge nodes at the same genomic position
    #[arg(long)]
    require_same_position: bool,
    /// Worker threads (default: all cores)
    #[arg(short, long)]
    threads: Option<usize>,
    /// Write a checkpoint into DIR after every round
    #[arg(long, value_name = "DIR")]
    checkpoint: Option<PathBuf>,
    /// Continue the run checkpointed in DIR; search settings come from the checkpoint
    #[arg(long, value_name = "DIR", conflicts_with = "checkpoint")]
    resume: Option<PathBuf>,
    /// Hide progress bars
    #[arg(long)]
    quiet: bool,
}

impl FindArgs {
    fn config(&self) -> FinderConfig {
        FinderConfig {
            alpha: self.support.alpha,
            kappa: self.support.kappa,
            priority: self.support.priority,
            min_support: self.min_support,
            min_size: self.min_size,
            max_size: self.max_size,
            min_priority: self.min_priority.unwrap_or(i64::MIN),
            max_round: self.max_round,
            max_clocktime_minutes: self.max_clocktime,
            keep_option: self.keep_option,
            required_nodes: self.required_nodes.clone(),
            included_nodes: self.included_nodes.clone(),
            excluded_nodes: self.excluded_nodes.clone(),
            require_best_node_set: self.require_best_node_set,
            require_same_position: self.require_same_position,
            threads: self.threads,
            show_progress: !self.quiet,
            checkpoint_dir: self.checkpoint.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct PruneArgs {
    #[command(flatten)]
    graph: GraphArgs,
    #[command(flatten)]
    support: SupportArgs,
    /// FR table to filter
    #[arg(short, long, value_name = "FRS")]
    input: PathBuf,
    /// Filtered FR table
    #[arg(short, long, value_name = "FRS")]
    output: PathBuf,
    #[arg(long)]
    min_size: Option<usize>,
    #[arg(long)]
    min_support: Option<usize>,
    #[arg(long)]
    max_p: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    min_priority: Option<i64>,
    /// Drop FRs holding a no-call node
    #[arg(long)]
    drop_no_calls: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixFormat {
    Tsv,
    Npy,
}

#[derive(Args, Debug)]
struct MatrixArgs {
    #[command(flatten)]
    graph: GraphArgs,
    #[command(flatten)]
    support: SupportArgs,
    /// FR table; subpaths are recomputed unless --subpaths is given
    #[arg(short, long, value_name = "FRS")]
    input: PathBuf,
    /// Subpath listing written by `find`
    #[arg(long, value_name = "SUBPATHS")]
    subpaths: Option<PathBuf>,
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = MatrixFormat::Tsv)]
    format: MatrixFormat,
    /// One row per FR instead of one row per path
    #[arg(long)]
    transpose: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Find(args) => run_find(&args),
        Command::Prune(args) => run_prune(&args),
        Command::Matrix(args) => run_matrix(&args),
    }
}

fn run_find(args: &FindArgs) -> Result<()> {
    let graph = args.graph.load()?;
    let mut finder = match &args.resume {
        Some(dir) => {
            let (max_round, max_clocktime, threads, quiet) =
                (args.max_round, args.max_clocktime, args.threads, args.quiet);
            FrFinder::resume(&graph, dir, |config| {
                if max_round.is_some() {
                    config.max_round = max_round;
                }
                if max_clocktime.is_some() {
                    config.max_clocktime_minutes = max_clocktime;
                }
                config.threads = threads;
                config.show_progress = !quiet;
            })?
        }
        None => FrFinder::new(&graph, args.config())?,
    };

    let frs = finder.run()?;
    let frs_path = format!("{}.frs.txt", args.output);
    write_frequented_regions(Path::new(&frs_path), frs.iter().map(Arc::as_ref))?;
    write_subpaths(
        Path::new(&format!("{}.subpaths.txt", args.output)),
        frs.iter().map(Arc::as_ref),
    )?;
    write_parameters(
        Path::new(&format!("{}.params.txt", args.output)),
        &finder.run_parameters(),
    )?;
    info!(count = frs.len(), "wrote frequented regions to {}", frs_path);
    Ok(())
}

fn run_prune(args: &PruneArgs) -> Result<()> {
    let graph = args.graph.load()?;
    let frs = read_frequented_regions(&args.input, &graph, args.support.params())?;
    let before = frs.len();
    let options = PruneOptions {
        min_size: args.min_size,
        min_support: args.min_support,
        max_p_value: args.max_p,
        min_priority: args.min_priority,
        remove_no_calls: args.drop_no_calls,
    };
    let kept = prune(frs, &options);
    write_frequented_regions(&args.output, &kept)?;
    info!(before, after = kept.len(), "pruned {}", args.input.display());
    Ok(())
}

fn run_matrix(args: &MatrixArgs) -> Result<()> {
    let graph = args.graph.load()?;
    let params = args.support.params();
    let mut frs = read_frequented_regions(&args.input, &graph, params)?;
    match &args.subpaths {
        Some(subpaths) => read_subpaths(subpaths, &graph, &mut frs)?,
        None => {
            let spinner = spinner_progress("Support", "recomputing FR subpaths");
            frs = frs
                .into_iter()
                .map(|fr| FrequentedRegion::evaluate(&graph, fr.nodes().clone(), params))
                .collect::<Result<Vec<_>>>()?;
            spinner.finish_and_clear();
        }
    }

    match (args.format, args.transpose) {
        (MatrixFormat::Tsv, false) => write_path_fr_matrix_tsv(&args.output, &graph, &frs)?,
        (MatrixFormat::Tsv, true) => write_fr_path_matrix_tsv(&args.output, &graph, &frs)?,
        (MatrixFormat::Npy, false) => write_matrix_npy(&args.output, &path_fr_matrix(&graph, &frs)?)?,
        (MatrixFormat::Npy, true) => write_matrix_npy(&args.output, &fr_path_matrix(&graph, &frs)?)?,
    }
    info!(
        paths = graph.path_count(),
        frs = frs.len(),
        "wrote matrix to {}",
        args.output.display()
    );
    Ok(())
}
