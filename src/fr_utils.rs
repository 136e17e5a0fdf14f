//! Persistence and post-processing of finished FR sets: FR tables, subpath
//! listings, parameter records, pruning and path/FR membership matrices.

use crate::error::{FrError, Result};
use crate::frequented_region::{FrStatistics, FrequentedRegion, SupportParams};
use crate::graph::PangenomicGraph;
use crate::node::{parse_node_ids, NodeSet};
use crate::path::{Label, Path};
use ndarray::Array2;
use ndarray_npy::write_npy;
use rayon::prelude::*;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path as FsPath;

pub const FR_TABLE_HEADER: [&str; 8] = [
    "nodes",
    "size",
    "support",
    "caseSupport",
    "ctrlSupport",
    "OR",
    "p",
    "priority",
];

fn tsv_writer(path: &FsPath) -> Result<csv::Writer<File>> {
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_path(path)?)
}

fn as_fr<T: Borrow<FrequentedRegion>>(fr: &T) -> &FrequentedRegion {
    Borrow::borrow(fr)
}

fn best_first<'a>(frs: impl IntoIterator<Item = &'a FrequentedRegion>) -> Vec<&'a FrequentedRegion> {
    let mut frs: Vec<_> = frs.into_iter().collect();
    frs.sort_by(|a, b| b.cmp(a));
    frs
}

/// Writes the FR table, best FR first.
pub fn write_frequented_regions<'a>(
    path: &FsPath,
    frs: impl IntoIterator<Item = &'a FrequentedRegion>,
) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(FR_TABLE_HEADER)?;
    for fr in best_first(frs) {
        let stats = fr.statistics();
        writer.write_record([
            fr.nodes().to_string(),
            fr.size().to_string(),
            stats.support.to_string(),
            stats.case_support.to_string(),
            stats.ctrl_support.to_string(),
            stats.odds_ratio.to_string(),
            stats.p_value.to_string(),
            stats.priority.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_column<T: std::str::FromStr>(field: &str, name: &str, line: usize) -> Result<T> {
    field
        .trim()
        .parse::<T>()
        .map_err(|_| FrError::parse(line, format!("invalid {} '{}'", name, field)))
}

/// Rebuilds an FR from the eight FR-table columns, keeping the stored
/// statistics.
pub(crate) fn parse_fr_fields(
    fields: &[&str],
    line: usize,
    graph: &PangenomicGraph,
    params: SupportParams,
) -> Result<FrequentedRegion> {
    if fields.len() < FR_TABLE_HEADER.len() {
        return Err(FrError::parse(
            line,
            format!(
                "expected {} FR columns, found {}",
                FR_TABLE_HEADER.len(),
                fields.len()
            ),
        ));
    }
    let nodes = NodeSet::from_ids(graph, &parse_node_ids(fields[0])?)?;
    let size: usize = parse_column(fields[1], "size", line)?;
    if size != nodes.len() {
        return Err(FrError::parse(
            line,
            format!("size {} does not match {} nodes", size, nodes.len()),
        ));
    }
    let stats = FrStatistics {
        support: parse_column(fields[2], "support", line)?,
        case_support: parse_column(fields[3], "caseSupport", line)?,
        ctrl_support: parse_column(fields[4], "ctrlSupport", line)?,
        odds_ratio: parse_column(fields[5], "OR", line)?,
        p_value: parse_column(fields[6], "p", line)?,
        priority: parse_column(fields[7], "priority", line)?,
    };
    Ok(FrequentedRegion::with_statistics(
        nodes,
        params,
        stats,
        Vec::new(),
    ))
}

/// Reads an FR table written by `write_frequented_regions`. Subpaths are left
/// empty; see `read_subpaths`.
pub fn read_frequented_regions(
    path: &FsPath,
    graph: &PangenomicGraph,
    params: SupportParams,
) -> Result<Vec<FrequentedRegion>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;
    let mut frs = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        let fields: Vec<&str> = record.iter().collect();
        frs.push(parse_fr_fields(&fields, line, graph, params)?);
    }
    Ok(frs)
}

/// Writes each FR as a `nodes<TAB>support` line followed by one
/// `sample.label:[ids]` line per supporting subpath.
pub fn write_subpaths<'a>(
    path: &FsPath,
    frs: impl IntoIterator<Item = &'a FrequentedRegion>,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for fr in best_first(frs) {
        writeln!(out, "{}\t{}", fr.nodes(), fr.support())?;
        for subpath in fr.subpaths() {
            writeln!(out, "{}", subpath)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Splits `name.label:[ids]` into the sample name and node ids.
fn parse_subpath_line(line: &str, line_no: usize) -> Result<(&str, Vec<u64>)> {
    let split = line
        .rfind(":[")
        .ok_or_else(|| FrError::parse(line_no, "subpath line lacks ':['"))?;
    let (sample, ids) = (&line[..split], &line[split + 1..]);
    let name = [Label::Case, Label::Ctrl]
        .iter()
        .find_map(|l| sample.strip_suffix(&format!(".{}", l)))
        .unwrap_or(sample);
    Ok((name, parse_node_ids(ids)?))
}

/// Restores the subpaths of `frs` from a listing written by `write_subpaths`.
/// Blocks for node sets not present in `frs` are skipped.
pub fn read_subpaths(
    path: &FsPath,
    graph: &PangenomicGraph,
    frs: &mut [FrequentedRegion],
) -> Result<()> {
    let by_name: HashMap<&str, &Path> = graph.paths().iter().map(|p| (p.name(), p)).collect();
    let index: HashMap<NodeSet, usize> = frs
        .iter()
        .enumerate()
        .map(|(i, fr)| (fr.nodes().clone(), i))
        .collect();

    let mut blocks: HashMap<usize, Vec<Path>> = HashMap::new();
    let mut current: Option<usize> = None;
    let reader = BufReader::new(File::open(path)?);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('[') {
            let nodes_field = trimmed.split('\t').next().unwrap_or(trimmed);
            let nodes = NodeSet::from_ids(graph, &parse_node_ids(nodes_field)?)?;
            current = index.get(&nodes).copied();
            if let Some(i) = current {
                blocks.entry(i).or_default();
            }
            continue;
        }
        let Some(i) = current else {
            continue;
        };
        let (name, ids) = parse_subpath_line(trimmed, line_no)?;
        let full = by_name.get(name).ok_or_else(|| {
            FrError::parse(line_no, format!("sample '{}' has no path in the graph", name))
        })?;
        let (Some(&first), Some(&last)) = (ids.first(), ids.last()) else {
            return Err(FrError::parse(line_no, "empty subpath"));
        };
        let left = graph.node(first).ok_or(FrError::MissingNode { id: first })?;
        let right = graph.node(last).ok_or(FrError::MissingNode { id: last })?;
        let subpath = full.subpath(left, right)?;
        if subpath.len() != ids.len() {
            return Err(FrError::parse(
                line_no,
                format!("subpath does not match the nodes of {}", name),
            ));
        }
        blocks.entry(i).or_default().push(subpath);
    }

    for (i, subpaths) in blocks {
        frs[i].set_subpaths(subpaths);
    }
    Ok(())
}

/// Writes `key<TAB>value` lines.
pub fn write_parameters(path: &FsPath, params: &[(String, String)]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (key, value) in params {
        writeln!(out, "{}\t{}", key, value)?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_parameters(path: &FsPath) -> Result<BTreeMap<String, String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut params = BTreeMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('\t')
            .ok_or_else(|| FrError::parse(idx + 1, "expected key<TAB>value"))?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(params)
}

/// Thresholds for `prune`. `None` disables a threshold.
#[derive(Debug, Clone, Default)]
pub struct PruneOptions {
    pub min_size: Option<usize>,
    pub min_support: Option<usize>,
    pub max_p_value: Option<f64>,
    pub min_priority: Option<i64>,
    pub remove_no_calls: bool,
}

/// Keeps the FRs that pass every enabled threshold, in their input order.
pub fn prune<T: Borrow<FrequentedRegion>>(frs: Vec<T>, options: &PruneOptions) -> Vec<T> {
    frs.into_iter()
        .filter(|fr| {
            let fr = as_fr(fr);
            options.min_size.map_or(true, |v| fr.size() >= v)
                && options.min_support.map_or(true, |v| fr.support() >= v)
                && options.max_p_value.map_or(true, |v| fr.p_value() <= v)
                && options.min_priority.map_or(true, |v| fr.priority() >= v)
                && !(options.remove_no_calls && fr.nodes().has_no_calls())
        })
        .collect()
}

/// Counts of supporting subpaths: one row per graph path, one column per FR.
pub fn path_fr_matrix<T: Borrow<FrequentedRegion> + Sync>(
    graph: &PangenomicGraph,
    frs: &[T],
) -> Result<Array2<u32>> {
    let rows: Vec<Vec<u32>> = graph
        .paths()
        .par_iter()
        .map(|path| {
            frs.iter()
                .map(|fr| as_fr(fr).path_support(path) as u32)
                .collect()
        })
        .collect();
    Array2::from_shape_vec((graph.path_count(), frs.len()), rows.concat())
        .map_err(|e| FrError::invalid_data(format!("matrix shape: {}", e)))
}

/// Counts of supporting subpaths: one row per FR, one column per graph path.
pub fn fr_path_matrix<T: Borrow<FrequentedRegion> + Sync>(
    graph: &PangenomicGraph,
    frs: &[T],
) -> Result<Array2<u32>> {
    Ok(path_fr_matrix(graph, frs)?.reversed_axes())
}

fn path_row_name(path: &Path) -> String {
    match path.label() {
        Some(label) => format!("{}.{}", path.name(), label),
        None => path.name().to_string(),
    }
}

/// Writes the path × FR matrix as TSV: a header of FR node sets, then one
/// `sample.label` row per path.
pub fn write_path_fr_matrix_tsv<T: Borrow<FrequentedRegion> + Sync>(
    path: &FsPath,
    graph: &PangenomicGraph,
    frs: &[T],
) -> Result<()> {
    let matrix = path_fr_matrix(graph, frs)?;
    let mut writer = tsv_writer(path)?;
    let mut header = vec!["path".to_string()];
    header.extend(frs.iter().map(|fr| as_fr(fr).nodes().to_string()));
    writer.write_record(&header)?;
    for (p, row) in graph.paths().iter().zip(matrix.rows()) {
        let mut record = vec![path_row_name(p)];
        record.extend(row.iter().map(u32::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the FR × path matrix as TSV: a header of sample names, then one row
/// per FR keyed by its node set.
pub fn write_fr_path_matrix_tsv<T: Borrow<FrequentedRegion> + Sync>(
    path: &FsPath,
    graph: &PangenomicGraph,
    frs: &[T],
) -> Result<()> {
    let matrix = fr_path_matrix(graph, frs)?;
    let mut writer = tsv_writer(path)?;
    let mut header = vec!["nodes".to_string()];
    header.extend(graph.paths().iter().map(path_row_name));
    writer.write_record(&header)?;
    for (fr, row) in frs.iter().zip(matrix.rows()) {
        let mut record = vec![as_fr(fr).nodes().to_string()];
        record.extend(row.iter().map(u32::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes any membership matrix as a `.npy` array.
pub fn write_matrix_npy(path: &FsPath, matrix: &Array2<u32>) -> Result<()> {
    write_npy(path, matrix).map_err(|e| FrError::Npy {
        message: e.to_string(),
    })
}
