//! Reads a preprocessed dataset directory.
//!
//! | file                      | content                                   |
//! |---------------------------|-------------------------------------------|
//! | `X.csv`                   | `cell,<gene...>` dense expression         |
//! | `var.csv`                 | `gene,is_reg,is_target`                   |
//! | `obs.csv` (opt)           | `cell[,dpt_pseudotime]`                   |
//! | `distances.csv`           | `source,target,distance` kNN edges        |
//! | `velocity_transition.csv` | `source,target,weight` (opt)              |
//! | `velocity.csv` (opt)      | same layout as `X.csv`                    |
//! | `uns.json` (opt)          | `{"iroot": <cell index>}`                 |

use crate::adapters::storage::read_optional;
use crate::domain::model::Dataset;
use crate::domain::ports::Storage;
use crate::graph::adjacency::from_triplets;
use crate::utils::error::{LagError, Result};
use nalgebra_sparse::CsrMatrix;
use ndarray::Array2;
use serde::Deserialize;

pub const EXPRESSION_FILE: &str = "X.csv";
pub const VAR_FILE: &str = "var.csv";
pub const OBS_FILE: &str = "obs.csv";
pub const DISTANCES_FILE: &str = "distances.csv";
pub const TRANSITION_FILE: &str = "velocity_transition.csv";
pub const VELOCITY_FILE: &str = "velocity.csv";
pub const UNS_FILE: &str = "uns.json";

/// A cells × genes table with its row and column labels.
#[derive(Debug, Clone)]
pub struct CellMatrix {
    pub cells: Vec<String>,
    pub genes: Vec<String>,
    pub values: Array2<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneAnnotation {
    pub gene: String,
    pub is_reg: bool,
    pub is_target: bool,
}

#[derive(Debug, Deserialize)]
struct VarRow {
    gene: String,
    is_reg: String,
    is_target: String,
}

#[derive(Debug, Deserialize)]
struct EdgeRow {
    source: usize,
    target: usize,
    #[serde(alias = "distance")]
    weight: f32,
}

#[derive(Debug, Default, Deserialize)]
struct Uns {
    iroot: Option<usize>,
}

fn parse_flag(file: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Ok(true),
        "0" | "false" | "f" | "no" | "" => Ok(false),
        other => Err(LagError::dataset(file, format!("'{}' is not a boolean", other))),
    }
}

fn parse_value<T: std::str::FromStr>(file: &str, row: usize, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        LagError::dataset(file, format!("row {}: '{}' is not a number", row + 1, raw))
    })
}

pub fn parse_cell_matrix(file: &str, data: &[u8]) -> Result<CellMatrix> {
    let mut reader = csv::Reader::from_reader(data);
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(LagError::dataset(file, "expected a cell column followed by gene columns"));
    }
    let genes: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut cells = Vec::new();
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(LagError::dataset(
                file,
                format!("row {} has {} fields, expected {}", row + 1, record.len(), headers.len()),
            ));
        }
        cells.push(record[0].to_string());
        for raw in record.iter().skip(1) {
            values.push(parse_value::<f32>(file, row, raw)?);
        }
    }

    let values = Array2::from_shape_vec((cells.len(), genes.len()), values)
        .map_err(|e| LagError::dataset(file, e.to_string()))?;
    Ok(CellMatrix {
        cells,
        genes,
        values,
    })
}

pub fn parse_var(data: &[u8]) -> Result<Vec<GeneAnnotation>> {
    let mut reader = csv::Reader::from_reader(data);
    reader
        .deserialize::<VarRow>()
        .map(|row| {
            let row = row?;
            Ok(GeneAnnotation {
                is_reg: parse_flag(VAR_FILE, &row.is_reg)?,
                is_target: parse_flag(VAR_FILE, &row.is_target)?,
                gene: row.gene,
            })
        })
        .collect()
}

/// Pseudotime column of `obs.csv`, if present.
pub fn parse_pseudotime(data: &[u8], n_cells: usize) -> Result<Option<Vec<f64>>> {
    let mut reader = csv::Reader::from_reader(data);
    let headers = reader.headers()?.clone();
    let Some(column) = headers.iter().position(|h| h == "dpt_pseudotime") else {
        return Ok(None);
    };

    let mut pseudotime = Vec::with_capacity(n_cells);
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let raw = record.get(column).unwrap_or("").trim();
        if raw.is_empty() {
            pseudotime.push(f64::NAN);
        } else {
            pseudotime.push(parse_value::<f64>(OBS_FILE, row, raw)?);
        }
    }
    if pseudotime.len() != n_cells {
        return Err(LagError::dataset(
            OBS_FILE,
            format!("{} rows, expected {} cells", pseudotime.len(), n_cells),
        ));
    }
    Ok(Some(pseudotime))
}

pub fn parse_edges(file: &str, data: &[u8], n_cells: usize) -> Result<CsrMatrix<f32>> {
    let mut reader = csv::Reader::from_reader(data);
    let mut triplets = Vec::new();
    for (row, edge) in reader.deserialize::<EdgeRow>().enumerate() {
        let edge = edge?;
        if edge.source >= n_cells || edge.target >= n_cells {
            return Err(LagError::dataset(
                file,
                format!(
                    "row {}: edge {} -> {} outside of {} cells",
                    row + 1,
                    edge.source,
                    edge.target,
                    n_cells
                ),
            ));
        }
        if !edge.weight.is_finite() {
            return Err(LagError::dataset(file, format!("row {}: weight is not finite", row + 1)));
        }
        triplets.push((edge.source, edge.target, edge.weight));
    }
    from_triplets(n_cells, n_cells, triplets)
}

fn check_gene_order(expression: &CellMatrix, var: &[GeneAnnotation]) -> Result<()> {
    if var.len() != expression.genes.len() {
        return Err(LagError::dataset(
            VAR_FILE,
            format!("{} genes, {} has {}", var.len(), EXPRESSION_FILE, expression.genes.len()),
        ));
    }
    if let Some((i, (a, b))) = var
        .iter()
        .zip(&expression.genes)
        .enumerate()
        .find(|(_, (a, b))| &a.gene != *b)
    {
        return Err(LagError::dataset(
            VAR_FILE,
            format!("gene {} is '{}' but {} column is '{}'", i, a.gene, EXPRESSION_FILE, b),
        ));
    }
    if !var.iter().any(|g| g.is_reg) {
        return Err(LagError::dataset(VAR_FILE, "no gene is marked is_reg"));
    }
    if !var.iter().any(|g| g.is_target) {
        return Err(LagError::dataset(VAR_FILE, "no gene is marked is_target"));
    }
    Ok(())
}

async fn read_required<S: Storage>(storage: &S, dir: &str, file: &str) -> Result<Vec<u8>> {
    read_optional(storage, &format!("{}/{}", dir, file))
        .await?
        .ok_or_else(|| LagError::dataset(file, format!("not found in {}", dir)))
}

/// Load `name` from `dir` (relative to the storage root).
pub async fn load_dataset<S: Storage>(storage: &S, dir: &str, name: &str) -> Result<Dataset> {
    let expression = parse_cell_matrix(
        EXPRESSION_FILE,
        &read_required(storage, dir, EXPRESSION_FILE).await?,
    )?;
    let n_cells = expression.cells.len();
    if n_cells == 0 {
        return Err(LagError::dataset(EXPRESSION_FILE, "no cells"));
    }
    tracing::debug!("Read {} cells × {} genes", n_cells, expression.genes.len());

    let var = parse_var(&read_required(storage, dir, VAR_FILE).await?)?;
    check_gene_order(&expression, &var)?;

    let knn_distances = parse_edges(
        DISTANCES_FILE,
        &read_required(storage, dir, DISTANCES_FILE).await?,
        n_cells,
    )?;

    let pseudotime = match read_optional(storage, &format!("{}/{}", dir, OBS_FILE)).await? {
        Some(data) => parse_pseudotime(&data, n_cells)?,
        None => None,
    };

    let velocity_transition =
        match read_optional(storage, &format!("{}/{}", dir, TRANSITION_FILE)).await? {
            Some(data) => Some(parse_edges(TRANSITION_FILE, &data, n_cells)?),
            None => None,
        };

    let velocity = match read_optional(storage, &format!("{}/{}", dir, VELOCITY_FILE)).await? {
        Some(data) => {
            let v = parse_cell_matrix(VELOCITY_FILE, &data)?;
            if v.values.dim() != expression.values.dim() {
                return Err(LagError::dataset(
                    VELOCITY_FILE,
                    format!(
                        "shape {:?} differs from {} {:?}",
                        v.values.dim(),
                        EXPRESSION_FILE,
                        expression.values.dim()
                    ),
                ));
            }
            Some(v.values)
        }
        None => None,
    };

    let uns: Uns = match read_optional(storage, &format!("{}/{}", dir, UNS_FILE)).await? {
        Some(data) => serde_json::from_slice(&data)?,
        None => Uns::default(),
    };

    let (is_reg, is_target) = var.iter().map(|g| (g.is_reg, g.is_target)).unzip();
    Ok(Dataset {
        name: name.to_string(),
        cell_names: expression.cells,
        gene_names: expression.genes,
        expression: expression.values,
        is_reg,
        is_target,
        pseudotime,
        knn_distances,
        velocity_transition,
        velocity,
        root_cell: uns.iroot,
    })
}
