//! Loading of the buckling datasets.

use anyhow::{anyhow, Context, Result};
use buckling_gp::{FEATURE_COLUMNS, TARGET_COLUMN};
use clap::ValueEnum;
use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// In-plane load case of the panels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LoadCase {
    /// Axial compression
    #[default]
    Nx,
    /// In-plane shear
    Nxy,
}

impl LoadCase {
    /// Dataset file of the load case, relative to the working directory
    pub fn default_file(&self) -> PathBuf {
        match self {
            LoadCase::Nx => PathBuf::from("data/Nx_stiffened2.csv"),
            LoadCase::Nxy => PathBuf::from("data/Nxy_stiffened.csv"),
        }
    }
}

impl fmt::Display for LoadCase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadCase::Nx => write!(f, "Nx"),
            LoadCase::Nxy => write!(f, "Nxy"),
        }
    }
}

/// Read features and log critical loads from a CSV file with header.
///
/// Columns are looked up by name, others are ignored.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<(Array2<f64>, Array1<f64>)> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column {name} not found in {}", path.display()))
    };
    let feature_idx = FEATURE_COLUMNS
        .iter()
        .map(|name| column(name))
        .collect::<Result<Vec<_>>>()?;
    let target_idx = column(TARGET_COLUMN)?;

    let mut features = Vec::new();
    let mut targets = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or_default();
            raw.parse::<f64>()
                .with_context(|| format!("Bad value {raw:?} at row {} of {}", i + 1, path.display()))
        };
        for &idx in feature_idx.iter() {
            features.push(field(idx)?);
        }
        targets.push(field(target_idx)?);
    }
    let n_rows = targets.len();
    let x = Array2::from_shape_vec((n_rows, FEATURE_COLUMNS.len()), features)?;
    Ok((x, Array1::from_vec(targets)))
}
