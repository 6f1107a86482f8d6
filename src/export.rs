//! Catalog output: CSV, JSON, or a plain-text table for the terminal.

use crate::model::Category;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Table,
}

/// Errors from the catalog writers.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn create(path: &Path) -> Result<File, ExportError> {
    File::create(path).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write `category_id,category_name` rows with a header. A missing ID is an empty cell.
pub fn write_csv(categories: &[Category], path: &Path) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(create(path)?);
    for c in categories {
        wtr.serialize(c)?;
    }
    if categories.is_empty() {
        wtr.write_record(["category_id", "category_name"])?;
    }
    wtr.flush().map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write the catalog as a pretty-printed JSON array.
pub fn write_json(categories: &[Category], path: &Path) -> Result<(), ExportError> {
    let mut f = create(path)?;
    serde_json::to_writer_pretty(&mut f, categories)?;
    writeln!(f).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Two aligned columns, one row per category, plus a count footer.
pub fn render_table(categories: &[Category]) -> String {
    let ids: Vec<String> = categories
        .iter()
        .map(|c| c.category_id.map(|id| id.to_string()).unwrap_or_default())
        .collect();
    let width = ids
        .iter()
        .map(String::len)
        .chain(std::iter::once("category_id".len()))
        .max()
        .unwrap_or(0);
    let mut out = format!("{:>width$}  category_name\n", "category_id", width = width);
    for (id, c) in ids.iter().zip(categories) {
        out.push_str(&format!("{:>width$}  {}\n", id, c.category_name, width = width));
    }
    out.push_str(&format!("{} categories\n", categories.len()));
    out
}
