use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::Result;
use crate::query::value::Value;

/// One row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// An immutable in-memory table.
///
/// `columns` preserves header order; rows never carry keys outside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Relation {
    /// Builds a relation from explicit columns and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Reads a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        Self::from_csv_reader(reader)
    }

    /// Reads CSV from any reader, inferring one type per column.
    pub fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut raw: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(columns.len(), String::new());
            raw.push(cells);
        }
        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|idx| ColumnKind::infer(raw.iter().map(|cells| cells[idx].as_str())))
            .collect();
        let rows = raw
            .into_iter()
            .map(|cells| {
                columns
                    .iter()
                    .zip(kinds.iter())
                    .zip(cells)
                    .map(|((name, kind), cell)| (name.clone(), kind.convert(cell)))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Header names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the relation holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the relation, returning its parts.
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = ColumnKind::Int;
        let mut seen = false;
        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            seen = true;
            match Value::from_cell(cell) {
                Value::Int(_) => {}
                Value::Float(_) => kind = ColumnKind::Float,
                _ => return ColumnKind::Text,
            }
        }
        if seen {
            kind
        } else {
            ColumnKind::Text
        }
    }

    fn convert(self, cell: String) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match (self, Value::from_cell(trimmed)) {
            (ColumnKind::Int, value @ Value::Int(_)) => value,
            (ColumnKind::Float, Value::Int(v)) => Value::Float(v as f64),
            (ColumnKind::Float, value @ Value::Float(_)) => value,
            _ => Value::String(cell),
        }
    }
}
