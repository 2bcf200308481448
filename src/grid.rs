// 📄 Grid Loader - raw, headerless cell grids from one source file
//
// Releases arrive as .xlsx/.xls workbooks (read with calamine) and, for
// hand-prepared fixtures or re-exports, as headerless .csv files. Either way
// the rest of the pipeline sees the same `RawGrid`: rows x columns of
// untyped cells, no header assumed.

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use crate::error::{IngestError, IngestResult};

// ============================================================================
// CELL
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    /// Classify a raw text value: blank → Empty, plain number → Number
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Trimmed text if this cell holds non-empty text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t)
                }
            }
            _ => None,
        }
    }

    /// Non-empty text that does not read as a number ("12", "1,234.5" are numeric)
    pub fn is_non_numeric_text(&self) -> bool {
        match self.as_text() {
            Some(t) => {
                let stripped: String = t.chars().filter(|c| *c != ',' && *c != ' ').collect();
                stripped.parse::<f64>().is_err()
            }
            None => false,
        }
    }

    /// Render the cell the way it would print in the sheet
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.trim().to_string()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

// ============================================================================
// RAW GRID
// ============================================================================

/// Ordered rows of ordered cells; rows may have different lengths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    rows: Vec<Vec<Cell>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        RawGrid { rows }
    }

    /// Build a grid from text values, classifying each with `Cell::parse`
    pub fn from_text_rows<R, S>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| Cell::parse(s.as_ref())).collect())
            .collect();
        RawGrid { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest row length
    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> &[Cell] {
        self.rows.get(index).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Out-of-range lookups read as an empty cell
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Columns actually used by rows from `start` on
    pub fn data_width_from(&self, start: usize) -> usize {
        self.rows
            .iter()
            .skip(start)
            .map(|r| r.iter().rposition(|c| !c.is_blank()).map_or(0, |p| p + 1))
            .max()
            .unwrap_or(0)
    }
}

/// Populated cells of a row as (column, cell) pairs
pub fn populated(row: &[Cell]) -> impl Iterator<Item = (usize, &Cell)> {
    row.iter().enumerate().filter(|(_, c)| !c.is_blank())
}

// ============================================================================
// GRID SOURCES
// ============================================================================

/// One way of turning a file on disk into a `RawGrid`
pub trait GridSource {
    fn can_load(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> IngestResult<RawGrid>;
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Excel-family workbooks; only the first worksheet is read
pub struct WorkbookSource;

impl GridSource for WorkbookSource {
    fn can_load(&self, path: &Path) -> bool {
        matches!(
            extension_of(path).as_str(),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods"
        )
    }

    fn load(&self, path: &Path) -> IngestResult<RawGrid> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| IngestError::file_read(path, e))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| IngestError::file_read(path, "workbook has no worksheets"))?
            .map_err(|e| IngestError::file_read(path, e))?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();

        Ok(RawGrid::new(rows))
    }
}

/// Headerless CSV, rows may be ragged
pub struct CsvSource;

impl GridSource for CsvSource {
    fn can_load(&self, path: &Path) -> bool {
        extension_of(path) == "csv"
    }

    fn load(&self, path: &Path) -> IngestResult<RawGrid> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| IngestError::file_read(path, e))?;

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IngestError::file_read(path, e))?;

        Ok(RawGrid::from_text_rows(records.iter()))
    }
}

/// True when some grid source can read this file
pub fn is_supported(path: &Path) -> bool {
    WorkbookSource.can_load(path) || CsvSource.can_load(path)
}

/// Load a grid with whichever source handles the file's extension
pub fn load_grid(path: &Path) -> IngestResult<RawGrid> {
    let sources: [&dyn GridSource; 2] = [&WorkbookSource, &CsvSource];

    let source = sources
        .into_iter()
        .find(|s| s.can_load(path))
        .ok_or_else(|| IngestError::file_read(path, "unsupported file type"))?;

    let grid = source.load(path)?;
    tracing::debug!(file = %path.display(), rows = grid.len(), cols = grid.width(), "grid loaded");
    Ok(grid)
}
