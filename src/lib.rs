//! Rust Excel records reader
//!
//! # Status
//!
//! **xlrecords** is a pure Rust library to read the rows of one sheet of an
//! Excel workbook (xls, xlsx, xlsm or xlsb) held in memory, and to hand them
//! out as records keyed by caller-chosen column headers.
//!
//! Formulas are never evaluated, their cached result is used. Error cells
//! read as text holding the Excel literal (`#N/A`, `#DIV/0!`, ...).
//!
//! # Examples
//! ```no_run
//! use xlrecords::{parse, CellValue, HeaderSpec};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("temperature.xlsx")?;
//!
//!     // "label" is looked up in the header row, "1" is the second column
//!     let spec: HeaderSpec = [("label", "label"), ("value", "1")].into_iter().collect();
//!     for record in parse("xlsx", &bytes, &spec, None)? {
//!         if let Some(CellValue::Number(v)) = record.get("value") {
//!             println!("{}: {v}", record.get("label").cloned().unwrap_or_default());
//!         }
//!     }
//!
//!     // the same records, as a self-describing buffer
//!     let buf = xlrecords::dump("xlsx", &bytes, &spec, Some("Sheet1".into()))?;
//!     let records = xlrecords::load(&buf)?;
//!     println!("{} records", records.len());
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

#[macro_use]
mod utils;

mod auto;
mod cfb;
mod datatype;
mod formats;
mod locator;
mod mapper;
mod transport;
mod xls;
mod xlsb;
mod xlsx;

pub mod errors;

use log::{debug, warn};

pub use crate::auto::{FormatTag, Workbook};
pub use crate::cfb::CfbError;
pub use crate::datatype::{CellErrorType, CellValue, ExcelDateTime, ExcelDateTimeType};
pub use crate::errors::{Error, ErrorKind};
pub use crate::locator::{
    Sheet, SheetDirectory, SheetEntry, SheetSelector, SheetType, SheetVisible,
};
pub use crate::mapper::{ColumnSelector, HeaderMapper, HeaderSpec, Record};
pub use crate::xls::{Xls, XlsError};
pub use crate::xlsb::{Xlsb, XlsbCellsReader, XlsbError};
pub use crate::xlsx::{Xlsx, XlsxCellReader, XlsxError};

/// Last valid row of a sheet, 0-based
const MAX_ROW: u32 = 0xF_FFFF;
/// Last valid column of a sheet, 0-based
const MAX_COLUMN: u32 = 0x3FFF;

/// A struct to hold cell position and value
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Position for the cell (row, column)
    pub(crate) pos: (u32, u32),
    /// Value for the cell
    pub(crate) val: CellValue,
}

impl Cell {
    /// Creates a new `Cell`
    pub fn new(position: (u32, u32), value: CellValue) -> Cell {
        Cell {
            pos: position,
            val: value,
        }
    }

    /// Gets `Cell` position
    pub fn get_position(&self) -> (u32, u32) {
        self.pos
    }

    /// Gets `Cell` value
    pub fn get_value(&self) -> &CellValue {
        &self.val
    }
}

/// Row where a table starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderRow {
    /// First row holding a non-empty cell
    #[default]
    FirstNonEmptyRow,
    /// Given 0-based row
    Row(u32),
}

static EMPTY: CellValue = CellValue::Empty;

/// The decoded grid of one sheet
///
/// Rows start at the header row (see [`HeaderRow`]) and stop at the last
/// row holding a value. Column positions are the sheet's own, so row `r`
/// column `c` is column `c` of the sheet whatever the leading empty columns.
/// Rows are not padded: reads past their end give `Empty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetTable {
    start_row: u32,
    rows: Vec<Vec<CellValue>>,
    has_header_row: bool,
}

impl WorksheetTable {
    /// Builds a table out of decoded cells, in any order
    ///
    /// Empty cells are dropped, a cell written twice keeps its last value.
    pub fn from_cells(mut cells: Vec<Cell>, header_row: HeaderRow, has_headers: bool) -> Self {
        cells.retain(|c| {
            if c.pos.0 > MAX_ROW || c.pos.1 > MAX_COLUMN {
                warn!("ignoring cell out of the sheet limits at {:?}", c.pos);
                return false;
            }
            !c.val.is_empty()
        });
        cells.sort_by_key(|c| c.pos);

        let start_row = match header_row {
            HeaderRow::FirstNonEmptyRow => cells.first().map_or(0, |c| c.pos.0),
            HeaderRow::Row(r) => r,
        };
        let end_row = cells.last().map(|c| c.pos.0).filter(|r| *r >= start_row);
        let mut rows = match end_row {
            Some(end) => vec![Vec::new(); (end - start_row + 1) as usize],
            None => Vec::new(),
        };
        for cell in cells.into_iter().filter(|c| c.pos.0 >= start_row) {
            let col = cell.pos.1 as usize;
            if let Some(row) = rows.get_mut((cell.pos.0 - start_row) as usize) {
                if row.len() <= col {
                    row.resize(col + 1, CellValue::Empty);
                }
                row[col] = cell.val;
            }
        }
        debug!(
            "table of {} rows from row {start_row}, header row: {has_headers}",
            rows.len()
        );
        WorksheetTable {
            start_row,
            rows,
            has_header_row: has_headers,
        }
    }

    /// Sheet row of the first table row
    pub fn start_row(&self) -> u32 {
        self.start_row
    }

    /// Whether the first row is a header row
    pub fn has_header_row(&self) -> bool {
        self.has_header_row
    }

    /// All rows, header row included
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of rows, header row included
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Length of the longest row
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// True if no cell has a value
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The header row, if any
    pub fn header(&self) -> Option<&[CellValue]> {
        if self.has_header_row {
            self.rows.first().map(Vec::as_slice)
        } else {
            None
        }
    }

    /// Rows following the header row
    pub fn data_rows(&self) -> &[Vec<CellValue>] {
        if self.has_header_row && !self.rows.is_empty() {
            &self.rows[1..]
        } else {
            &self.rows
        }
    }

    /// Value at a (row, column) position relative to the first table row
    pub fn get(&self, (row, col): (usize, usize)) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Options of a parse call
///
/// # Examples
/// ```
/// use xlrecords::{HeaderRow, ParseOptions};
///
/// let options = ParseOptions::new()
///     .with_sheet("Data")
///     .with_header_row(HeaderRow::Row(2))
///     .with_trim_text(true);
/// assert!(options.has_headers);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ParseOptions {
    /// Sheet to read, the first one when `None`
    pub sheet: Option<SheetSelector>,
    /// Where the table starts
    pub header_row: HeaderRow,
    /// Whether the first table row holds the column names
    pub has_headers: bool,
    /// Trim text values, whitespace-only text becoming `Empty`
    pub trim_text: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            sheet: None,
            header_row: HeaderRow::default(),
            has_headers: true,
            trim_text: false,
        }
    }
}

impl ParseOptions {
    /// Default options: first sheet, header in the first non-empty row
    pub fn new() -> Self {
        ParseOptions::default()
    }

    /// Selects the sheet by name or 0-based ordinal
    pub fn with_sheet<S: Into<SheetSelector>>(mut self, sheet: S) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Sets the row where the table starts
    pub fn with_header_row(mut self, header_row: HeaderRow) -> Self {
        self.header_row = header_row;
        self
    }

    /// Whether the first table row holds the column names
    pub fn with_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Trim text values
    pub fn with_trim_text(mut self, yes: bool) -> Self {
        self.trim_text = yes;
        self
    }
}

/// Decodes one sheet into records keyed by `header_spec`
///
/// `format_tag` is one of `xls`, `xlsx`, `xlsm` or `xlsb`; `sheet` defaults
/// to the first declared sheet.
pub fn parse(
    format_tag: &str,
    bytes: &[u8],
    header_spec: &HeaderSpec,
    sheet: Option<SheetSelector>,
) -> Result<Vec<Record>, Error> {
    let options = ParseOptions {
        sheet,
        ..ParseOptions::default()
    };
    parse_with_options(format_tag, bytes, header_spec, &options)
}

/// [`parse`] with every option
pub fn parse_with_options(
    format_tag: &str,
    bytes: &[u8],
    header_spec: &HeaderSpec,
    options: &ParseOptions,
) -> Result<Vec<Record>, Error> {
    let mut workbook = Workbook::open(format_tag, bytes)?;
    let selector = options.sheet.clone().unwrap_or(SheetSelector::Index(0));
    let table = workbook.worksheet_table(&selector, options)?;
    HeaderMapper::new(header_spec)
        .trim_text(options.trim_text)
        .map(&table)
}

/// Same decoding as [`parse`], serialized into a buffer [`load`] reads back
pub fn dump(
    format_tag: &str,
    bytes: &[u8],
    header_spec: &HeaderSpec,
    sheet: Option<SheetSelector>,
) -> Result<Vec<u8>, Error> {
    transport::to_vec(&parse(format_tag, bytes, header_spec, sheet)?)
}

/// Reads a buffer written by [`dump`]
pub fn load(buf: &[u8]) -> Result<Vec<Record>, Error> {
    transport::from_slice(buf)
}

/// Sheet names in declaration order
pub fn sheet_names(format_tag: &str, bytes: &[u8]) -> Result<Vec<String>, Error> {
    Ok(Workbook::open(format_tag, bytes)?.sheet_names())
}

/// Rows of a sheet as canonical strings, the format being guessed from the
/// bytes
///
/// With `column_names`, the header row resolves the columns and each row
/// holds those columns in order. Without, each row holds every column up to
/// the table width. The header row is never returned.
pub fn rows<S: AsRef<str>>(
    bytes: &[u8],
    sheet_name: &str,
    column_names: &[S],
) -> Result<Vec<Vec<String>>, Error> {
    let format = FormatTag::sniff(bytes)
        .ok_or_else(|| Error::UnsupportedFormat("unrecognized container".to_string()))?;
    let mut workbook = Workbook::from_format(format, bytes)?;
    let table = workbook.worksheet_table(&sheet_name.into(), &ParseOptions::default())?;

    if column_names.is_empty() {
        let width = table.width();
        return Ok(table
            .data_rows()
            .iter()
            .map(|row| {
                (0..width)
                    .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect());
    }

    let spec: HeaderSpec = column_names
        .iter()
        .map(|n| (n.as_ref(), ColumnSelector::Name(n.as_ref().to_string())))
        .collect();
    let records = HeaderMapper::new(&spec).map(&table)?;
    Ok(records
        .iter()
        .map(|r| r.iter().map(|(_, v)| v.to_string()).collect())
        .collect())
}
