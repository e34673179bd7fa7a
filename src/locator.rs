//! Sheet directory of a workbook and sheet selection

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Type of sheet
///
/// <https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-xls/b9ec509a-235d-424e-871d-f8e721106501>
/// <https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-xlsb/1edadf56-b5cd-4109-abe7-76651bbe2722>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetType {
    /// WorkSheet
    WorkSheet,
    /// DialogSheet
    DialogSheet,
    /// MacroSheet
    MacroSheet,
    /// ChartSheet
    ChartSheet,
    /// VBA module
    Vba,
}

/// Type of visible sheet
///
/// <https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-xlsb/74cb1d22-b931-4bf8-997d-17517e2416e9>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetVisible {
    /// Visible
    Visible,
    /// Hidden
    Hidden,
    /// The sheet is hidden and cannot be displayed using the user interface
    VeryHidden,
}

/// Metadata of sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    /// Name
    pub name: String,
    /// Type
    pub typ: SheetType,
    /// Visible
    pub visible: SheetVisible,
}

/// A sheet as declared by the container manifest
///
/// `R` is what the decoder needs to find the sheet data again: a stream
/// offset for xls, a zip part path for xlsx and xlsb.
#[derive(Debug, Clone)]
pub struct SheetEntry<R> {
    /// Sheet metadata
    pub sheet: Sheet,
    pub(crate) reference: R,
}

/// How the caller designates a sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetSelector {
    /// 0-based ordinal, in declaration order
    Index(usize),
    /// Exact, case-sensitive name
    Name(String),
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(i) => write!(f, "#{i}"),
            SheetSelector::Name(n) => write!(f, "'{n}'"),
        }
    }
}

impl From<usize> for SheetSelector {
    fn from(i: usize) -> Self {
        SheetSelector::Index(i)
    }
}

impl From<&str> for SheetSelector {
    fn from(n: &str) -> Self {
        SheetSelector::Name(n.to_string())
    }
}

impl From<String> for SheetSelector {
    fn from(n: String) -> Self {
        SheetSelector::Name(n)
    }
}

/// Ordered list of the sheets of one container
#[derive(Debug, Clone)]
pub struct SheetDirectory<R> {
    entries: Vec<SheetEntry<R>>,
}

impl<R> Default for SheetDirectory<R> {
    fn default() -> Self {
        SheetDirectory {
            entries: Vec::new(),
        }
    }
}

impl<R> SheetDirectory<R> {
    pub(crate) fn push(&mut self, entry: SheetEntry<R>) {
        if self.entries.iter().any(|e| e.sheet.name == entry.sheet.name) {
            warn!(
                "duplicate sheet name '{}', only the first one can be selected by name",
                entry.sheet.name
            );
        }
        self.entries.push(entry);
    }

    /// Number of declared sheets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the container declares no sheet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order
    pub fn entries(&self) -> &[SheetEntry<R>] {
        &self.entries
    }

    /// Sheet names in declaration order
    pub fn sheet_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.sheet.name.clone()).collect()
    }

    /// Sheet metadata in declaration order
    pub fn sheets(&self) -> Vec<Sheet> {
        self.entries.iter().map(|e| e.sheet.clone()).collect()
    }

    /// Resolves a selector against the directory
    ///
    /// Names must match exactly, the first declared sheet wins on duplicates.
    pub fn locate(&self, selector: &SheetSelector) -> Result<&SheetEntry<R>, Error> {
        let found = match selector {
            SheetSelector::Index(i) => self.entries.get(*i),
            SheetSelector::Name(n) => self.entries.iter().find(|e| &e.sheet.name == n),
        };
        found.ok_or_else(|| Error::SheetNotFound(selector.clone()))
    }
}
