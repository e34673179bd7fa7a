//! Projection of worksheet rows into keyed records

use std::fmt;

use log::debug;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::datatype::CellValue;
use crate::errors::Error;
use crate::WorksheetTable;

/// Designates a source column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnSelector {
    /// Header cell text, matched after trimming and ignoring case
    Name(String),
    /// 0-based column position
    Position(usize),
}

impl From<usize> for ColumnSelector {
    fn from(p: usize) -> Self {
        ColumnSelector::Position(p)
    }
}

/// Strings made of ASCII digits only are positions
impl From<&str> for ColumnSelector {
    fn from(s: &str) -> Self {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(p) = atoi_simd::parse::<usize>(s.as_bytes()) {
                return ColumnSelector::Position(p);
            }
        }
        ColumnSelector::Name(s.to_string())
    }
}

impl From<String> for ColumnSelector {
    fn from(s: String) -> Self {
        match ColumnSelector::from(s.as_str()) {
            ColumnSelector::Name(_) => ColumnSelector::Name(s),
            p => p,
        }
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Name(n) => f.write_str(n),
            ColumnSelector::Position(p) => write!(f, "{p}"),
        }
    }
}

/// Ordered `(output key, column)` pairs
///
/// # Examples
/// ```
/// use xlrecords::{ColumnSelector, HeaderSpec};
///
/// let spec: HeaderSpec = [("id", "0"), ("label", "Label")].into_iter().collect();
/// let columns: Vec<_> = spec.iter().map(|(_, c)| c.clone()).collect();
/// assert_eq!(
///     columns,
///     [ColumnSelector::Position(0), ColumnSelector::Name("Label".to_string())]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSpec {
    columns: Vec<(String, ColumnSelector)>,
}

impl HeaderSpec {
    /// Creates an empty spec
    pub fn new() -> Self {
        HeaderSpec::default()
    }

    /// Appends a column
    pub fn column<K: Into<String>, S: Into<ColumnSelector>>(mut self, key: K, selector: S) -> Self {
        self.columns.push((key.into(), selector.into()));
        self
    }

    /// Pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnSelector)> {
        self.columns.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Number of output keys
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if no column is requested
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, S: Into<ColumnSelector>> FromIterator<(K, S)> for HeaderSpec {
    fn from_iter<I: IntoIterator<Item = (K, S)>>(iter: I) -> Self {
        HeaderSpec {
            columns: iter
                .into_iter()
                .map(|(k, s)| (k.into(), s.into()))
                .collect(),
        }
    }
}

/// One data row keyed by the header spec
///
/// Fields keep the order of the spec, including repeated keys. It serializes
/// as a map in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, CellValue)>,
}

impl Record {
    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for a record of an empty spec
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Owned fields
    pub fn into_fields(self) -> Vec<(String, CellValue)> {
        self.fields
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of cell values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, CellValue>()? {
                    fields.push((k, v));
                }
                Ok(Record { fields })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Resolves a `HeaderSpec` against a table and builds its records
pub struct HeaderMapper<'a> {
    spec: &'a HeaderSpec,
    trim_text: bool,
}

impl<'a> HeaderMapper<'a> {
    /// Creates a mapper, text is kept verbatim
    pub fn new(spec: &'a HeaderSpec) -> Self {
        HeaderMapper {
            spec,
            trim_text: false,
        }
    }

    /// Trim text values, whitespace-only text becoming `Empty`
    pub fn trim_text(mut self, yes: bool) -> Self {
        self.trim_text = yes;
        self
    }

    /// Column position of every spec entry
    ///
    /// Name selectors need a header row; the first matching header cell wins
    /// and empty header cells never match.
    pub fn resolve(&self, table: &WorksheetTable) -> Result<Vec<usize>, Error> {
        let header = table.header();
        self.spec
            .iter()
            .map(|(_, selector)| match selector {
                ColumnSelector::Position(p) => Ok(*p),
                ColumnSelector::Name(name) => {
                    let wanted = name.trim().to_lowercase();
                    header
                        .filter(|_| !wanted.is_empty())
                        .and_then(|row| {
                            row.iter().position(|cell| {
                                !cell.is_empty() && cell.to_string().trim().to_lowercase() == wanted
                            })
                        })
                        .ok_or_else(|| Error::HeaderNotFound(name.clone()))
                }
            })
            .collect()
    }

    /// One record per data row, in table order
    pub fn map(&self, table: &WorksheetTable) -> Result<Vec<Record>, Error> {
        let positions = self.resolve(table)?;
        debug!("header spec resolved to columns {positions:?}");
        let records: Vec<Record> = table
            .data_rows()
            .iter()
            .map(|row| {
                self.spec
                    .iter()
                    .zip(&positions)
                    .map(|((key, _), &p)| {
                        let value = row.get(p).cloned().unwrap_or_default();
                        let value = if self.trim_text {
                            value.trimmed()
                        } else {
                            value
                        };
                        (key.to_string(), value)
                    })
                    .collect::<Record>()
            })
            .collect();
        Ok(records)
    }
}
