use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

/// https://learn.microsoft.com/en-us/office/troubleshoot/excel/1900-and-1904-date-system
const EXCEL_1900_1904_DIFF: f64 = 1462.;

const MS_MULTIPLIER: f64 = 24f64 * 60f64 * 60f64 * 1e+3f64;

/// A decoded cell value
///
/// Every format decoder produces these values. Formula cells hold their cached
/// result and error cells hold their Excel literal as `Text`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// Empty cell, or a position past the end of a row
    #[default]
    Empty,
    /// Number, stored as in the source
    Number(#[serde(with = "number")] f64),
    /// Boolean
    Bool(bool),
    /// Text
    Text(String),
    /// Number carrying a date, time or duration format
    DateTime(ExcelDateTime),
}

impl CellValue {
    /// Assess if the value is `Empty`
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Try getting a float value
    pub fn get_float(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            CellValue::DateTime(v) => Some(v.as_f64()),
            _ => None,
        }
    }

    /// Try getting a bool value
    pub fn get_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try getting a string value
    pub fn get_string(&self) -> Option<&str> {
        match self {
            CellValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Try getting a datetime value
    pub fn get_datetime(&self) -> Option<ExcelDateTime> {
        match self {
            CellValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Trims text, turning whitespace-only text into `Empty`
    pub(crate) fn trimmed(self) -> CellValue {
        match self {
            CellValue::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    CellValue::Empty
                } else if t.len() == s.len() {
                    CellValue::Text(s)
                } else {
                    CellValue::Text(t.to_string())
                }
            }
            v => v,
        }
    }
}

/// Canonical textual form: numbers without locale formatting, booleans as
/// `true`/`false`, dates as `YYYY-MM-DDTHH:MM:SS[.fff]`, durations as
/// `PTnHnMnS` and empty cells as an empty string
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
            CellValue::DateTime(v) => write!(f, "{v}"),
        }
    }
}

impl PartialEq<&str> for CellValue {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, CellValue::Text(s) if s == other)
    }
}

impl PartialEq<f64> for CellValue {
    fn eq(&self, other: &f64) -> bool {
        matches!(self, CellValue::Number(v) if v == other)
    }
}

impl PartialEq<bool> for CellValue {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, CellValue::Bool(v) if v == other)
    }
}

macro_rules! define_from {
    ($variant:path, $ty:ty) => {
        impl From<$ty> for CellValue {
            fn from(v: $ty) -> Self {
                $variant(v)
            }
        }
    };
}

define_from!(CellValue::Number, f64);
define_from!(CellValue::Text, String);
define_from!(CellValue::Bool, bool);
define_from!(CellValue::DateTime, ExcelDateTime);

impl<'a> From<&'a str> for CellValue {
    fn from(v: &'a str) -> Self {
        CellValue::Text(String::from(v))
    }
}

impl From<CellErrorType> for CellValue {
    fn from(v: CellErrorType) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl<T> From<Option<T>> for CellValue
where
    CellValue: From<T>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => From::from(v),
            None => CellValue::Empty,
        }
    }
}

// https://msdn.microsoft.com/en-us/library/office/ff839168.aspx
/// An enum to represent all different errors that can appear as
/// a value in a worksheet cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellErrorType {
    /// Division by 0 error
    Div0,
    /// Unavailable value error
    NA,
    /// Invalid name error
    Name,
    /// Null value error
    Null,
    /// Number error
    Num,
    /// Invalid cell reference error
    Ref,
    /// Value error
    Value,
    /// Getting data
    GettingData,
}

impl CellErrorType {
    /// Maps a BErr code (MS-XLS 2.5.11, MS-XLSB 2.5.97.2)
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => CellErrorType::Null,
            0x07 => CellErrorType::Div0,
            0x0F => CellErrorType::Value,
            0x17 => CellErrorType::Ref,
            0x1D => CellErrorType::Name,
            0x24 => CellErrorType::Num,
            0x2A => CellErrorType::NA,
            0x2B => CellErrorType::GettingData,
            _ => return None,
        })
    }
}

impl fmt::Display for CellErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CellErrorType::Div0 => write!(f, "#DIV/0!"),
            CellErrorType::NA => write!(f, "#N/A"),
            CellErrorType::Name => write!(f, "#NAME?"),
            CellErrorType::Null => write!(f, "#NULL!"),
            CellErrorType::Num => write!(f, "#NUM!"),
            CellErrorType::Ref => write!(f, "#REF!"),
            CellErrorType::Value => write!(f, "#VALUE!"),
            CellErrorType::GettingData => write!(f, "#DATA!"),
        }
    }
}

impl FromStr for CellErrorType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "#DIV/0!" => Ok(CellErrorType::Div0),
            "#N/A" => Ok(CellErrorType::NA),
            "#NAME?" => Ok(CellErrorType::Name),
            "#NULL!" => Ok(CellErrorType::Null),
            "#NUM!" => Ok(CellErrorType::Num),
            "#REF!" => Ok(CellErrorType::Ref),
            "#VALUE!" => Ok(CellErrorType::Value),
            "#DATA!" | "#GETTING_DATA" => Ok(CellErrorType::GettingData),
            _ => Err(s.to_string()),
        }
    }
}

/// Excel datetime type. Possible: date, time, datetime, duration.
/// At this time we can only determine datetime (date and time are datetime too) and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcelDateTimeType {
    /// DateTime
    DateTime,
    /// TimeDelta (Duration)
    TimeDelta,
}

/// Structure for Excel date and time representation.
///
/// The serial value is kept as stored, together with the date system of the
/// workbook it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExcelDateTime {
    #[serde(with = "number")]
    value: f64,
    datetime_type: ExcelDateTimeType,
    is_1904: bool,
}

impl ExcelDateTime {
    /// Creates a new `ExcelDateTime`
    pub fn new(value: f64, datetime_type: ExcelDateTimeType, is_1904: bool) -> Self {
        ExcelDateTime {
            value,
            datetime_type,
            is_1904,
        }
    }

    /// Builds a 1900-system serial from an ISO 8601 date, time or datetime
    /// (cells of type `d` in xlsx)
    pub fn from_iso(s: &str) -> Option<Self> {
        let s = s.trim();
        let epoch = excel_epoch()?;
        let value = if let Ok(dt) = NaiveDateTime::from_str(s) {
            serial_from_datetime(epoch, dt)?
        } else if let Ok(d) = NaiveDate::from_str(s) {
            serial_from_datetime(epoch, d.and_time(NaiveTime::MIN))?
        } else if let Ok(t) = NaiveTime::from_str(s) {
            t.num_seconds_from_midnight() as f64 / 86_400.
                + t.nanosecond() as f64 / (MS_MULTIPLIER * 1e6)
        } else {
            return None;
        };
        Some(ExcelDateTime::new(value, ExcelDateTimeType::DateTime, false))
    }

    /// True if excel datetime has duration format ([hh]:mm:ss, for example)
    pub fn is_duration(&self) -> bool {
        matches!(self.datetime_type, ExcelDateTimeType::TimeDelta)
    }

    /// True if excel datetime has datetime format (not duration)
    pub fn is_datetime(&self) -> bool {
        matches!(self.datetime_type, ExcelDateTimeType::DateTime)
    }

    /// True if the serial counts from the 1904 epoch
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// Converting data type into a float
    pub fn as_f64(&self) -> f64 {
        self.value
    }

    /// Try converting data type into a duration
    pub fn as_duration(&self) -> Option<TimeDelta> {
        let ms = self.value * MS_MULTIPLIER;
        TimeDelta::try_milliseconds(ms.round() as i64)
    }

    /// Try converting data type into a datetime
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        let f = if self.is_1904 {
            self.value + EXCEL_1900_1904_DIFF
        } else {
            self.value
        };
        let f = if f >= 60.0 { f } else { f + 1.0 };
        let ms = f * MS_MULTIPLIER;
        let excel_duration = TimeDelta::try_milliseconds(ms.round() as i64)?;
        excel_epoch()?.checked_add_signed(excel_duration)
    }
}

impl Default for ExcelDateTime {
    fn default() -> Self {
        ExcelDateTime {
            value: 0.,
            datetime_type: ExcelDateTimeType::DateTime,
            is_1904: false,
        }
    }
}

impl fmt::Display for ExcelDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_duration() {
            if let Some(d) = self.as_duration() {
                let ms = d.num_milliseconds();
                let sign = if ms < 0 { "-" } else { "" };
                let ms = ms.unsigned_abs();
                let (h, m, s, frac) = (
                    ms / 3_600_000,
                    ms / 60_000 % 60,
                    ms / 1000 % 60,
                    ms % 1000,
                );
                return if frac == 0 {
                    write!(f, "{sign}PT{h}H{m}M{s}S")
                } else {
                    write!(f, "{sign}PT{h}H{m}M{s}.{frac:03}S")
                };
            }
        } else if let Some(dt) = self.as_datetime() {
            let fmt = if dt.nanosecond() == 0 {
                "%Y-%m-%dT%H:%M:%S"
            } else {
                "%Y-%m-%dT%H:%M:%S%.3f"
            };
            return write!(f, "{}", dt.format(fmt));
        }
        write!(f, "{}", self.value)
    }
}

fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30).map(|d| d.and_time(NaiveTime::MIN))
}

fn serial_from_datetime(epoch: NaiveDateTime, dt: NaiveDateTime) -> Option<f64> {
    let ms = dt.signed_duration_since(epoch).num_milliseconds() as f64;
    let f = ms / MS_MULTIPLIER;
    // inverse of the Lotus 1-2-3 leap year shift applied by `as_datetime`
    if f < 61.0 && f >= 1.0 {
        Some(f - 1.0)
    } else {
        Some(f)
    }
}

/// Serde adapter keeping non-finite numbers lossless in text formats
mod number {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else if v.is_nan() {
            s.serialize_str("NaN")
        } else if v.is_sign_positive() {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        struct NumberVisitor;

        impl Visitor<'_> for NumberVisitor {
            type Value = f64;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a number, \"NaN\", \"inf\" or \"-inf\"")
            }

            fn visit_f64<E>(self, v: f64) -> Result<f64, E> {
                Ok(v)
            }

            fn visit_i64<E>(self, v: i64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_u64<E>(self, v: u64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
                match v {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }
        }

        d.deserialize_any(NumberVisitor)
    }
}
