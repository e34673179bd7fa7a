//! Number format classification, used to tell dates from plain numbers

use std::collections::BTreeMap;

use crate::datatype::{CellValue, ExcelDateTime, ExcelDateTimeType};

/// Cell number format category
///
/// Only the distinction between plain numbers, dates and durations survives
/// decoding; every other styling detail is dropped.
///
/// # References
///
/// - ECMA-376 Part 1, Section 18.8.30 (numFmt)
/// - MS-XLSB Section 2.4.648 (BrtFmt)
/// - MS-XLS Section 2.4.126 (Format)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellFormat {
    /// General number formats, text formats and anything not date-like
    #[default]
    Other,
    /// Date and time format, e.g. "yyyy-mm-dd" or "h:mm:ss AM/PM"
    DateTime,
    /// Elapsed time format, e.g. "[h]:mm:ss"
    TimeDelta,
}

/// Classifies a custom number format code
///
/// Only the first section counts. Quoted literals, escaped characters and
/// bracketed colour or locale tags are not format tokens; an elapsed time
/// bracket (`[h]`, `[mm]`, `[ss]`) makes the format a duration.
pub fn detect_custom_number_format(format: &str) -> CellFormat {
    let mut tokens = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        match c {
            // escape, padding and fill take the next character literally
            '\\' | '_' | '*' => {
                chars.next();
            }
            '"' => {
                chars.by_ref().find(|q| *q == '"');
            }
            '[' => {
                let tag: String = chars.by_ref().take_while(|b| *b != ']').collect();
                if is_elapsed_time(&tag) {
                    return CellFormat::TimeDelta;
                }
            }
            ';' => break,
            c => tokens.push(c.to_ascii_lowercase()),
        }
    }
    if tokens.contains(['d', 'm', 'y', 'h', 's']) || tokens.contains("a/p") {
        CellFormat::DateTime
    } else {
        CellFormat::Other
    }
}

fn is_elapsed_time(tag: &str) -> bool {
    let mut chars = tag.chars().map(|c| c.to_ascii_lowercase());
    match chars.next() {
        Some(first @ ('h' | 'm' | 's')) => chars.all(|c| c == first),
        _ => false,
    }
}

/// Built-in number formats (ECMA-376 18.8.30)
///
/// 14-22: dates and times, 45 `mm:ss`, 46 `[h]:mm:ss`, 47 `mmss.0`.
pub fn builtin_format_by_code(code: u16) -> CellFormat {
    match code {
        14..=22 | 45 | 47 => CellFormat::DateTime,
        46 => CellFormat::TimeDelta,
        _ => CellFormat::Other,
    }
}

/// Resolves the format id referenced by a cell style
///
/// Custom formats declared by the workbook shadow built-in ids.
pub(crate) fn resolve_format(id: u16, custom: &BTreeMap<u16, CellFormat>) -> CellFormat {
    custom
        .get(&id)
        .copied()
        .unwrap_or_else(|| builtin_format_by_code(id))
}

/// Wraps a number into a date when its format says so
pub fn format_excel_f64(value: f64, format: Option<&CellFormat>, is_1904: bool) -> CellValue {
    match format {
        Some(CellFormat::DateTime) => CellValue::DateTime(ExcelDateTime::new(
            value,
            ExcelDateTimeType::DateTime,
            is_1904,
        )),
        Some(CellFormat::TimeDelta) => CellValue::DateTime(ExcelDateTime::new(
            value,
            ExcelDateTimeType::TimeDelta,
            is_1904,
        )),
        _ => CellValue::Number(value),
    }
}

/// Cases partly taken from openpyxl's number style tests
#[test]
fn test_is_date_format() {
    let cases = [
        ("DD/MM/YY", CellFormat::DateTime),
        ("H:MM:SS;@", CellFormat::DateTime),
        ("yyyy-mm-dd", CellFormat::DateTime),
        ("m:mm", CellFormat::DateTime),
        ("h:mm:ss AM/PM", CellFormat::DateTime),
        ("[$-409]h:mm A/P", CellFormat::DateTime),
        ("[h]:mm:ss", CellFormat::TimeDelta),
        ("[mm]", CellFormat::TimeDelta),
        ("[SS].00", CellFormat::TimeDelta),
        ("#,##0\\ [$\\u20bd-46D]", CellFormat::Other),
        ("\"$\"#,##0_);[Red](\"$\"#,##0)", CellFormat::Other),
        ("\\Y000000", CellFormat::Other),
        ("#,##0.0####\" YMD\"", CellFormat::Other),
        ("[>=100][Magenta]General", CellFormat::Other),
        ("0.00E+00", CellFormat::Other),
        ("0.00;[Red]dd", CellFormat::Other),
        ("@", CellFormat::Other),
    ];
    for (format, expected) in cases {
        assert_eq!(detect_custom_number_format(format), expected, "{format}");
    }
}

#[test]
fn test_builtin_formats() {
    assert_eq!(builtin_format_by_code(14), CellFormat::DateTime);
    assert_eq!(builtin_format_by_code(46), CellFormat::TimeDelta);
    assert_eq!(builtin_format_by_code(2), CellFormat::Other);

    let mut custom = BTreeMap::new();
    custom.insert(14, CellFormat::Other);
    custom.insert(164, CellFormat::DateTime);
    assert_eq!(resolve_format(14, &custom), CellFormat::Other);
    assert_eq!(resolve_format(164, &custom), CellFormat::DateTime);
    assert_eq!(resolve_format(15, &custom), CellFormat::DateTime);
}

#[test]
fn test_format_excel_f64() {
    assert_eq!(format_excel_f64(3.5, None, false), CellValue::Number(3.5));
    assert_eq!(
        format_excel_f64(25569., Some(&CellFormat::DateTime), false),
        CellValue::DateTime(ExcelDateTime::new(
            25569.,
            ExcelDateTimeType::DateTime,
            false
        ))
    );
}
