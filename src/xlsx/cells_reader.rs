// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

use std::borrow::Cow;
use std::io::{Read, Seek};

use quick_xml::{
    events::{BytesStart, Event},
    name::QName,
};

use super::{parse_reference, read_string, unescape_entity_to_buffer, XlReader};
use crate::{
    datatype::{CellErrorType, CellValue, ExcelDateTime},
    formats::{format_excel_f64, CellFormat},
    Cell, XlsxError,
};

/// An xlsx Cell Iterator
pub struct XlsxCellReader<'a, RS>
where
    RS: Read + Seek,
{
    xml: XlReader<'a, RS>,
    strings: &'a [String],
    formats: &'a [CellFormat],
    is_1904: bool,
    row_index: u32,
    col_index: u32,
    buf: Vec<u8>,
    cell_buf: Vec<u8>,
    value: String,
}

impl<'a, RS> XlsxCellReader<'a, RS>
where
    RS: Read + Seek,
{
    /// Positions the reader on `sheetData`
    pub fn new(
        mut xml: XlReader<'a, RS>,
        strings: &'a [String],
        formats: &'a [CellFormat],
        is_1904: bool,
    ) -> Result<Self, XlsxError> {
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf).map_err(XlsxError::Xml)? {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => break,
                Event::Eof => return Err(XlsxError::UnexpectedNode("sheetData")),
                _ => (),
            }
        }
        Ok(Self {
            xml,
            strings,
            formats,
            is_1904,
            row_index: 0,
            col_index: 0,
            buf: Vec::with_capacity(1024),
            cell_buf: Vec::with_capacity(1024),
            value: String::with_capacity(64),
        })
    }

    /// Next `c` element of the sheet, `None` once `sheetData` is closed
    pub fn next_cell(&mut self) -> Result<Option<Cell>, XlsxError> {
        loop {
            self.buf.clear();
            match self.xml.read_event_into(&mut self.buf) {
                Ok(Event::Start(row_element)) if row_element.local_name().as_ref() == b"row" => {
                    if let Some(r) = row_element.try_get_attribute("r")? {
                        self.row_index = parse_reference(&r.value)?.0;
                    }
                }
                Ok(Event::End(row_element)) if row_element.local_name().as_ref() == b"row" => {
                    self.row_index += 1;
                    self.col_index = 0;
                }
                Ok(Event::Start(c_element)) if c_element.local_name().as_ref() == b"c" => {
                    // Extract all needed attributes in one pass
                    let mut pos_attr = None;
                    let mut style_attr = None;
                    let mut type_attr = None;
                    for a in c_element.attributes() {
                        let a = a.map_err(XlsxError::XmlAttr)?;
                        let Cow::Borrowed(val) = a.value else {
                            continue;
                        };
                        match a.key {
                            QName(b"r") => pos_attr = Some(val),
                            QName(b"s") => style_attr = Some(val),
                            QName(b"t") => type_attr = Some(val),
                            _ => {}
                        }
                    }
                    let pos = if let Some(range) = pos_attr {
                        let (row, col) = parse_reference(range)?;
                        let col = col.ok_or(XlsxError::RangeWithoutColumnComponent)?;
                        self.col_index = col;
                        (row, col)
                    } else {
                        (self.row_index, self.col_index)
                    };
                    let cell_format = self
                        .formats
                        .get(style_attr.map_or(0, |s| atoi_simd::parse::<usize>(s).unwrap_or(0)));
                    let mut value = CellValue::Empty;
                    loop {
                        self.cell_buf.clear();
                        match self.xml.read_event_into(&mut self.cell_buf) {
                            Ok(Event::Start(e)) => {
                                if let Some(v) = read_value(
                                    self.strings,
                                    cell_format,
                                    self.is_1904,
                                    &mut self.xml,
                                    &e,
                                    type_attr,
                                    &mut self.value,
                                )? {
                                    value = v;
                                }
                            }
                            Ok(Event::End(e)) if e.local_name().as_ref() == b"c" => break,
                            Ok(Event::Eof) => return Err(XlsxError::XmlEof("c")),
                            Err(e) => return Err(XlsxError::Xml(e)),
                            _ => (),
                        }
                    }
                    self.col_index += 1;
                    return Ok(Some(Cell::new(pos, value)));
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"sheetData" => {
                    return Ok(None);
                }
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("sheetData")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
    }
}

/// Reads one child of a `c` element
///
/// Formulas (`f`) and unknown children leave the value untouched.
fn read_value<RS>(
    strings: &[String],
    cell_format: Option<&CellFormat>,
    is_1904: bool,
    xml: &mut XlReader<'_, RS>,
    e: &BytesStart<'_>,
    type_attr: Option<&[u8]>,
    value: &mut String,
) -> Result<Option<CellValue>, XlsxError>
where
    RS: Read + Seek,
{
    let mut buf = Vec::new();
    Ok(match e.local_name().as_ref() {
        b"is" => {
            // inlineStr
            Some(read_string(xml, e.name())?.map_or(CellValue::Empty, CellValue::Text))
        }
        b"v" => {
            value.clear();
            loop {
                buf.clear();
                match xml.read_event_into(&mut buf)? {
                    Event::Text(t) => value.push_str(&t.xml10_content()?),
                    Event::GeneralRef(e) => unescape_entity_to_buffer(&e, value)?,
                    Event::End(end) if end.name() == e.name() => break,
                    Event::Eof => return Err(XlsxError::XmlEof("v")),
                    _ => (),
                }
            }
            Some(read_v(value, strings, cell_format, type_attr, is_1904)?)
        }
        _ => {
            // f, extLst
            xml.read_to_end_into(e.name(), &mut buf)?;
            None
        }
    })
}

/// Read the contents of a `<v>` cell according to the `t` attribute
fn read_v(
    v: &mut String,
    strings: &[String],
    cell_format: Option<&CellFormat>,
    type_attr: Option<&[u8]>,
    is_1904: bool,
) -> Result<CellValue, XlsxError> {
    match type_attr {
        Some(b"s") => {
            if v.is_empty() {
                return Ok(CellValue::Empty);
            }
            // Cell value is an index into the shared string table.
            atoi_simd::parse::<usize>(v.trim().as_bytes())
                .ok()
                .and_then(|idx| strings.get(idx))
                .map(|s| CellValue::Text(s.clone()))
                .ok_or_else(|| XlsxError::SstIndex {
                    index: v.clone(),
                    len: strings.len(),
                })
        }
        Some(b"b") => {
            // boolean
            Ok(CellValue::Bool(v.as_str() != "0"))
        }
        Some(b"e") => {
            // error
            v.parse::<CellErrorType>()
                .map(CellValue::from)
                .map_err(XlsxError::CellError)
        }
        Some(b"d") => {
            // ISO 8601 date, kept as text when it cannot be read
            Ok(ExcelDateTime::from_iso(v)
                .map_or_else(|| CellValue::Text(std::mem::take(v)), CellValue::DateTime))
        }
        Some(b"str") => {
            // formula string, empty when nothing was cached
            if v.is_empty() {
                Ok(CellValue::Empty)
            } else {
                Ok(CellValue::Text(std::mem::take(v)))
            }
        }
        Some(b"n") => {
            // n - number
            if v.is_empty() {
                Ok(CellValue::Empty)
            } else {
                fast_float2::parse::<f64, _>(v.as_bytes())
                    .map(|n| format_excel_f64(n, cell_format, is_1904))
                    .map_err(|_| XlsxError::Unrecognized {
                        typ: "number",
                        val: v.clone(),
                    })
            }
        }
        None => {
            // If type is not known, we try to parse as Float for utility, but fall back to
            // String if this fails.
            if v.is_empty() {
                return Ok(CellValue::Empty);
            }
            Ok(fast_float2::parse::<f64, _>(v.as_bytes())
                .map(|n| format_excel_f64(n, cell_format, is_1904))
                .unwrap_or_else(|_| CellValue::Text(std::mem::take(v))))
        }
        Some(b"inlineStr") => {
            // the value lives in `is`, a `v` here is a stale cache
            Ok(CellValue::Text(std::mem::take(v)))
        }
        Some(t) => {
            let t = String::from_utf8_lossy(t).into_owned();
            Err(XlsxError::CellTAttribute(t))
        }
    }
}
