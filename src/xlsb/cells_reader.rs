use std::io::{Read, Seek};

use log::trace;

use crate::{
    datatype::{CellErrorType, CellValue},
    formats::{format_excel_f64, CellFormat},
    utils::{read_f64, read_u32, read_usize, rk_number},
    Cell, XlsbError,
};

use super::{check_len, wide_str, RecordIter};

/// Last valid row of a sheet, 0-based
const MAX_ROW: u32 = 0xF_FFFF;

/// A cells reader for xlsb files
pub struct XlsbCellsReader<'a, RS>
where
    RS: Read + Seek,
{
    iter: RecordIter<'a, RS>,
    formats: &'a [CellFormat],
    strings: &'a [String],
    row: u32,
    is_1904: bool,
    done: bool,
    buf: Vec<u8>,
}

impl<'a, RS> XlsbCellsReader<'a, RS>
where
    RS: Read + Seek,
{
    /// Given a *Brt*Cell* record buffer return the referenced
    /// `CellFormat`, if any.
    #[inline]
    fn format_from_buf(&self, buf: &[u8]) -> Option<&'a CellFormat> {
        // iStyleRef is stored in the low-order 24 bits starting at byte 4
        // of every cell record (MS-XLSB 2.5.9)
        if buf.len() < 7 {
            return None;
        }
        let idx = u32::from_le_bytes([buf[4], buf[5], buf[6], 0]) as usize;
        self.formats.get(idx)
    }

    pub(crate) fn new(
        mut iter: RecordIter<'a, RS>,
        formats: &'a [CellFormat],
        strings: &'a [String],
        is_1904: bool,
    ) -> Result<Self, XlsbError> {
        let mut buf = Vec::with_capacity(1024);
        loop {
            match iter.next_record(&mut buf)? {
                Some(0x0091) => break, // BrtBeginSheetData
                Some(typ) => trace!("skipping sheet record {typ:#06X}"),
                None => return Err(XlsbError::UnexpectedEof("BrtBeginSheetData")),
            }
        }
        Ok(XlsbCellsReader {
            iter,
            formats,
            strings,
            is_1904,
            row: 0,
            done: false,
            buf,
        })
    }

    /// Next cell record, `None` at `BrtEndSheetData`
    pub fn next_cell(&mut self) -> Result<Option<Cell>, XlsbError> {
        if self.done {
            return Ok(None);
        }
        loop {
            let Some(typ) = self.iter.next_record(&mut self.buf)? else {
                return Err(XlsbError::UnexpectedEof("BrtEndSheetData"));
            };
            let buf = &self.buf;
            let value = match typ {
                // 0x0001 BrtCellBlank, no value to report
                0x0002 => {
                    // BrtCellRk MS-XLSB 2.5.122
                    check_len(typ, buf, 12)?;
                    let v = rk_number(read_u32(&buf[8..12]));
                    format_excel_f64(v, self.format_from_buf(buf), self.is_1904)
                }
                0x0003 | 0x000B => {
                    // BrtCellError, BrtFmlaError
                    check_len(typ, buf, 9)?;
                    CellErrorType::from_code(buf[8])
                        .map(CellValue::from)
                        .ok_or(XlsbError::CellError(buf[8]))?
                }
                0x0004 | 0x000A => {
                    // BrtCellBool, BrtFmlaBool
                    check_len(typ, buf, 9)?;
                    CellValue::Bool(buf[8] != 0)
                }
                0x0005 | 0x0009 => {
                    // BrtCellReal, BrtFmlaNum
                    check_len(typ, buf, 16)?;
                    let v = read_f64(&buf[8..16]);
                    format_excel_f64(v, self.format_from_buf(buf), self.is_1904)
                }
                0x0006 | 0x0008 => {
                    // BrtCellSt, BrtFmlaString
                    check_len(typ, buf, 12)?;
                    let s = wide_str(&buf[8..], &mut 0)?;
                    if typ == 0x0008 && s.is_empty() {
                        // formula without a cached result
                        CellValue::Empty
                    } else {
                        CellValue::Text(s.into_owned())
                    }
                }
                0x003E => {
                    // BrtCellRString, formatting runs are ignored
                    check_len(typ, buf, 13)?;
                    CellValue::Text(wide_str(&buf[9..], &mut 0)?.into_owned())
                }
                0x0007 => {
                    // BrtCellIsst
                    check_len(typ, buf, 12)?;
                    let isst = read_usize(&buf[8..12]);
                    let s = self.strings.get(isst).ok_or(XlsbError::SstIndex {
                        index: isst,
                        len: self.strings.len(),
                    })?;
                    CellValue::Text(s.clone())
                }
                0x0000 => {
                    // BrtRowHdr
                    check_len(typ, buf, 4)?;
                    let row = read_u32(buf);
                    if row > MAX_ROW {
                        return Err(XlsbError::InvalidRow(row));
                    }
                    self.row = row;
                    continue;
                }
                0x0092 => {
                    // BrtEndSheetData
                    self.done = true;
                    return Ok(None);
                }
                t => {
                    trace!("skipping sheet record {t:#06X}");
                    continue;
                }
            };
            let col = read_u32(buf);
            return Ok(Some(Cell::new((self.row, col), value)));
        }
    }
}
