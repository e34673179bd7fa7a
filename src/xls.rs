//! Legacy Excel 97-2003 workbooks (BIFF8, BIFF5 tolerated) stored in a
//! compound file

use std::borrow::Cow;
use std::cmp::min;
use std::collections::BTreeMap;
use std::fmt;

use encoding_rs::{Encoding, UTF_16LE};
use log::{debug, trace, warn};

use crate::cfb::{Cfb, CfbError};
use crate::datatype::{CellErrorType, CellValue};
use crate::formats::{detect_custom_number_format, format_excel_f64, resolve_format, CellFormat};
use crate::locator::{Sheet, SheetDirectory, SheetEntry, SheetType, SheetVisible};
use crate::utils::{read_f64, read_u16, read_u32, read_usize, rk_number};
use crate::{Cell, ParseOptions, WorksheetTable};

/// An enum to handle Xls specific errors
#[derive(Debug)]
pub enum XlsError {
    /// Compound file error
    Cfb(CfbError),

    /// Unexpected record in place of the expected one
    Mismatch {
        /// expected
        expected: &'static str,
        /// found
        found: u16,
    },
    /// Record payload shorter than its fixed part, or fewer shared
    /// strings than declared
    Len {
        /// expected length
        expected: usize,
        /// found length
        found: usize,
        /// record type
        typ: &'static str,
    },
    /// Unrecognized value
    Unrecognized {
        /// value type
        typ: &'static str,
        /// value found
        val: u8,
    },
    /// Continue records run out in the middle of a string
    ContinueRecordTooShort,
    /// End of stream
    EoStream(&'static str),
    /// Shared string index out of the SST
    SstIndex {
        /// index found in the cell
        index: usize,
        /// number of shared strings
        len: usize,
    },
    /// Codepage without a known encoding
    CodePageNotFound(u16),
    /// BOUNDSHEET position outside of the workbook stream
    SheetPosition(usize),
    /// Workbook is password protected
    Password,
}

from_err!(CfbError, XlsError, Cfb);

impl fmt::Display for XlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XlsError::Cfb(e) => write!(f, "Cfb error: {e}"),
            XlsError::Mismatch { expected, found } => {
                write!(f, "Expecting {expected}, found {found:X}")
            }
            XlsError::Len {
                expected,
                found,
                typ,
            } => write!(
                f,
                "Invalid {typ} length, expected at least {expected}, found {found}",
            ),
            XlsError::Unrecognized { typ, val } => write!(f, "Unrecognized {typ}: 0x{val:0X}"),
            XlsError::ContinueRecordTooShort => write!(
                f,
                "Continued record too short while reading extended string"
            ),
            XlsError::EoStream(s) => write!(f, "End of stream '{s}'"),
            XlsError::SstIndex { index, len } => write!(
                f,
                "Shared string index {index} out of range ({len} strings)"
            ),
            XlsError::CodePageNotFound(e) => write!(f, "Codepage not found: {e}"),
            XlsError::SheetPosition(p) => {
                write!(f, "Sheet substream position {p} is outside of the workbook stream")
            }
            XlsError::Password => write!(f, "Workbook is password protected"),
        }
    }
}

impl std::error::Error for XlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsError::Cfb(e) => Some(e),
            _ => None,
        }
    }
}

/// BIFF version of the workbook stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Biff {
    Biff5,
    Biff8,
}

/// A struct representing an old xls format file (CFB)
pub struct Xls {
    stream: Vec<u8>,
    directory: SheetDirectory<usize>,
    strings: Vec<String>,
    /// Number format category of every XF, indexed like cells reference them
    formats: Vec<CellFormat>,
    is_1904: bool,
    biff: Biff,
    encoding: XlsEncoding,
}

impl Xls {
    /// Opens a workbook held in memory
    ///
    /// The globals substream (sheets, shared strings, formats) is read
    /// entirely, sheets are decoded on demand.
    pub fn new(data: &[u8]) -> Result<Self, XlsError> {
        let cfb = Cfb::new(data)?;
        debug!("cfb loaded");
        let stream = match cfb.get_stream("Workbook") {
            Ok(s) => s,
            Err(CfbError::StreamNotFound(_)) => cfb.get_stream("Book")?,
            Err(e) => return Err(e.into()),
        };
        debug!("workbook stream loaded, {} bytes", stream.len());

        let mut xls = Xls {
            stream,
            directory: SheetDirectory::default(),
            strings: Vec::new(),
            formats: Vec::new(),
            is_1904: false,
            biff: Biff::Biff8,
            encoding: XlsEncoding::from_codepage(1200)?,
        };
        xls.parse_workbook()?;
        Ok(xls)
    }

    /// Sheets declared by the workbook, in BOUNDSHEET order
    pub fn directory(&self) -> &SheetDirectory<usize> {
        &self.directory
    }

    /// Reads one located sheet into a table
    pub fn worksheet_table(
        &self,
        entry: &SheetEntry<usize>,
        options: &ParseOptions,
    ) -> Result<WorksheetTable, XlsError> {
        let cells = if entry.sheet.typ == SheetType::WorkSheet {
            self.worksheet_cells(entry.reference)?
        } else {
            debug!("'{}' is a {:?}, no cells", entry.sheet.name, entry.sheet.typ);
            Vec::new()
        };
        Ok(WorksheetTable::from_cells(
            cells,
            options.header_row,
            options.has_headers,
        ))
    }

    fn parse_workbook(&mut self) -> Result<(), XlsError> {
        let mut custom_formats = BTreeMap::new();
        let mut xfs = Vec::new();
        let mut sheets = Vec::new();
        let mut records = RecordIter {
            stream: &self.stream,
        };

        match records.next() {
            Some(Ok(r)) if r.typ == 0x0809 => {
                check_len("BOF", r.data, 4)?;
                self.biff = match read_u16(r.data) {
                    0x0500 => Biff::Biff5,
                    0x0600 => Biff::Biff8,
                    v => {
                        return Err(XlsError::Unrecognized {
                            typ: "BOF:vers",
                            val: (v >> 8) as u8,
                        })
                    }
                };
                let dt = read_u16(&r.data[2..]);
                if dt != 0x0005 {
                    return Err(XlsError::Mismatch {
                        expected: "workbook globals BOF",
                        found: dt,
                    });
                }
            }
            Some(Ok(r)) => {
                return Err(XlsError::Mismatch {
                    expected: "BOF",
                    found: r.typ,
                })
            }
            Some(Err(e)) => return Err(e),
            None => return Err(XlsError::EoStream("workbook globals")),
        }
        if self.biff == Biff::Biff5 {
            // 8-bit strings until a CODEPAGE says otherwise
            self.encoding = XlsEncoding::from_codepage(1252)?;
        }
        debug!("globals substream, {:?}", self.biff);

        let mut eof = false;
        for record in records.by_ref() {
            let mut r = record?;
            match r.typ {
                0x002F => return Err(XlsError::Password), // FilePass
                0x0022 => {
                    // DateMode
                    check_len("DATEMODE", r.data, 2)?;
                    self.is_1904 = read_u16(r.data) == 1;
                }
                0x0042 => {
                    // CodePage
                    check_len("CODEPAGE", r.data, 2)?;
                    let codepage = read_u16(r.data);
                    if self.biff == Biff::Biff5 {
                        self.encoding = XlsEncoding::from_codepage(codepage)?;
                    }
                }
                0x041E => {
                    // Format
                    check_len("FORMAT", r.data, 3)?;
                    let ifmt = read_u16(r.data);
                    r.data = &r.data[2..];
                    let code = match self.biff {
                        Biff::Biff8 => read_unicode_string(&mut r, &self.encoding, 2)?,
                        Biff::Biff5 => read_byte_string(r.data, &self.encoding)?,
                    };
                    trace!("custom format {ifmt}: {code}");
                    custom_formats.insert(ifmt, detect_custom_number_format(&code));
                }
                0x00E0 => {
                    // XF
                    check_len("XF", r.data, 4)?;
                    xfs.push(read_u16(&r.data[2..]));
                }
                0x0085 => sheets.push(self.parse_sheet_name(&mut r)?), // BoundSheet8
                0x00FC => self.strings = parse_sst(&mut r, &self.encoding)?, // SST
                0x000A => {
                    // EOF
                    eof = true;
                    break;
                }
                _ => (),
            }
        }
        if !eof {
            return Err(XlsError::EoStream("workbook globals"));
        }

        self.formats = xfs
            .into_iter()
            .map(|ifmt| resolve_format(ifmt, &custom_formats))
            .collect();
        for entry in sheets {
            self.directory.push(entry);
        }
        debug!(
            "{} sheets, {} shared strings, {} xfs",
            self.directory.len(),
            self.strings.len(),
            self.formats.len()
        );
        Ok(())
    }

    /// BoundSheet8 (MS-XLS 2.4.28)
    fn parse_sheet_name(&self, r: &mut Record<'_>) -> Result<SheetEntry<usize>, XlsError> {
        check_len("BOUNDSHEET", r.data, 7)?;
        let pos = read_usize(r.data);
        let visible = match r.data[4] & 0x03 {
            0x00 => SheetVisible::Visible,
            0x01 => SheetVisible::Hidden,
            0x02 => SheetVisible::VeryHidden,
            e => {
                return Err(XlsError::Unrecognized {
                    typ: "BoundSheet8:hsState",
                    val: e,
                })
            }
        };
        let typ = match r.data[5] {
            0x00 => SheetType::WorkSheet,
            0x01 => SheetType::MacroSheet,
            0x02 => SheetType::ChartSheet,
            0x06 => SheetType::Vba,
            e => {
                return Err(XlsError::Unrecognized {
                    typ: "BoundSheet8:dt",
                    val: e,
                })
            }
        };
        r.data = &r.data[6..];
        let name = match self.biff {
            Biff::Biff8 => read_unicode_string(r, &self.encoding, 1)?,
            Biff::Biff5 => read_byte_string(r.data, &self.encoding)?,
        };
        Ok(SheetEntry {
            sheet: Sheet { name, typ, visible },
            reference: pos,
        })
    }

    /// Decodes the cell records of the substream starting at `pos`
    fn worksheet_cells(&self, pos: usize) -> Result<Vec<Cell>, XlsError> {
        let stream = self
            .stream
            .get(pos..)
            .filter(|s| !s.is_empty())
            .ok_or(XlsError::SheetPosition(pos))?;
        let mut records = RecordIter { stream };

        match records.next() {
            Some(Ok(r)) if r.typ == 0x0809 => {
                check_len("BOF", r.data, 4)?;
                let dt = read_u16(&r.data[2..]);
                if dt != 0x0010 {
                    debug!("substream at {pos} is not a worksheet ({dt:#06x})");
                    return Ok(Vec::new());
                }
            }
            Some(Ok(r)) => {
                return Err(XlsError::Mismatch {
                    expected: "BOF",
                    found: r.typ,
                })
            }
            Some(Err(e)) => return Err(e),
            None => return Err(XlsError::EoStream("worksheet")),
        }

        let mut cells = Vec::new();
        // FORMULA whose cached string comes in the next STRING record
        let mut pending_string: Option<(u32, u32)> = None;
        let mut eof = false;
        for record in records {
            let mut r = record?;
            match r.typ {
                0x0203 => cells.push(self.parse_number(r.data)?), // Number
                0x027E => cells.push(self.parse_rk(r.data)?),     // RK
                0x00BD => self.parse_mul_rk(r.data, &mut cells)?, // MulRk
                0x00FD => cells.push(self.parse_label_sst(r.data)?), // LabelSst
                0x0204 => cells.push(self.parse_label(&mut r)?),  // Label
                0x0205 => cells.push(parse_bool_err(r.data)?),    // BoolErr
                0x0201 | 0x00BE => trace!("blank record {:#06x}", r.typ), // Blank, MulBlank
                0x0006 => {
                    // Formula
                    if let Some(pos) = pending_string.take() {
                        warn!("formula at {pos:?} has no STRING record, using an empty value");
                    }
                    match self.parse_formula(r.data)? {
                        FormulaValue::Value(cell) => cells.push(cell),
                        FormulaValue::String(pos) => pending_string = Some(pos),
                        FormulaValue::Empty => (),
                    }
                }
                0x0207 => {
                    // String
                    if let Some(pos) = pending_string.take() {
                        let s = match self.biff {
                            Biff::Biff8 => read_unicode_string(&mut r, &self.encoding, 2)?,
                            Biff::Biff5 => {
                                check_len("STRING", r.data, 2)?;
                                let len = read_u16(r.data) as usize;
                                let data = &r.data[2..];
                                check_len("STRING", data, len)?;
                                self.encoding.decode_bytes(&data[..len])
                            }
                        };
                        cells.push(Cell::new(pos, CellValue::Text(s)));
                    } else {
                        trace!("STRING record without a formula");
                    }
                }
                0x000A => {
                    // EOF
                    eof = true;
                    break;
                }
                t => trace!("skipping record {t:#06x}"),
            }
        }
        if !eof {
            return Err(XlsError::EoStream("worksheet"));
        }
        if let Some(pos) = pending_string {
            warn!("formula at {pos:?} has no STRING record, using an empty value");
        }
        Ok(cells)
    }

    fn number(&self, xf: u16, v: f64) -> CellValue {
        format_excel_f64(v, self.formats.get(xf as usize), self.is_1904)
    }

    /// Number (MS-XLS 2.4.180)
    fn parse_number(&self, r: &[u8]) -> Result<Cell, XlsError> {
        check_len("NUMBER", r, 14)?;
        let pos = cell_position(r);
        let xf = read_u16(&r[4..]);
        Ok(Cell::new(pos, self.number(xf, read_f64(&r[6..]))))
    }

    /// RK (MS-XLS 2.4.220)
    fn parse_rk(&self, r: &[u8]) -> Result<Cell, XlsError> {
        check_len("RK", r, 10)?;
        let pos = cell_position(r);
        let xf = read_u16(&r[4..]);
        Ok(Cell::new(pos, self.number(xf, rk_number(read_u32(&r[6..])))))
    }

    /// MulRk (MS-XLS 2.4.175)
    fn parse_mul_rk(&self, r: &[u8], cells: &mut Vec<Cell>) -> Result<(), XlsError> {
        check_len("MULRK", r, 6)?;
        let row = read_u16(r) as u32;
        let col_first = read_u16(&r[2..]) as u32;
        let rk_recs = &r[4..r.len() - 2];
        if rk_recs.len() % 6 != 0 {
            return Err(XlsError::Len {
                typ: "MULRK",
                expected: rk_recs.len() / 6 * 6 + 6,
                found: r.len(),
            });
        }
        let col_last = read_u16(&r[r.len() - 2..]) as u32;
        if col_last + 1 < col_first || (col_last + 1 - col_first) as usize != rk_recs.len() / 6 {
            warn!("MULRK at row {row}: column range does not match its {} values", rk_recs.len() / 6);
        }
        for (i, rec) in rk_recs.chunks_exact(6).enumerate() {
            let xf = read_u16(rec);
            let v = rk_number(read_u32(&rec[2..]));
            cells.push(Cell::new((row, col_first + i as u32), self.number(xf, v)));
        }
        Ok(())
    }

    /// LabelSst (MS-XLS 2.4.149)
    fn parse_label_sst(&self, r: &[u8]) -> Result<Cell, XlsError> {
        check_len("LABELSST", r, 10)?;
        let pos = cell_position(r);
        let index = read_usize(&r[6..]);
        let s = self.strings.get(index).ok_or(XlsError::SstIndex {
            index,
            len: self.strings.len(),
        })?;
        Ok(Cell::new(pos, CellValue::Text(s.clone())))
    }

    /// Label (MS-XLS 2.4.148)
    fn parse_label(&self, r: &mut Record<'_>) -> Result<Cell, XlsError> {
        check_len("LABEL", r.data, 8)?;
        let pos = cell_position(r.data);
        r.data = &r.data[6..];
        let s = match self.biff {
            Biff::Biff8 => read_unicode_string(r, &self.encoding, 2)?,
            Biff::Biff5 => {
                let len = read_u16(r.data) as usize;
                let data = &r.data[2..];
                check_len("LABEL", data, len)?;
                self.encoding.decode_bytes(&data[..len])
            }
        };
        Ok(Cell::new(pos, CellValue::Text(s)))
    }

    /// Formula (MS-XLS 2.4.127), only the cached value is kept
    fn parse_formula(&self, r: &[u8]) -> Result<FormulaValue, XlsError> {
        check_len("FORMULA", r, 20)?;
        let pos = cell_position(r);
        let xf = read_u16(&r[4..]);
        if r[12..14] != [0xFF, 0xFF] {
            return Ok(FormulaValue::Value(Cell::new(
                pos,
                self.number(xf, read_f64(&r[6..])),
            )));
        }
        let v = match r[6] {
            0x00 => return Ok(FormulaValue::String(pos)),
            0x01 => CellValue::Bool(r[8] != 0),
            0x02 => cell_error(r[8])?,
            0x03 => return Ok(FormulaValue::Empty),
            e => {
                return Err(XlsError::Unrecognized {
                    typ: "FormulaValue",
                    val: e,
                })
            }
        };
        Ok(FormulaValue::Value(Cell::new(pos, v)))
    }
}

enum FormulaValue {
    Value(Cell),
    String((u32, u32)),
    Empty,
}

fn check_len(typ: &'static str, data: &[u8], expected: usize) -> Result<(), XlsError> {
    if data.len() < expected {
        Err(XlsError::Len {
            typ,
            expected,
            found: data.len(),
        })
    } else {
        Ok(())
    }
}

/// Row and column of a Cell structure (MS-XLS 2.5.14)
fn cell_position(r: &[u8]) -> (u32, u32) {
    (read_u16(r) as u32, read_u16(&r[2..]) as u32)
}

fn cell_error(code: u8) -> Result<CellValue, XlsError> {
    CellErrorType::from_code(code)
        .map(CellValue::from)
        .ok_or(XlsError::Unrecognized {
            typ: "error",
            val: code,
        })
}

/// BoolErr (MS-XLS 2.4.24)
fn parse_bool_err(r: &[u8]) -> Result<Cell, XlsError> {
    check_len("BOOLERR", r, 8)?;
    let pos = cell_position(r);
    let v = match r[7] {
        0x00 => CellValue::Bool(r[6] != 0),
        0x01 => cell_error(r[6])?,
        e => {
            return Err(XlsError::Unrecognized {
                typ: "fError",
                val: e,
            })
        }
    };
    Ok(Cell::new(pos, v))
}

/// SST (MS-XLS 2.4.265)
fn parse_sst(r: &mut Record<'_>, encoding: &XlsEncoding) -> Result<Vec<String>, XlsError> {
    check_len("SST", r.data, 8)?;
    let len = read_usize(&r.data[4..]);
    let mut sst = Vec::with_capacity(min(len, r.len() / 3));
    r.data = &r.data[8..];
    for _ in 0..len {
        if r.data.is_empty() && !r.continue_record() {
            return Err(XlsError::Len {
                typ: "SST",
                expected: len,
                found: sst.len(),
            });
        }
        sst.push(read_rich_extended_string(r, encoding)?);
    }
    Ok(sst)
}

/// XLUnicodeRichExtendedString (MS-XLS 2.5.293)
fn read_rich_extended_string(
    r: &mut Record<'_>,
    encoding: &XlsEncoding,
) -> Result<String, XlsError> {
    check_len("XLUnicodeRichExtendedString", r.data, 3)?;
    let str_len = read_u16(r.data) as usize;
    let flags = r.data[2];
    r.data = &r.data[3..];
    let high_byte = flags & 0x1 != 0;

    let mut unused_len = 0;
    if flags & 0x8 != 0 {
        check_len("XLUnicodeRichExtendedString:cRun", r.data, 2)?;
        unused_len += 4 * read_u16(r.data) as usize;
        r.data = &r.data[2..];
    }
    if flags & 0x4 != 0 {
        check_len("XLUnicodeRichExtendedString:cbExtRst", r.data, 4)?;
        unused_len += read_usize(r.data);
        r.data = &r.data[4..];
    }

    let s = read_dbcs(encoding, str_len, r, high_byte)?;

    while unused_len > 0 {
        if r.data.is_empty() && !r.continue_record() {
            return Err(XlsError::ContinueRecordTooShort);
        }
        let l = min(unused_len, r.data.len());
        r.data = &r.data[l..];
        unused_len -= l;
    }
    Ok(s)
}

/// ShortXLUnicodeString (`len_size` 1) or XLUnicodeString (`len_size` 2)
fn read_unicode_string(
    r: &mut Record<'_>,
    encoding: &XlsEncoding,
    len_size: usize,
) -> Result<String, XlsError> {
    check_len("XLUnicodeString", r.data, len_size + 1)?;
    let len = if len_size == 1 {
        r.data[0] as usize
    } else {
        read_u16(r.data) as usize
    };
    let high_byte = r.data[len_size] & 0x1 != 0;
    r.data = &r.data[len_size + 1..];
    read_dbcs(encoding, len, r, high_byte)
}

/// BIFF5 byte string with a one byte length
fn read_byte_string(data: &[u8], encoding: &XlsEncoding) -> Result<String, XlsError> {
    check_len("ShortString", data, 1)?;
    let len = data[0] as usize;
    check_len("ShortString", &data[1..], len)?;
    Ok(encoding.decode_bytes(&data[1..=len]))
}

/// Reads `len` characters, following CONTINUE records which restate the
/// high byte flag on their first byte
fn read_dbcs(
    encoding: &XlsEncoding,
    mut len: usize,
    r: &mut Record<'_>,
    mut high_byte: bool,
) -> Result<String, XlsError> {
    let mut s = String::with_capacity(len);
    while len > 0 {
        let (l, consumed) = encoding.decode_to(r.data, len, &mut s, Some(high_byte));
        r.data = &r.data[consumed..];
        len -= l;
        if len > 0 {
            if !r.continue_record() || r.data.is_empty() {
                return Err(XlsError::ContinueRecordTooShort);
            }
            high_byte = r.data[0] & 0x1 != 0;
            r.data = &r.data[1..];
        }
    }
    Ok(s)
}

struct XlsEncoding {
    encoding: &'static Encoding,
}

impl XlsEncoding {
    fn from_codepage(codepage: u16) -> Result<XlsEncoding, XlsError> {
        let encoding =
            codepage::to_encoding(codepage).ok_or(XlsError::CodePageNotFound(codepage))?;
        Ok(XlsEncoding { encoding })
    }

    /// Decodes 8-bit text with the workbook codepage
    fn decode_bytes(&self, bytes: &[u8]) -> String {
        self.encoding.decode_without_bom_handling(bytes).0.into_owned()
    }

    /// Decodes up to `len` characters of `stream` into `s`
    ///
    /// Returns the number of characters and the number of bytes consumed.
    /// `Some(high_byte)` is the BIFF8 layout: UTF-16LE, or its low bytes only.
    fn decode_to(
        &self,
        stream: &[u8],
        len: usize,
        s: &mut String,
        high_byte: Option<bool>,
    ) -> (usize, usize) {
        let (l, consumed, bytes, encoding) = match high_byte {
            None => {
                let l = min(stream.len(), len);
                (l, l, Cow::Borrowed(&stream[..l]), self.encoding)
            }
            Some(false) => {
                let l = min(stream.len(), len);
                // add 0x00 high bytes to unicodes
                let mut bytes = vec![0; l * 2];
                for (i, sce) in stream.iter().take(l).enumerate() {
                    bytes[2 * i] = *sce;
                }
                (l, l, Cow::Owned(bytes), UTF_16LE)
            }
            Some(true) => {
                let l = min(stream.len() / 2, len);
                (l, 2 * l, Cow::Borrowed(&stream[..2 * l]), UTF_16LE)
            }
        };
        s.push_str(&encoding.decode_without_bom_handling(&bytes).0);
        (l, consumed)
    }
}

struct Record<'a> {
    typ: u16,
    data: &'a [u8],
    cont: Vec<&'a [u8]>,
}

impl Record<'_> {
    fn continue_record(&mut self) -> bool {
        if self.cont.is_empty() {
            false
        } else {
            self.data = self.cont.remove(0);
            true
        }
    }

    /// Remaining bytes, continue records included
    fn len(&self) -> usize {
        self.data.len() + self.cont.iter().map(|c| c.len()).sum::<usize>()
    }
}

struct RecordIter<'a> {
    stream: &'a [u8],
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<Record<'a>, XlsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stream.len() < 4 {
            return if self.stream.is_empty() {
                None
            } else {
                self.stream = &[];
                Some(Err(XlsError::EoStream("record type and length")))
            };
        }
        let t = read_u16(self.stream);
        let len = read_u16(&self.stream[2..]) as usize;
        if self.stream.len() < len + 4 {
            self.stream = &[];
            return Some(Err(XlsError::EoStream("record length")));
        }
        let (data, next) = self.stream.split_at(len + 4);
        self.stream = next;
        let d = &data[4..];

        // Append next record data if it is a Continue record
        let mut cont = Vec::new();
        while self.stream.len() >= 4 && read_u16(self.stream) == 0x003C {
            let len = read_u16(&self.stream[2..]) as usize;
            if self.stream.len() < len + 4 {
                self.stream = &[];
                return Some(Err(XlsError::EoStream("CONTINUE")));
            }
            let (c, next) = self.stream.split_at(len + 4);
            cont.push(&c[4..]);
            self.stream = next;
        }

        Some(Ok(Record {
            typ: t,
            data: d,
            cont,
        }))
    }
}
