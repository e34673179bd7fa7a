mod cells_reader;

pub use cells_reader::XlsbCellsReader;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{BufReader, Read, Seek, SeekFrom};

use log::{debug, trace, warn};

use encoding_rs::UTF_16LE;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader as XmlReader;
use zip::read::{ZipArchive, ZipFile};
use zip::result::ZipError;

use crate::cfb::Cfb;
use crate::formats::{detect_custom_number_format, resolve_format, CellFormat};
use crate::locator::{Sheet, SheetDirectory, SheetEntry, SheetType, SheetVisible};
use crate::utils::{read_u16, read_u32, read_usize};
use crate::xlsx::normalize_target;
use crate::{ParseOptions, WorksheetTable};

/// A Xlsb specific error
#[derive(Debug)]
pub enum XlsbError {
    /// Io error
    Io(std::io::Error),
    /// Zip error
    Zip(zip::result::ZipError),
    /// Xml error
    Xml(quick_xml::Error),
    /// Xml attribute error
    XmlAttr(quick_xml::events::attributes::AttrError),
    /// XML Encoding error
    Encoding(quick_xml::encoding::EncodingError),

    /// File not found
    FileNotFound(String),
    /// Relationship not found
    RelationshipNotFound(String),
    /// Unsupported cell error code
    CellError(u8),
    /// Wide str length too long
    WideStr {
        /// wide str length
        ws_len: usize,
        /// buffer length
        buf_len: usize,
    },
    /// Record payload shorter than its fixed part
    Len {
        /// record type
        typ: u16,
        /// expected length
        expected: usize,
        /// found length
        found: usize,
    },
    /// Unrecognized data
    Unrecognized {
        /// data type
        typ: &'static str,
        /// value found
        val: String,
    },
    /// Shared string index out of the table
    SstIndex {
        /// index found in the cell
        index: usize,
        /// number of shared strings
        len: usize,
    },
    /// Row index beyond the sheet limits
    InvalidRow(u32),
    /// Part ends before the record closing its content
    UnexpectedEof(&'static str),
    /// Workbook is password protected
    Password,
}

from_err!(std::io::Error, XlsbError, Io);
from_err!(zip::result::ZipError, XlsbError, Zip);
from_err!(quick_xml::Error, XlsbError, Xml);
from_err!(quick_xml::encoding::EncodingError, XlsbError, Encoding);

impl std::fmt::Display for XlsbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XlsbError::Io(e) => write!(f, "I/O error: {e}"),
            XlsbError::Zip(e) => write!(f, "Zip error: {e}"),
            XlsbError::Xml(e) => write!(f, "Xml error: {e}"),
            XlsbError::XmlAttr(e) => write!(f, "Xml attribute error: {e}"),
            XlsbError::Encoding(e) => write!(f, "XML encoding error: {e}"),
            XlsbError::FileNotFound(file) => write!(f, "File not found: '{file}'"),
            XlsbError::RelationshipNotFound(id) => write!(f, "Relationship '{id}' not found"),
            XlsbError::CellError(t) => write!(f, "Unsupported Cell Error code {t:X}"),
            XlsbError::WideStr { ws_len, buf_len } => write!(
                f,
                "Wide str length exceeds buffer length ({ws_len} > {buf_len})",
            ),
            XlsbError::Len {
                typ,
                expected,
                found,
            } => write!(
                f,
                "Record {typ:#06X} too short, expecting {expected} bytes, found {found}"
            ),
            XlsbError::Unrecognized { typ, val } => {
                write!(f, "Unrecognized {typ}: {val}")
            }
            XlsbError::SstIndex { index, len } => write!(
                f,
                "Shared string index {index} out of range ({len} strings)"
            ),
            XlsbError::InvalidRow(row) => write!(f, "Invalid row index {row}"),
            XlsbError::UnexpectedEof(typ) => write!(f, "Part ends before {typ}"),
            XlsbError::Password => write!(f, "Workbook is password protected"),
        }
    }
}

impl std::error::Error for XlsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsbError::Io(e) => Some(e),
            XlsbError::Zip(e) => Some(e),
            XlsbError::Xml(e) => Some(e),
            XlsbError::XmlAttr(e) => Some(e),
            XlsbError::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

/// A Xlsb reader
pub struct Xlsb<RS> {
    zip: ZipArchive<RS>,
    directory: SheetDirectory<String>,
    strings: Vec<String>,
    /// Cell (number) formats
    formats: Vec<CellFormat>,
    is_1904: bool,
}

impl<RS: Read + Seek> Xlsb<RS> {
    /// Opens the package and reads shared strings, styles and the workbook
    /// manifest
    pub fn new(mut reader: RS) -> Result<Self, XlsbError> {
        check_for_password_protected(&mut reader)?;

        let mut xlsb = Xlsb {
            zip: ZipArchive::new(reader)?,
            directory: SheetDirectory::default(),
            strings: Vec::new(),
            formats: Vec::new(),
            is_1904: false,
        };
        xlsb.read_shared_strings()?;
        xlsb.read_styles()?;
        let relationships = xlsb.read_relationships()?;
        xlsb.read_workbook(&relationships)?;
        debug!(
            "xlsb: {} sheets, {} shared strings, {} cell formats",
            xlsb.directory.len(),
            xlsb.strings.len(),
            xlsb.formats.len()
        );
        Ok(xlsb)
    }

    /// Sheets declared by `xl/workbook.bin`, in declaration order
    pub fn directory(&self) -> &SheetDirectory<String> {
        &self.directory
    }

    /// Reads one located sheet into a table
    pub fn worksheet_table(
        &mut self,
        entry: &SheetEntry<String>,
        options: &ParseOptions,
    ) -> Result<WorksheetTable, XlsbError> {
        let mut cells = Vec::new();
        if entry.sheet.typ == SheetType::WorkSheet {
            let mut reader = self.worksheet_cells_reader(&entry.reference)?;
            while let Some(cell) = reader.next_cell()? {
                if !cell.val.is_empty() {
                    cells.push(cell);
                }
            }
        } else {
            debug!("'{}' is a {:?}, no cells", entry.sheet.name, entry.sheet.typ);
        }
        Ok(WorksheetTable::from_cells(
            cells,
            options.header_row,
            options.has_headers,
        ))
    }

    /// Get a cells reader for a sheet part
    pub fn worksheet_cells_reader<'a>(
        &'a mut self,
        path: &str,
    ) -> Result<XlsbCellsReader<'a, RS>, XlsbError> {
        let iter = RecordIter::from_zip(&mut self.zip, path)?;
        XlsbCellsReader::new(iter, &self.formats, &self.strings, self.is_1904)
    }

    /// MS-XLSB
    fn read_relationships(&mut self) -> Result<BTreeMap<Vec<u8>, String>, XlsbError> {
        let mut relationships = BTreeMap::new();
        match self.zip.by_name("xl/_rels/workbook.bin.rels") {
            Ok(f) => {
                let mut xml = XmlReader::from_reader(BufReader::new(f));
                let config = xml.config_mut();
                config.check_end_names = false;
                config.trim_text(false);
                config.check_comments = false;
                config.expand_empty_elements = true;
                let mut buf: Vec<u8> = Vec::with_capacity(64);

                loop {
                    match xml.read_event_into(&mut buf) {
                        Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"Relationship" => {
                            let mut id = None;
                            let mut target = None;
                            for a in e.attributes() {
                                match a.map_err(XlsbError::XmlAttr)? {
                                    Attribute {
                                        key: QName(b"Id"),
                                        value: v,
                                    } => {
                                        id = Some(v.to_vec());
                                    }
                                    Attribute {
                                        key: QName(b"Target"),
                                        value: v,
                                    } => {
                                        target = Some(xml.decoder().decode(&v)?.into_owned());
                                    }
                                    _ => (),
                                }
                            }
                            if let (Some(id), Some(target)) = (id, target) {
                                relationships.insert(id, target);
                            }
                        }
                        Ok(Event::Eof) => break,
                        Err(e) => return Err(XlsbError::Xml(e)),
                        _ => (),
                    }
                    buf.clear();
                }
            }
            Err(ZipError::FileNotFound) => {
                return Err(XlsbError::FileNotFound(
                    "xl/_rels/workbook.bin.rels".to_string(),
                ))
            }
            Err(e) => return Err(XlsbError::Zip(e)),
        }
        Ok(relationships)
    }

    /// MS-XLSB 2.1.7.50 Styles
    ///
    /// Only number formats are kept: custom formats (`BrtFmt`) and the
    /// format of every cell xf (`BrtXF` between `BrtBeginCellXFs` and
    /// `BrtEndCellXFs`).
    fn read_styles(&mut self) -> Result<(), XlsbError> {
        let mut iter = match RecordIter::from_zip(&mut self.zip, "xl/styles.bin") {
            Ok(iter) => iter,
            Err(XlsbError::FileNotFound(_)) => return Ok(()), // it is fine if path does not exists
            Err(e) => return Err(e),
        };
        let mut buf = Vec::with_capacity(1024);
        let mut number_formats = BTreeMap::new();
        let mut xf_formats = Vec::new();
        let mut in_cell_xfs = false;

        while let Some(typ) = iter.next_record(&mut buf)? {
            match typ {
                0x002C => {
                    // BrtFmt
                    check_len(typ, &buf, 6)?;
                    let fmt_code = read_u16(&buf);
                    let fmt_str = wide_str(&buf[2..], &mut 0)?;
                    number_formats.insert(fmt_code, detect_custom_number_format(&fmt_str));
                }
                0x0269 => in_cell_xfs = true, // BrtBeginCellXFs
                0x002F if in_cell_xfs => {
                    // BrtXF
                    check_len(typ, &buf, 4)?;
                    xf_formats.push(read_u16(&buf[2..]));
                }
                0x026A => break, // BrtEndCellXFs
                _ => (),
            }
        }

        self.formats = xf_formats
            .into_iter()
            .map(|id| resolve_format(id, &number_formats))
            .collect();
        Ok(())
    }

    /// MS-XLSB 2.1.7.45
    fn read_shared_strings(&mut self) -> Result<(), XlsbError> {
        let mut iter = match RecordIter::from_zip(&mut self.zip, "xl/sharedStrings.bin") {
            Ok(iter) => iter,
            Err(XlsbError::FileNotFound(_)) => return Ok(()), // it is fine if path does not exists
            Err(e) => return Err(e),
        };
        let mut buf = Vec::with_capacity(1024);
        let mut declared = None;
        let mut end = false;

        while let Some(typ) = iter.next_record(&mut buf)? {
            match typ {
                0x009F => {
                    // BrtBeginSst
                    check_len(typ, &buf, 8)?;
                    let len = read_usize(&buf[4..8]);
                    self.strings.reserve(len.min(1 << 16));
                    declared = Some(len);
                }
                0x0013 => {
                    // BrtSSTItem
                    check_len(typ, &buf, 5)?;
                    self.strings.push(wide_str(&buf[1..], &mut 0)?.into_owned());
                }
                0x00A0 => {
                    // BrtEndSst
                    end = true;
                    break;
                }
                _ => (),
            }
        }
        if !end {
            return Err(XlsbError::UnexpectedEof("BrtEndSst"));
        }
        if let Some(len) = declared.filter(|l| *l != self.strings.len()) {
            warn!(
                "shared strings table declares {len} strings, found {}",
                self.strings.len()
            );
        }
        Ok(())
    }

    /// MS-XLSB 2.1.7.61
    fn read_workbook(
        &mut self,
        relationships: &BTreeMap<Vec<u8>, String>,
    ) -> Result<(), XlsbError> {
        let mut iter = RecordIter::from_zip(&mut self.zip, "xl/workbook.bin")?;
        let mut buf = Vec::with_capacity(1024);
        let mut sheets = Vec::new();
        let mut end = false;

        while let Some(typ) = iter.next_record(&mut buf)? {
            match typ {
                0x0099 => {
                    // BrtWbProp
                    check_len(typ, &buf, 4)?;
                    self.is_1904 = buf[0] & 0x1 != 0;
                }
                0x009C => {
                    // BrtBundleSh
                    check_len(typ, &buf, 12)?;
                    // ST_SheetState
                    let visible = match read_u32(&buf) {
                        0 => SheetVisible::Visible,
                        1 => SheetVisible::Hidden,
                        2 => SheetVisible::VeryHidden,
                        v => {
                            return Err(XlsbError::Unrecognized {
                                typ: "BrtBundleSh:hsState",
                                val: v.to_string(),
                            })
                        }
                    };
                    let rel_len = read_u32(&buf[8..]);
                    let (relid, name_start) = if rel_len == 0xFFFF_FFFF {
                        (None, 12)
                    } else {
                        let mut str_len = 0;
                        let relid = wide_str(&buf[8..], &mut str_len)?.into_owned();
                        (Some(relid), 8 + str_len)
                    };
                    let name = wide_str(&buf[name_start..], &mut 0)?.into_owned();
                    let Some(relid) = relid else {
                        warn!("sheet '{name}' has no relationship id, skipping it");
                        continue;
                    };
                    let target = relationships
                        .get(relid.as_bytes())
                        .ok_or(XlsbError::RelationshipNotFound(relid))?;
                    let path = normalize_target(target);
                    let typ = match path.split('/').nth(1) {
                        Some("worksheets") => SheetType::WorkSheet,
                        Some("chartsheets") => SheetType::ChartSheet,
                        Some("dialogsheets") => SheetType::DialogSheet,
                        Some("macrosheets") => SheetType::MacroSheet,
                        _ => {
                            return Err(XlsbError::Unrecognized {
                                typ: "BrtBundleSh:type",
                                val: path,
                            })
                        }
                    };
                    sheets.push(SheetEntry {
                        sheet: Sheet { name, typ, visible },
                        reference: path,
                    });
                }
                0x0090 => {
                    // BrtEndBundleShs
                    end = true;
                    break;
                }
                t => trace!("skipping workbook record {t:#06X}"),
            }
        }
        if !end {
            return Err(XlsbError::UnexpectedEof("BrtEndBundleShs"));
        }
        for entry in sheets {
            self.directory.push(entry);
        }
        Ok(())
    }
}

pub(crate) struct RecordIter<'a, RS>
where
    RS: Read + Seek,
{
    b: [u8; 1],
    r: BufReader<ZipFile<'a, RS>>,
}

impl<'a, RS> RecordIter<'a, RS>
where
    RS: Read + Seek,
{
    fn from_zip(zip: &'a mut ZipArchive<RS>, path: &str) -> Result<RecordIter<'a, RS>, XlsbError> {
        match zip.by_name(path) {
            Ok(f) => Ok(RecordIter {
                r: BufReader::new(f),
                b: [0],
            }),
            Err(ZipError::FileNotFound) => Err(XlsbError::FileNotFound(path.into())),
            Err(e) => Err(XlsbError::Zip(e)),
        }
    }

    fn read_u8(&mut self) -> Result<u8, std::io::Error> {
        self.r.read_exact(&mut self.b)?;
        Ok(self.b[0])
    }

    /// Reads the next record type, `None` at the end of the part
    ///
    /// Types are 1 or 2 bytes of 7 bits, the high bit flagging a second byte.
    fn read_type(&mut self) -> Result<Option<u16>, std::io::Error> {
        let b = match self.r.read(&mut self.b)? {
            0 => return Ok(None),
            _ => self.b[0],
        };
        let typ = if (b & 0x80) == 0x80 {
            (b & 0x7F) as u16 + (((self.read_u8()? & 0x7F) as u16) << 7)
        } else {
            b as u16
        };
        Ok(Some(typ))
    }

    /// Reads the record length (up to 4 bytes of 7 bits) then the payload
    fn fill_buffer(&mut self, buf: &mut Vec<u8>) -> Result<(), std::io::Error> {
        let mut b = self.read_u8()?;
        let mut len = (b & 0x7F) as usize;
        for i in 1..4 {
            if (b & 0x80) == 0 {
                break;
            }
            b = self.read_u8()?;
            len += ((b & 0x7F) as usize) << (7 * i);
        }
        buf.clear();
        // the declared length is only trusted as far as the part goes
        let read = (&mut self.r).take(len as u64).read_to_end(buf)?;
        if read < len {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Reads a whole record, returning its type
    fn next_record(&mut self, buf: &mut Vec<u8>) -> Result<Option<u16>, XlsbError> {
        match self.read_type()? {
            Some(typ) => {
                self.fill_buffer(buf)?;
                Ok(Some(typ))
            }
            None => Ok(None),
        }
    }
}

fn check_len(typ: u16, buf: &[u8], expected: usize) -> Result<(), XlsbError> {
    if buf.len() < expected {
        Err(XlsbError::Len {
            typ,
            expected,
            found: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// XLWideString (MS-XLSB 2.5.168): character count then UTF-16LE
fn wide_str<'a>(buf: &'a [u8], str_len: &mut usize) -> Result<Cow<'a, str>, XlsbError> {
    if buf.len() < 4 {
        return Err(XlsbError::WideStr {
            ws_len: 4,
            buf_len: buf.len(),
        });
    }
    let len = read_usize(buf);
    let ws_len = len.saturating_mul(2).saturating_add(4);
    if buf.len() < ws_len {
        return Err(XlsbError::WideStr {
            ws_len,
            buf_len: buf.len(),
        });
    }
    *str_len = ws_len;
    let s = &buf[4..ws_len];
    Ok(UTF_16LE.decode_without_bom_handling(s).0)
}

fn check_for_password_protected<RS: Read + Seek>(reader: &mut RS) -> Result<(), XlsbError> {
    let mut signature = [0u8; 8];
    let is_cfb = reader.read_exact(&mut signature).is_ok() && Cfb::is_cfb(&signature);
    reader.seek(SeekFrom::Start(0))?;
    if is_cfb {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        reader.seek(SeekFrom::Start(0))?;
        if let Ok(cfb) = Cfb::new(&data) {
            if cfb.has_directory("EncryptedPackage") {
                return Err(XlsbError::Password);
            }
        }
    }
    Ok(())
}
