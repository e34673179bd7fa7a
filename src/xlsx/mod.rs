mod cells_reader;

use std::collections::BTreeMap;
use std::io::{BufReader, Read, Seek, SeekFrom};

use log::{debug, warn};
use quick_xml::{
    events::{
        attributes::Attribute,
        BytesRef, Event,
    },
    name::QName,
    Reader as XmlReader,
};
use zip::read::{ZipArchive, ZipFile};
use zip::result::ZipError;

use crate::cfb::Cfb;
use crate::formats::{detect_custom_number_format, resolve_format, CellFormat};
use crate::locator::{Sheet, SheetDirectory, SheetEntry, SheetType, SheetVisible};
use crate::{ParseOptions, WorksheetTable};
pub use cells_reader::XlsxCellReader;

pub(crate) type XlReader<'a, RS> = XmlReader<BufReader<ZipFile<'a, RS>>>;

/// An enum for Xlsx specific errors
#[derive(Debug)]
pub enum XlsxError {
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
    /// XML entity error
    Escape(quick_xml::escape::EscapeError),
    /// Unexpected end of xml
    XmlEof(&'static str),
    /// Unexpected node
    UnexpectedNode(&'static str),
    /// File not found
    FileNotFound(String),
    /// Relationship not found
    RelationshipNotFound(String),
    /// Expecting alphanumeric character
    Alphanumeric(u8),
    /// Cell 't' attribute error
    CellTAttribute(String),
    /// There is no column component in the range string
    RangeWithoutColumnComponent,
    /// There is no row component in the range string
    RangeWithoutRowComponent,
    /// Unrecognized data
    Unrecognized {
        /// data type
        typ: &'static str,
        /// value found
        val: String,
    },
    /// Cell error
    CellError(String),
    /// Shared string index out of the table
    SstIndex {
        /// index found in the cell
        index: String,
        /// number of shared strings
        len: usize,
    },
    /// Workbook is password protected
    Password,
}

from_err!(std::io::Error, XlsxError, Io);
from_err!(zip::result::ZipError, XlsxError, Zip);
from_err!(quick_xml::Error, XlsxError, Xml);
from_err!(quick_xml::encoding::EncodingError, XlsxError, Encoding);
from_err!(quick_xml::escape::EscapeError, XlsxError, Escape);
from_err!(quick_xml::events::attributes::AttrError, XlsxError, XmlAttr);

impl std::fmt::Display for XlsxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XlsxError::Io(e) => write!(f, "I/O error: {e}"),
            XlsxError::Zip(e) => write!(f, "Zip error: {e}"),
            XlsxError::Xml(e) => write!(f, "Xml error: {e}"),
            XlsxError::XmlAttr(e) => write!(f, "Xml attribute error: {e}"),
            XlsxError::Encoding(e) => write!(f, "XML encoding error: {e}"),
            XlsxError::Escape(e) => write!(f, "XML entity error: {e}"),
            XlsxError::XmlEof(e) => write!(f, "Unexpected end of xml, expecting '</{e}>'"),
            XlsxError::UnexpectedNode(e) => write!(f, "Expecting '{e}' node"),
            XlsxError::FileNotFound(e) => write!(f, "File not found '{e}'"),
            XlsxError::RelationshipNotFound(id) => write!(f, "Relationship '{id}' not found"),
            XlsxError::Alphanumeric(e) => {
                write!(f, "Expecting alphanumeric character, got {e:X}")
            }
            XlsxError::CellTAttribute(e) => write!(f, "Unknown cell 't' attribute: {e:?}"),
            XlsxError::RangeWithoutColumnComponent => {
                write!(f, "Range is missing the expected column component.")
            }
            XlsxError::RangeWithoutRowComponent => {
                write!(f, "Range is missing the expected row component.")
            }
            XlsxError::Unrecognized { typ, val } => write!(f, "Unrecognized {typ}: {val}"),
            XlsxError::CellError(e) => write!(f, "Unsupported cell error value '{e}'"),
            XlsxError::SstIndex { index, len } => write!(
                f,
                "Shared string index '{index}' out of range ({len} strings)"
            ),
            XlsxError::Password => write!(f, "Workbook is password protected"),
        }
    }
}

impl std::error::Error for XlsxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsxError::Io(e) => Some(e),
            XlsxError::Zip(e) => Some(e),
            XlsxError::Xml(e) => Some(e),
            XlsxError::XmlAttr(e) => Some(e),
            XlsxError::Encoding(e) => Some(e),
            XlsxError::Escape(e) => Some(e),
            _ => None,
        }
    }
}

/// A struct representing xml zipped excel file
/// Xlsx, Xlsm
pub struct Xlsx<RS> {
    zip: ZipArchive<RS>,
    /// Shared strings
    strings: Vec<String>,
    /// Sheets and their part paths
    directory: SheetDirectory<String>,
    /// Number format category of every cell xf
    formats: Vec<CellFormat>,
    /// 1904 datetime system
    is_1904: bool,
}

impl<RS: Read + Seek> Xlsx<RS> {
    /// Opens the package and reads shared strings, styles and the workbook
    /// manifest
    pub fn new(mut reader: RS) -> Result<Self, XlsxError> {
        check_for_password_protected(&mut reader)?;

        let mut xlsx = Xlsx {
            zip: ZipArchive::new(reader)?,
            strings: Vec::new(),
            directory: SheetDirectory::default(),
            formats: Vec::new(),
            is_1904: false,
        };
        xlsx.read_shared_strings()?;
        xlsx.read_styles()?;
        let relationships = xlsx.read_relationships()?;
        xlsx.read_workbook(&relationships)?;
        debug!(
            "xlsx: {} sheets, {} shared strings, {} cell formats",
            xlsx.directory.len(),
            xlsx.strings.len(),
            xlsx.formats.len()
        );
        Ok(xlsx)
    }

    /// Sheets declared by `xl/workbook.xml`, in declaration order
    pub fn directory(&self) -> &SheetDirectory<String> {
        &self.directory
    }

    /// Reads one located sheet into a table
    pub fn worksheet_table(
        &mut self,
        entry: &SheetEntry<String>,
        options: &ParseOptions,
    ) -> Result<WorksheetTable, XlsxError> {
        let cells = if entry.sheet.typ == SheetType::WorkSheet {
            self.worksheet_cells(&entry.reference)?
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

    fn worksheet_cells(&mut self, path: &str) -> Result<Vec<crate::Cell>, XlsxError> {
        let xml = open_part(&mut self.zip, path)?;
        let mut cell_reader =
            XlsxCellReader::new(xml, &self.strings, &self.formats, self.is_1904)?;
        let mut cells = Vec::new();
        while let Some(cell) = cell_reader.next_cell()? {
            if !cell.val.is_empty() {
                cells.push(cell);
            }
        }
        Ok(cells)
    }

    fn read_shared_strings(&mut self) -> Result<(), XlsxError> {
        let mut xml = match open_part(&mut self.zip, "xl/sharedStrings.xml") {
            Ok(xml) => xml,
            Err(XlsxError::FileNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"si" => {
                    // an `si` without text still takes an index
                    let s = read_string(&mut xml, e.name())?;
                    self.strings.push(s.unwrap_or_default());
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sst" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("sst")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
        Ok(())
    }

    /// Reads custom number formats and the number format of each cell xf
    fn read_styles(&mut self) -> Result<(), XlsxError> {
        let mut xml = match open_part(&mut self.zip, "xl/styles.xml") {
            Ok(xml) => xml,
            Err(XlsxError::FileNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut number_formats = BTreeMap::new();
        let mut xf_formats = Vec::new();
        let mut buf = Vec::with_capacity(1024);
        let mut inner_buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"numFmts" => loop {
                    inner_buf.clear();
                    match xml.read_event_into(&mut inner_buf) {
                        Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"numFmt" => {
                            let mut id = None;
                            let mut format = String::new();
                            for a in e.attributes() {
                                let a = a?;
                                match a.key {
                                    QName(b"numFmtId") => {
                                        id = atoi_simd::parse::<u16>(&a.value).ok();
                                    }
                                    QName(b"formatCode") => {
                                        format = a
                                            .decode_and_unescape_value(xml.decoder())?
                                            .into_owned();
                                    }
                                    _ => (),
                                }
                            }
                            match id {
                                Some(id) => {
                                    number_formats
                                        .insert(id, detect_custom_number_format(&format));
                                }
                                None => warn!("numFmt without a valid numFmtId ignored"),
                            }
                        }
                        Ok(Event::End(ref e)) if e.local_name().as_ref() == b"numFmts" => break,
                        Ok(Event::Eof) => return Err(XlsxError::XmlEof("numFmts")),
                        Err(e) => return Err(XlsxError::Xml(e)),
                        _ => (),
                    }
                },
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"cellXfs" => loop {
                    inner_buf.clear();
                    match xml.read_event_into(&mut inner_buf) {
                        Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"xf" => {
                            let id = e
                                .try_get_attribute("numFmtId")?
                                .and_then(|a| atoi_simd::parse::<u16>(&a.value).ok())
                                .unwrap_or(0);
                            xf_formats.push(id);
                        }
                        Ok(Event::End(ref e)) if e.local_name().as_ref() == b"cellXfs" => break,
                        Ok(Event::Eof) => return Err(XlsxError::XmlEof("cellXfs")),
                        Err(e) => return Err(XlsxError::Xml(e)),
                        _ => (),
                    }
                },
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"styleSheet" => break,
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }

        self.formats = xf_formats
            .into_iter()
            .map(|id| resolve_format(id, &number_formats))
            .collect();
        Ok(())
    }

    fn read_relationships(&mut self) -> Result<BTreeMap<Vec<u8>, String>, XlsxError> {
        let mut xml = open_part(&mut self.zip, "xl/_rels/workbook.xml.rels")?;
        let mut relationships = BTreeMap::new();
        let mut buf = Vec::with_capacity(64);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"Relationship" => {
                    let mut id = Vec::new();
                    let mut target = String::new();
                    for a in e.attributes() {
                        match a.map_err(XlsxError::XmlAttr)? {
                            Attribute {
                                key: QName(b"Id"),
                                value: v,
                            } => id.extend_from_slice(&v),
                            Attribute {
                                key: QName(b"Target"),
                                value: v,
                            } => target = xml.decoder().decode(&v)?.into_owned(),
                            _ => (),
                        }
                    }
                    relationships.insert(id, target);
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"Relationships" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("Relationships")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
        Ok(relationships)
    }

    fn read_workbook(
        &mut self,
        relationships: &BTreeMap<Vec<u8>, String>,
    ) -> Result<(), XlsxError> {
        let mut xml = open_part(&mut self.zip, "xl/workbook.xml")?;
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"sheet" => {
                    let mut name = String::new();
                    let mut path = None;
                    let mut visible = SheetVisible::Visible;
                    for a in e.attributes() {
                        let a = a.map_err(XlsxError::XmlAttr)?;
                        match a {
                            Attribute {
                                key: QName(b"name"),
                                ..
                            } => {
                                name = a.decode_and_unescape_value(xml.decoder())?.to_string();
                            }
                            Attribute {
                                key: QName(b"state"),
                                ..
                            } => {
                                visible = match a.decode_and_unescape_value(xml.decoder())?.as_ref()
                                {
                                    "visible" => SheetVisible::Visible,
                                    "hidden" => SheetVisible::Hidden,
                                    "veryHidden" => SheetVisible::VeryHidden,
                                    v => {
                                        return Err(XlsxError::Unrecognized {
                                            typ: "sheet:state",
                                            val: v.to_string(),
                                        })
                                    }
                                }
                            }
                            Attribute {
                                key: QName(b"r:id"),
                                value: v,
                            }
                            | Attribute {
                                key: QName(b"relationships:id"),
                                value: v,
                            } => {
                                let target = relationships.get(&*v).ok_or_else(|| {
                                    XlsxError::RelationshipNotFound(
                                        String::from_utf8_lossy(&v).into_owned(),
                                    )
                                })?;
                                path = Some(normalize_target(target));
                            }
                            _ => (),
                        }
                    }
                    let path = path.ok_or(XlsxError::UnexpectedNode("sheet r:id"))?;
                    let typ = match path.split('/').nth(1) {
                        Some("worksheets") => SheetType::WorkSheet,
                        Some("chartsheets") => SheetType::ChartSheet,
                        Some("dialogsheets") => SheetType::DialogSheet,
                        Some("macrosheets") => SheetType::MacroSheet,
                        _ => {
                            return Err(XlsxError::Unrecognized {
                                typ: "sheet:type",
                                val: path,
                            })
                        }
                    };
                    self.directory.push(SheetEntry {
                        sheet: Sheet { name, typ, visible },
                        reference: path,
                    });
                }
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"workbookPr" => {
                    self.is_1904 = match e.try_get_attribute("date1904")? {
                        Some(c) => ["1", "true"].contains(
                            &c.decode_and_unescape_value(xml.decoder())
                                .map_err(XlsxError::Xml)?
                                .as_ref(),
                        ),
                        None => false,
                    };
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"workbook" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("workbook")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
        Ok(())
    }
}

/// Relationship targets may be absolute (`/xl/...`), package relative
/// (`xl/...`) or relative to `xl/`
pub(crate) fn normalize_target(target: &str) -> String {
    if let Some(t) = target.strip_prefix('/') {
        t.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{target}")
    }
}

/// Opens an xml part, matching its name case-insensitively
fn open_part<'a, RS: Read + Seek>(
    zip: &'a mut ZipArchive<RS>,
    path: &str,
) -> Result<XlReader<'a, RS>, XlsxError> {
    let name = zip
        .file_names()
        .find(|n| n.eq_ignore_ascii_case(path))
        .map(str::to_owned)
        .ok_or_else(|| XlsxError::FileNotFound(path.to_string()))?;
    let mut xml = XmlReader::from_reader(BufReader::new(zip.by_name(&name)?));
    let config = xml.config_mut();
    config.check_end_names = false;
    config.trim_text(false);
    config.check_comments = false;
    config.expand_empty_elements = true;
    Ok(xml)
}

/// Reads an A1 reference into a 0-based row and column
///
/// Row references (`r` of a `row`) have no column letters.
pub(crate) fn parse_reference(reference: &[u8]) -> Result<(u32, Option<u32>), XlsxError> {
    let letters = reference
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    let (col, row) = reference.split_at(letters);
    if let Some(c) = row.iter().find(|c| !c.is_ascii_digit()) {
        return Err(XlsxError::Alphanumeric(*c));
    }
    let row = atoi_simd::parse::<u32>(row)
        .ok()
        .and_then(|r| r.checked_sub(1))
        .ok_or(XlsxError::RangeWithoutRowComponent)?;
    let col = col.iter().fold(0u32, |acc, c| {
        acc.saturating_mul(26)
            .saturating_add(u32::from(c.to_ascii_uppercase() - b'A') + 1)
    });
    Ok((row, col.checked_sub(1)))
}

/// Appends a character or predefined entity reference to `buf`
pub(crate) fn unescape_entity_to_buffer(
    e: &BytesRef<'_>,
    buf: &mut String,
) -> Result<(), XlsxError> {
    if let Some(ch) = e.resolve_char_ref()? {
        buf.push(ch);
        return Ok(());
    }
    let name = e.decode()?;
    match quick_xml::escape::resolve_predefined_entity(&name) {
        Some(s) => buf.push_str(s),
        None => {
            return Err(XlsxError::Unrecognized {
                typ: "entity",
                val: name.into_owned(),
            })
        }
    }
    Ok(())
}

/// attempts to read either a simple or richtext string
///
/// Runs of a rich text are concatenated, phonetic runs (`rPh`) are skipped.
pub(crate) fn read_string<RS>(
    xml: &mut XlReader<'_, RS>,
    closing: QName,
) -> Result<Option<String>, XlsxError>
where
    RS: Read + Seek,
{
    let mut buf = Vec::with_capacity(1024);
    let mut val_buf = Vec::with_capacity(1024);
    let mut value: Option<String> = None;
    let mut is_phonetic_text = false;
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"rPh" => {
                is_phonetic_text = true;
            }
            Ok(Event::End(ref e)) if e.name() == closing => {
                return Ok(value);
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"rPh" => {
                is_phonetic_text = false;
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" && !is_phonetic_text => {
                val_buf.clear();
                let s = value.get_or_insert_with(String::new);
                loop {
                    match xml.read_event_into(&mut val_buf)? {
                        Event::Text(t) => s.push_str(&t.xml10_content()?),
                        Event::GeneralRef(e) => unescape_entity_to_buffer(&e, s)?,
                        Event::End(end) if end.name() == e.name() => break,
                        Event::Eof => return Err(XlsxError::XmlEof("t")),
                        _ => (),
                    }
                    val_buf.clear();
                }
            }
            Ok(Event::Eof) => return Err(XlsxError::XmlEof("")),
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => (),
        }
    }
}

/// Encrypted packages are compound files holding an `EncryptedPackage`
/// stream instead of a zip archive
fn check_for_password_protected<RS: Read + Seek>(reader: &mut RS) -> Result<(), XlsxError> {
    let mut signature = [0u8; 8];
    let is_cfb = reader.read_exact(&mut signature).is_ok() && Cfb::is_cfb(&signature);
    reader.seek(SeekFrom::Start(0))?;
    if is_cfb {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        reader.seek(SeekFrom::Start(0))?;
        if let Ok(cfb) = Cfb::new(&data) {
            if cfb.has_directory("EncryptedPackage") {
                return Err(XlsxError::Password);
            }
        }
    }
    Ok(())
}
