//! A module to convert a format tag, or the bytes themselves, to a decoder

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use log::debug;
use zip::ZipArchive;

use crate::cfb::Cfb;
use crate::errors::Error;
use crate::locator::{Sheet, SheetSelector};
use crate::{ParseOptions, WorksheetTable, Xls, Xlsb, Xlsx};

/// Container format announced by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// Legacy compound binary workbook
    Xls,
    /// OOXML workbook
    Xlsx,
    /// Macro-enabled OOXML workbook, decoded as xlsx
    Xlsm,
    /// OOXML workbook with binary parts
    Xlsb,
}

/// Case-insensitive, an optional leading `.` is accepted
impl FromStr for FormatTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let tag = s.strip_prefix('.').unwrap_or(s);
        match tag.to_ascii_lowercase().as_str() {
            "xls" => Ok(FormatTag::Xls),
            "xlsx" => Ok(FormatTag::Xlsx),
            "xlsm" => Ok(FormatTag::Xlsm),
            "xlsb" => Ok(FormatTag::Xlsb),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatTag::Xls => "xls",
            FormatTag::Xlsx => "xlsx",
            FormatTag::Xlsm => "xlsm",
            FormatTag::Xlsb => "xlsb",
        })
    }
}

impl FormatTag {
    /// Guesses the format from the container signature
    ///
    /// A compound file is xls unless it wraps an encrypted OOXML package; a
    /// zip with `xl/workbook.bin` is xlsb, any other zip xlsx.
    pub fn sniff(bytes: &[u8]) -> Option<FormatTag> {
        if Cfb::is_cfb(bytes) {
            let encrypted = Cfb::new(bytes)
                .map(|cfb| cfb.has_directory("EncryptedPackage"))
                .unwrap_or(false);
            return Some(if encrypted {
                FormatTag::Xlsx
            } else {
                FormatTag::Xls
            });
        }
        if !bytes.starts_with(b"PK\x03\x04") {
            return None;
        }
        let is_xlsb = ZipArchive::new(Cursor::new(bytes))
            .map(|zip| {
                zip.file_names()
                    .any(|n| n.eq_ignore_ascii_case("xl/workbook.bin"))
            })
            .unwrap_or(false);
        Some(if is_xlsb {
            FormatTag::Xlsb
        } else {
            FormatTag::Xlsx
        })
    }
}

/// A wrapper over all decoders when the format is only known at runtime
pub enum Workbook<'a> {
    /// Xls reader
    Xls(Xls),
    /// Xlsx and xlsm reader
    Xlsx(Xlsx<Cursor<&'a [u8]>>),
    /// Xlsb reader
    Xlsb(Xlsb<Cursor<&'a [u8]>>),
}

impl<'a> Workbook<'a> {
    /// Opens a workbook of a tag given as text
    pub fn open(format_tag: &str, bytes: &'a [u8]) -> Result<Self, Error> {
        Workbook::from_format(format_tag.parse()?, bytes)
    }

    /// Opens a workbook, reading its sheet directory and string tables
    pub fn from_format(format: FormatTag, bytes: &'a [u8]) -> Result<Self, Error> {
        debug!("opening {} bytes as {format}", bytes.len());
        Ok(match format {
            FormatTag::Xls => Workbook::Xls(Xls::new(bytes).map_err(Error::Xls)?),
            FormatTag::Xlsx | FormatTag::Xlsm => {
                Workbook::Xlsx(Xlsx::new(Cursor::new(bytes)).map_err(Error::Xlsx)?)
            }
            FormatTag::Xlsb => Workbook::Xlsb(Xlsb::new(Cursor::new(bytes)).map_err(Error::Xlsb)?),
        })
    }

    /// Sheet names in declaration order
    pub fn sheet_names(&self) -> Vec<String> {
        match self {
            Workbook::Xls(e) => e.directory().sheet_names(),
            Workbook::Xlsx(e) => e.directory().sheet_names(),
            Workbook::Xlsb(e) => e.directory().sheet_names(),
        }
    }

    /// Sheet metadata in declaration order
    pub fn sheets(&self) -> Vec<Sheet> {
        match self {
            Workbook::Xls(e) => e.directory().sheets(),
            Workbook::Xlsx(e) => e.directory().sheets(),
            Workbook::Xlsb(e) => e.directory().sheets(),
        }
    }

    /// Locates a sheet and decodes it
    pub fn worksheet_table(
        &mut self,
        selector: &SheetSelector,
        options: &ParseOptions,
    ) -> Result<WorksheetTable, Error> {
        debug!("reading sheet {selector}");
        match self {
            Workbook::Xls(e) => {
                let entry = e.directory().locate(selector)?;
                e.worksheet_table(entry, options).map_err(Error::Xls)
            }
            Workbook::Xlsx(e) => {
                let entry = e.directory().locate(selector)?.clone();
                e.worksheet_table(&entry, options).map_err(Error::Xlsx)
            }
            Workbook::Xlsb(e) => {
                let entry = e.directory().locate(selector)?.clone();
                e.worksheet_table(&entry, options).map_err(Error::Xlsb)
            }
        }
    }
}
