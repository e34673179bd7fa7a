//! Compound File Binary format MS-CFB
//!
//! Read-only access to the streams of an in-memory compound file, enough to
//! pull the `Workbook` stream out of an xls file or to recognize an encrypted
//! OOXML package.

use std::fmt;

use encoding_rs::UTF_16LE;
use log::{debug, warn};

use crate::utils::{read_u16, read_u32, read_usize};

const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const HEADER_LEN: usize = 512;
const DIRECTORY_LEN: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const HEADER_DIFAT_LEN: usize = 109;

/// A Cfb specific error
#[derive(Debug)]
pub enum CfbError {
    /// Not a compound file
    Ole,
    /// The buffer ends inside the header
    TruncatedHeader(usize),
    /// Sector shift is neither 9 nor 12
    SectorShift(u16),
    /// Header field out of its valid range
    InvalidHeader {
        /// field name
        field: &'static str,
        /// value found
        value: usize,
    },
    /// Sector id points outside of the buffer
    SectorOutOfRange {
        /// sector id
        id: u32,
        /// buffer length
        len: usize,
    },
    /// Sector chain loops or never ends
    CyclicChain(u32),
    /// Stream shorter than its directory entry claims
    TruncatedStream {
        /// stream name
        name: String,
        /// declared size
        expected: usize,
        /// bytes reachable through the sector chain
        found: usize,
    },
    /// Empty root directory
    EmptyRootDir,
    /// Stream not found
    StreamNotFound(String),
}

impl fmt::Display for CfbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfbError::Ole => write!(f, "Invalid OLE signature (not an office document?)"),
            CfbError::TruncatedHeader(len) => {
                write!(f, "Compound file header truncated at {len} bytes")
            }
            CfbError::SectorShift(s) => {
                write!(f, "Invalid sector shift, expecting 0x09 or 0x0C, got {s:#x}")
            }
            CfbError::InvalidHeader { field, value } => {
                write!(f, "Invalid compound file header, {field} is {value}")
            }
            CfbError::SectorOutOfRange { id, len } => {
                write!(f, "Sector {id} is out of range of a {len} bytes file")
            }
            CfbError::CyclicChain(start) => {
                write!(f, "Sector chain starting at {start} does not terminate")
            }
            CfbError::TruncatedStream {
                name,
                expected,
                found,
            } => write!(
                f,
                "Stream '{name}' is truncated: expecting {expected} bytes, found {found}"
            ),
            CfbError::EmptyRootDir => write!(f, "Empty Root directory"),
            CfbError::StreamNotFound(s) => write!(f, "Cannot find '{s}' stream"),
        }
    }
}

impl std::error::Error for CfbError {}

/// A struct for managing Compound File Binary format
pub struct Cfb<'a> {
    data: &'a [u8],
    sector_size: usize,
    mini_cutoff: usize,
    fats: Vec<u32>,
    mini_fats: Vec<u32>,
    mini_stream: Vec<u8>,
    directories: Vec<Directory>,
}

impl<'a> Cfb<'a> {
    /// Checks the OLE signature without parsing anything else
    pub fn is_cfb(data: &[u8]) -> bool {
        data.starts_with(&OLE_SIGNATURE)
    }

    /// Create a new `Cfb`
    ///
    /// Reads header, FAT, directories, mini FAT and the mini stream.
    pub fn new(data: &'a [u8]) -> Result<Cfb<'a>, CfbError> {
        if !Cfb::is_cfb(data) {
            return Err(CfbError::Ole);
        }
        let h = Header::from_slice(data)?;
        debug!(
            "cfb: sector size {}, {} fat sectors, {} difat sectors",
            h.sector_size, h.fat_len, h.difat_len
        );

        // every fat, difat and mini fat sector must fit in the buffer
        let max_sectors = data.len() / h.sector_size;
        for (field, value) in [
            ("csectFat", h.fat_len),
            ("csectDif", h.difat_len),
            ("csectMiniFat", h.mini_fat_len),
        ] {
            if value > max_sectors {
                return Err(CfbError::InvalidHeader { field, value });
            }
        }

        let mut cfb = Cfb {
            data,
            sector_size: h.sector_size,
            mini_cutoff: h.mini_cutoff,
            fats: Vec::new(),
            mini_fats: Vec::new(),
            mini_stream: Vec::new(),
            directories: Vec::new(),
        };

        // difat: 109 entries in the header, then a chain of difat sectors
        // whose last entry points to the next one
        let mut difat = h.difat;
        let mut sector_id = h.difat_start;
        let mut seen = 0;
        while sector_id != FREESECT && sector_id != ENDOFCHAIN {
            if seen > h.difat_len.max(data.len() / cfb.sector_size) {
                return Err(CfbError::CyclicChain(h.difat_start));
            }
            let (entries, next) = cfb.sector(sector_id)?.split_at(cfb.sector_size - 4);
            difat.extend(entries.chunks_exact(4).map(read_u32));
            sector_id = read_u32(next);
            seen += 1;
        }

        let mut fats = Vec::new();
        for id in difat
            .into_iter()
            .filter(|id| *id != FREESECT)
            .take(h.fat_len)
        {
            fats.extend(cfb.sector(id)?.chunks_exact(4).map(read_u32));
        }
        cfb.fats = fats;

        let dirs = cfb.chain(h.dir_start)?;
        cfb.directories = dirs
            .chunks_exact(DIRECTORY_LEN)
            .map(|c| Directory::from_slice(c, cfb.sector_size))
            .collect();
        let root = match cfb.directories.first() {
            Some(root) if root.start != ENDOFCHAIN || root.len == 0 => root.clone(),
            _ => return Err(CfbError::EmptyRootDir),
        };

        if h.mini_fat_len > 0 && h.mini_fat_start != ENDOFCHAIN {
            let mini_fats = cfb.chain(h.mini_fat_start)?;
            cfb.mini_fats = mini_fats.chunks_exact(4).map(read_u32).collect();
        }
        if root.len > 0 {
            let mut mini_stream = cfb.chain(root.start)?;
            mini_stream.truncate(root.len);
            cfb.mini_stream = mini_stream;
        }
        Ok(cfb)
    }

    /// Checks if directory exists
    pub fn has_directory(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Gets a stream by name out of directories
    pub fn get_stream(&self, name: &str) -> Result<Vec<u8>, CfbError> {
        debug!("get stream {name}");
        let d = self
            .find(name)
            .ok_or_else(|| CfbError::StreamNotFound(name.to_string()))?;
        let mut stream = if d.len < self.mini_cutoff {
            self.mini_chain(d.start, d.len)?
        } else {
            self.chain(d.start)?
        };
        if stream.len() < d.len {
            return Err(CfbError::TruncatedStream {
                name: name.to_string(),
                expected: d.len,
                found: stream.len(),
            });
        }
        stream.truncate(d.len);
        Ok(stream)
    }

    fn find(&self, name: &str) -> Option<&Directory> {
        self.directories
            .iter()
            .skip(1)
            .find(|d| d.is_stream && d.name.eq_ignore_ascii_case(name))
    }

    /// Sector `id` starts right after the header sector, it is always
    /// `sector_size` long
    fn sector(&self, id: u32) -> Result<&'a [u8], CfbError> {
        let start = (id as usize + 1).saturating_mul(self.sector_size);
        self.data
            .get(start..start.saturating_add(self.sector_size))
            .ok_or(CfbError::SectorOutOfRange {
                id,
                len: self.data.len(),
            })
    }

    fn chain(&self, start: u32) -> Result<Vec<u8>, CfbError> {
        let mut chain = Vec::new();
        let mut sector_id = start;
        let mut steps = 0;
        while sector_id != ENDOFCHAIN {
            if steps > self.data.len() / self.sector_size {
                return Err(CfbError::CyclicChain(start));
            }
            chain.extend_from_slice(self.sector(sector_id)?);
            sector_id = match self.fats.get(sector_id as usize) {
                Some(next) => *next,
                None => {
                    return Err(CfbError::SectorOutOfRange {
                        id: sector_id,
                        len: self.data.len(),
                    })
                }
            };
            steps += 1;
        }
        Ok(chain)
    }

    fn mini_chain(&self, start: u32, len: usize) -> Result<Vec<u8>, CfbError> {
        let mut chain = Vec::with_capacity(len.min(self.mini_stream.len()));
        let mut sector_id = start;
        let mut steps = 0;
        while sector_id != ENDOFCHAIN && chain.len() < len {
            if steps > self.mini_fats.len() {
                return Err(CfbError::CyclicChain(start));
            }
            let from = sector_id as usize * MINI_SECTOR_SIZE;
            let to = (from + MINI_SECTOR_SIZE).min(self.mini_stream.len());
            if from >= to {
                return Err(CfbError::SectorOutOfRange {
                    id: sector_id,
                    len: self.mini_stream.len(),
                });
            }
            chain.extend_from_slice(&self.mini_stream[from..to]);
            sector_id = self
                .mini_fats
                .get(sector_id as usize)
                .copied()
                .unwrap_or(ENDOFCHAIN);
            steps += 1;
        }
        Ok(chain)
    }
}

/// A hidden struct which defines cfb files structure
struct Header {
    sector_size: usize,
    mini_cutoff: usize,
    fat_len: usize,
    dir_start: u32,
    mini_fat_start: u32,
    mini_fat_len: usize,
    difat_start: u32,
    difat_len: usize,
    difat: Vec<u32>,
}

impl Header {
    fn from_slice(buf: &[u8]) -> Result<Header, CfbError> {
        if buf.len() < HEADER_LEN {
            return Err(CfbError::TruncatedHeader(buf.len()));
        }
        let sector_size = match read_u16(&buf[30..32]) {
            0x0009 => 512,
            0x000C => 4096,
            s => return Err(CfbError::SectorShift(s)),
        };
        let mini_cutoff = match read_usize(&buf[56..60]) {
            4096 => 4096,
            value => {
                return Err(CfbError::InvalidHeader {
                    field: "ulMiniSectorCutoff",
                    value,
                })
            }
        };
        let difat = buf[76..76 + HEADER_DIFAT_LEN * 4]
            .chunks_exact(4)
            .map(read_u32)
            .collect();
        Ok(Header {
            sector_size,
            mini_cutoff,
            fat_len: read_usize(&buf[44..48]),
            dir_start: read_u32(&buf[48..52]),
            mini_fat_start: read_u32(&buf[60..64]),
            mini_fat_len: read_usize(&buf[64..68]),
            difat_start: read_u32(&buf[68..72]),
            difat_len: read_usize(&buf[72..76]),
            difat,
        })
    }
}

/// A directory entry (MS-CFB 2.6)
#[derive(Clone)]
struct Directory {
    name: String,
    is_stream: bool,
    start: u32,
    len: usize,
}

impl Directory {
    fn from_slice(buf: &[u8], sector_size: usize) -> Directory {
        let name_len = (read_u16(&buf[64..66]) as usize).min(64);
        let name = UTF_16LE
            .decode(&buf[..name_len.saturating_sub(2)])
            .0
            .into_owned();
        let start = read_u32(&buf[116..120]);
        let len = if sector_size == 512 {
            // version 3 files only use the low 32 bits
            read_u32(&buf[120..124]) as u64
        } else {
            u64::from(read_u32(&buf[120..124])) | (u64::from(read_u32(&buf[124..128])) << 32)
        };
        let len = usize::try_from(len).unwrap_or_else(|_| {
            warn!("directory '{name}' declares an oversized stream");
            usize::MAX
        });
        Directory {
            name,
            is_stream: buf[66] == 2,
            start,
            len,
        }
    }
}
