//! `Error` management module
//!
//! Wraps the errors of every format decoder and the failures of sheet and
//! header resolution.

use std::fmt;

use crate::locator::SheetSelector;
use crate::xls::XlsError;
use crate::xlsb::XlsbError;
use crate::xlsx::XlsxError;

/// A struct to handle any error and a message
#[derive(Debug)]
pub enum Error {
    /// Format tag outside of `xls`, `xlsx`, `xlsm` and `xlsb`
    UnsupportedFormat(String),

    /// xls specific error
    Xls(XlsError),
    /// xlsx and xlsm specific error
    Xlsx(XlsxError),
    /// xlsb specific error
    Xlsb(XlsbError),

    /// No sheet matches the selector
    SheetNotFound(SheetSelector),
    /// A header spec entry cannot be resolved to a column
    HeaderNotFound(String),

    /// Transport buffer cannot be written or read
    Transport(serde_json::Error),
}

from_err!(XlsError, Error, Xls);
from_err!(XlsxError, Error, Xlsx);
from_err!(XlsbError, Error, Xlsb);
from_err!(serde_json::Error, Error, Transport);

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown format tag, or bytes of no known container
    UnsupportedFormat,
    /// Bytes that do not decode as the announced container
    MalformedContainer,
    /// Unknown sheet name or ordinal out of range
    SheetNotFound,
    /// Header name absent from the header row
    HeaderNotFound,
    /// Invalid transport buffer
    Transport,
}

impl Error {
    /// Classification of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Xls(_) | Error::Xlsx(_) | Error::Xlsb(_) => ErrorKind::MalformedContainer,
            Error::SheetNotFound(_) => ErrorKind::SheetNotFound,
            Error::HeaderNotFound(_) => ErrorKind::HeaderNotFound,
            Error::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedFormat(tag) => write!(f, "Unsupported format: '{tag}'"),
            Error::Xls(e) => write!(f, "Xls error: {e}"),
            Error::Xlsx(e) => write!(f, "Xlsx error: {e}"),
            Error::Xlsb(e) => write!(f, "Xlsb error: {e}"),
            Error::SheetNotFound(selector) => write!(f, "Cannot find sheet {selector}"),
            Error::HeaderNotFound(header) => write!(f, "Cannot find header named '{header}'"),
            Error::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Xls(e) => Some(e),
            Error::Xlsx(e) => Some(e),
            Error::Xlsb(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}
