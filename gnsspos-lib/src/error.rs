use std::path::PathBuf;

use crate::pos::CoordinateType;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("file not found: {0:?}")]
    FileNotFound(PathBuf),

    /// Wrong file type, unrecognized header line, or missing required header content.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The log is a recognized variant that cannot be parsed.
    #[error("unsupported coordinate type: {0}")]
    UnsupportedCoordinates(CoordinateType),

    /// A body line could not be parsed; aborts parsing of the whole file.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number in the source file
        line: usize,
        reason: String,
    },

    /// An occupation window selected no usable trajectory records.
    #[error("no data in window for point {0}")]
    EmptyWindow(String),

    #[error("invalid calendar time: {0}")]
    InvalidTime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for every error that indicates the input is not a supported file format.
    #[must_use]
    pub fn is_invalid_format(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_) | Error::UnsupportedCoordinates(_)
        )
    }

    pub(crate) fn malformed<S: Into<String>>(line: usize, reason: S) -> Self {
        Error::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
