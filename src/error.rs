//! Library-wide error, result and IOS return-code types.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Every variant maps onto the [`ReturnCode`] IOS would hand back to the
/// guest for that condition (see [`Error::return_code`]), so command handlers
/// only need to pick the right variant.
#[derive(Debug, Error)]
pub enum Error {
    /// The request's buffers have the wrong count, size or alignment, or a
    /// request argument is otherwise unacceptable.
    #[error("invalid parameter size or alignment")]
    InvalidParameters,
    /// A TMD is too small for its header or its content records.
    #[error("invalid TMD")]
    InvalidTmd,
    /// A ticket has an unknown signature type or is truncated.
    #[error("invalid ticket")]
    InvalidTicket,
    /// No installed (or WAD-provided) title matches the title ID.
    #[error("title {0:016x} not found")]
    TitleNotFound(u64),
    /// The title has no content with the requested index or ID.
    #[error("content not found")]
    ContentNotFound,
    /// Installing content requires a ticket that is not on the NAND.
    #[error("no ticket installed for title {0:016x}")]
    NoTicketInstalled(u64),
    /// The operation needs an active title and none is set.
    #[error("no active title")]
    NoActiveTitle,
    /// A content source returned fewer bytes than requested.
    #[error("read less data than expected")]
    ShortRead,
    /// Persisting data to the NAND failed.
    #[error("write failure")]
    WriteFailure,
    /// A content import was started while another one is still in flight.
    #[error("another content import is still in progress")]
    ContentImportInProgress,
    /// The export session is missing, already open, or in the wrong state.
    #[error("invalid title export state")]
    InvalidExportState,
    /// AES-CBC input that is not a whole number of blocks.
    #[error("data length {0} is not a multiple of the AES block size")]
    UnalignedLength(usize),
    /// A key table slot outside the table.
    #[error("unknown key index {0}")]
    UnknownKeyIndex(u32),
    /// Deleting a core system title is not allowed.
    #[error("title {0:016x} is protected")]
    ProtectedTitle(u64),
    /// A filesystem operation was refused.
    #[error("access denied")]
    AccessDenied,
    /// A content file descriptor that is not open, or a content open that
    /// failed.
    #[error("bad content file descriptor")]
    BadContentHandle,
    /// A guest address range that is not backed by emulated memory.
    #[error("invalid guest address range {address:#010x}+{size:#x}")]
    InvalidAddress { address: u32, size: u32 },
    /// A structural constraint was violated (message describes which one).
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// The data ended before all expected bytes could be read.
    #[error("unexpected end of data")]
    UnexpectedEof,
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The IOS result code reported to the guest for this error.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Error::InvalidParameters
            | Error::InvalidTicket
            | Error::ContentNotFound
            | Error::NoActiveTitle
            | Error::InvalidExportState
            | Error::UnalignedLength(_)
            | Error::UnknownKeyIndex(_)
            | Error::ProtectedTitle(_)
            | Error::InvalidAddress { .. }
            | Error::Parse(_)
            | Error::UnexpectedEof => ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT,
            Error::InvalidTmd => ReturnCode::ES_INVALID_TMD,
            Error::TitleNotFound(_) => ReturnCode::FS_ENOENT,
            Error::NoTicketInstalled(_) => ReturnCode::ES_NO_TICKET_INSTALLED,
            Error::ShortRead => ReturnCode::ES_READ_LESS_DATA_THAN_EXPECTED,
            Error::WriteFailure | Error::ContentImportInProgress | Error::Io(_) => {
                ReturnCode::ES_WRITE_FAILURE
            }
            Error::AccessDenied => ReturnCode::FS_EACCESS,
            Error::BadContentHandle => ReturnCode::IPC_EACCES,
        }
    }
}

/// Signed 32-bit IOS result code. Zero and positive values are successes.
///
/// A newtype rather than an enum because IOS reuses values across
/// subsystems (`FS_ENOENT` and `ES_INVALID_TMD` are both -106).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(pub i32);

impl ReturnCode {
    pub const SUCCESS: Self = Self(0);
    /// Returned for unknown content file descriptors and failed opens.
    pub const IPC_EACCES: Self = Self(-1);
    pub const FS_EACCESS: Self = Self(-102);
    pub const FS_ENOENT: Self = Self(-106);
    pub const ES_INVALID_TMD: Self = Self(-106);
    pub const ES_READ_LESS_DATA_THAN_EXPECTED: Self = Self(-1009);
    pub const ES_WRITE_FAILURE: Self = Self(-1010);
    pub const ES_PARAMETER_SIZE_OR_ALIGNMENT: Self = Self(-1017);
    pub const ES_NO_TICKET_INSTALLED: Self = Self(-1028);

    /// Whether this code reports success.
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ReturnCode> for i32 {
    fn from(code: ReturnCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_resolution_failures_keep_distinct_codes() {
        assert_eq!(Error::TitleNotFound(1).return_code(), ReturnCode::FS_ENOENT);
        assert_eq!(
            Error::NoTicketInstalled(1).return_code(),
            ReturnCode::ES_NO_TICKET_INSTALLED
        );
        assert_eq!(
            Error::ShortRead.return_code(),
            ReturnCode::ES_READ_LESS_DATA_THAN_EXPECTED
        );
        assert_ne!(Error::ShortRead.return_code(), Error::TitleNotFound(1).return_code());
    }

    #[test]
    fn policy_violations_report_parameter_errors() {
        assert_eq!(
            Error::ProtectedTitle(0x0000_0001_0000_0001).return_code(),
            ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT
        );
        assert_eq!(
            Error::ContentImportInProgress.return_code(),
            ReturnCode::ES_WRITE_FAILURE
        );
    }

    #[test]
    fn success_is_non_negative() {
        assert!(ReturnCode::SUCCESS.is_success());
        assert!(ReturnCode(5).is_success());
        assert!(!ReturnCode::IPC_EACCES.is_success());
    }
}
