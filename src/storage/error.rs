use crate::BoxError;
use derive_more::Display;
use thiserror::Error;

/// The Error returned by storage back-ends. Storage back-end implementations
/// should choose the `ErrorKind` carefully since that determines the reply
/// the FTP client sees.
#[derive(Debug, Error)]
#[error("storage error: {kind}")]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates a new storage error with a source error attached.
    pub fn new<E>(kind: ErrorKind, error: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error {
            kind,
            source: Some(error.into()),
        }
    }

    /// Detailed information about what the FTP server should do with the failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }
}

/// The `ErrorKind` variants that can be produced by [`StorageBackend`](super::StorageBackend)
/// implementations. The number in the display string is the FTP reply code
/// the engine sends for it.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ErrorKind {
    /// 450. The file is not available right now but a retry may succeed, for
    /// example when the back-end rate-limits or a file is busy.
    #[display("450 Transient file not available")]
    TransientFileNotAvailable,
    /// 550. The file does not exist or is permanently inaccessible.
    #[display("550 Permanent file not available")]
    PermanentFileNotAvailable,
    /// 550. The directory does not exist, or the path is not a directory.
    #[display("550 Permanent directory not available")]
    PermanentDirectoryNotAvailable,
    /// 550. The directory is not empty and the operation is non-recursive.
    #[display("550 The directory is not empty")]
    PermanentDirectoryNotEmpty,
    /// 550. The chroot confinement or a permission bit denied the operation.
    #[display("550 Permission denied")]
    PermissionDenied,
    /// 550. The back-end is configured read-only.
    #[display("550 Storage is read-only")]
    ReadOnlyStorage,
    /// 451. Post-write verification found fewer or more bytes than were
    /// transferred; the incomplete artifact has been removed where possible.
    #[display("451 Written size does not match transferred size")]
    SizeMismatch,
    /// 451. A rename copied the source to the destination but failed to
    /// remove the source. Both names exist.
    #[display("451 Rename incomplete, source still present")]
    PartialRename,
    /// 550. The session's backend credentials could not be (re)materialised.
    #[display("550 Storage credentials unavailable")]
    CredentialError,
    /// 426. The transfer was aborted, by the client or by a network issue.
    #[display("426 Connection closed, transfer aborted")]
    ConnectionClosed,
    /// 451. The requested action was aborted because of a local processing
    /// error, including transient back-end transport failures.
    #[display("451 Local error")]
    LocalError,
    /// 452. Insufficient storage space on the back-end.
    #[display("452 Insufficient storage space error")]
    InsufficientStorageSpaceError,
    /// 552. The declared or streamed size exceeds the configured per-file cap.
    #[display("552 Exceeded storage allocation error")]
    ExceededStorageAllocationError,
    /// 553. The requested action was not taken because of an illegal file name.
    #[display("553 File name not allowed error")]
    FileNameNotAllowedError,
    /// 502. The back-end does not implement this operation.
    #[display("502 Command not implemented")]
    CommandNotImplemented,
}

// Maps IO errors to FTP errors in a sensible way: capture the permanent
// failures, assume the rest is retryable for the client.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::NotFound => ErrorKind::PermanentFileNotAvailable,
            // Could also be a directory, but we don't know
            Io::AlreadyExists => ErrorKind::PermanentFileNotAvailable,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::NotADirectory | Io::IsADirectory => ErrorKind::PermanentDirectoryNotAvailable,
            Io::DirectoryNotEmpty => ErrorKind::PermanentDirectoryNotEmpty,
            Io::StorageFull => ErrorKind::InsufficientStorageSpaceError,
            Io::ReadOnlyFilesystem => ErrorKind::ReadOnlyStorage,
            Io::InvalidFilename => ErrorKind::FileNameNotAllowedError,
            // Client most likely aborted the connection or there was a network issue
            Io::ConnectionReset | Io::BrokenPipe | Io::ConnectionAborted => ErrorKind::ConnectionClosed,
            // Other errors are assumed to be local transient problems, retryable for the client
            _ => ErrorKind::LocalError,
        };
        Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn io_not_found_becomes_permanent() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(err.kind(), ErrorKind::PermanentFileNotAvailable);
    }

    #[test]
    fn io_unknown_becomes_local_error() {
        let err: Error = std::io::Error::other("boom").into();
        assert_eq!(err.kind(), ErrorKind::LocalError);
    }
}
