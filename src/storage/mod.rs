//! Contains the [`StorageBackend`] trait that must be implemented to create
//! a storage back-end for tenftp, along with the error taxonomy shared by
//! all back-ends.
//!
//! The `tenftp-sbe-fs`, `tenftp-sbe-objstore` and `tenftp-sbe-webdav` crates
//! implement this trait over a mounted directory, an S3-compatible bucket
//! and a WebDAV share respectively. The contract is written so that callers
//! never need to know which one is in use; in particular, back-ends without
//! native directories must synthesize directory metadata and listing
//! entries (see the trait documentation).

mod error;
pub use error::{Error, ErrorKind};

mod storage_backend;
pub use storage_backend::{FEATURE_RESTART, Fileinfo, Metadata, Permissions, Result, StorageBackend, mlsx_line};
