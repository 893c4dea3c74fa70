#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! Record-driven identity for [tenftp](https://crates.io/crates/tenftp).
//!
//! A tenftp deployment keeps its users, storage back-ends and secrets as
//! declarative records in an external control plane. This crate contains:
//!
//! * the typed record model ([`records`]),
//! * the [`RecordSource`] read interface over that store plus a JSON file
//!   implementation ([`FileSource`]) for self-contained deployments,
//! * a snapshot [`RecordCache`] with interval refresh and user change
//!   events,
//! * the credential [`resolve`] functions that materialise passwords and
//!   backend credentials from secrets, and
//! * [`RegistryAuthenticator`], the `tenftp` [`Authenticator`] that drives
//!   logins from user records.
//!
//! Secrets are intentionally *not* cached: every login and every backend
//! bind re-reads the secret so that rotated credentials take effect on the
//! next session.
//!
//! [`Authenticator`]: tenftp::auth::Authenticator

mod authenticator;
mod cache;
pub mod records;
pub mod resolve;
mod source;

pub use authenticator::{RegistryAuthenticator, TenantUser};
pub use cache::{RecordCache, UserEvent};
pub use source::{FileSource, MemorySource, RecordSet, RecordSource, SourceError};
