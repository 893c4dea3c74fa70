#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! tenftp is an async, multi-tenant FTP server library.
//!
//! Unlike a traditional FTP daemon, a tenftp deployment gets its users,
//! credentials and storage placement from declarative records kept in an
//! external control plane. This crate contains the tenant-agnostic engine:
//! the control- and data-channel protocol handling, the per-session state
//! machine, the chroot-style path confinement and the service provider
//! interfaces for authentication ([`auth::Authenticator`]) and storage
//! ([`storage::StorageBackend`]).
//!
//! The record-driven pieces live in satellite crates: `tenftp-registry`
//! resolves users and credentials from control-plane records and the
//! `tenftp-sbe-*` crates implement the storage back-ends (local filesystem,
//! S3-compatible object store, WebDAV). The `tenftpd` binary wires them
//! together.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tenftp::ServerBuilder;
//! use tenftp::auth::AnonymousAuthenticator;
//! # use tenftp::auth::DefaultUser;
//! # #[derive(Debug)] struct Vfs;
//! # impl Vfs { fn new() -> Vfs { Vfs } }
//! # // A StorageBackend implementation is required; see the tenftp-sbe-* crates.
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//! # /*
//!     let server = ServerBuilder::with_authenticator(
//!         Box::new(move || Vfs::new()),
//!         Arc::new(AnonymousAuthenticator),
//!     )
//!     .greeting("Welcome to my FTP server")
//!     .passive_ports(10000..=10019)
//!     .build()
//!     .unwrap();
//!
//!     server.listen("127.0.0.1:2121").await.unwrap();
//! # */
//! }
//! ```

pub mod auth;
pub(crate) mod metrics;
pub(crate) mod server;
pub mod storage;

pub use crate::server::ftpserver::{Server, ServerBuilder, error::ServerError, options};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
