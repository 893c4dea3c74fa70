//! Contains the error type reported by [`Server`](crate::Server) setup and
//! runtime.

use crate::server::controlchan::ControlChanError;
use thiserror::Error;

/// Errors returned when building or running a [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bind address could not be parsed.
    #[error("invalid bind address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// The configured passive port range is malformed.
    #[error("invalid passive port range: {0}")]
    InvalidPassivePorts(String),

    /// Binding or accepting on the control port failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A control channel could not be spawned.
    #[error("control channel error: {0}")]
    ControlChan(#[from] ControlChanError),

    /// In-flight sessions did not finish within the drain window.
    #[error("shutdown error: {msg}")]
    Shutdown {
        /// Tells what went wrong during shutdown.
        msg: String,
    },
}
