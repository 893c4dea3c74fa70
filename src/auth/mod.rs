//! Contains the [`Authenticator`] and [`UserDetail`] traits that tenftp uses
//! to authenticate a session and to learn what an authenticated user may do.
//!
//! The production implementation lives in the `tenftp-registry` crate and
//! answers both questions from control-plane records. Implement these traits
//! yourself to plug in a different identity source:
//!
//! ```no_run
//! use tenftp::auth::{Authenticator, AuthenticationError, Credentials, DefaultUser};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct AcceptEveryone;
//!
//! #[async_trait]
//! impl Authenticator<DefaultUser> for AcceptEveryone {
//!     async fn authenticate(&self, _username: &str, _creds: &Credentials) -> Result<DefaultUser, AuthenticationError> {
//!         Ok(DefaultUser)
//!     }
//! }
//! ```

mod anonymous;
mod authenticator;
mod user;

pub use anonymous::AnonymousAuthenticator;
pub use authenticator::{AuthenticationError, Authenticator, Credentials};
pub use user::{AuthMethod, DefaultUser, StoragePermissions, UserDetail};
