//! The service provider interface (SPI) for authentication.

use super::UserDetail;

use async_trait::async_trait;
use std::fmt::Debug;
use std::net::IpAddr;
use thiserror::Error;

/// The payload of a login attempt as seen by an [`Authenticator`].
#[derive(Clone, Debug)]
pub struct Credentials {
    /// The password given with PASS, if any was given.
    pub password: Option<String>,
    /// The source IP of the control connection.
    pub source_ip: IpAddr,
}

/// Defines the requirements for authentication implementations.
#[async_trait]
pub trait Authenticator<User>: Send + Sync + Debug
where
    User: UserDetail,
{
    /// Authenticate the given user with the given credentials. On success the
    /// returned [`UserDetail`] carries everything the engine needs to know
    /// about the user: home directory, confinement, permissions.
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<User, AuthenticationError>;

    /// Implement to set the name of the authenticator. By default it returns the type signature.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The error returned by [`Authenticator::authenticate`]. Every variant maps
/// to a 530 reply; the variants exist so that denial reasons can be counted
/// and logged distinctly.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// No user record exists for the presented username.
    #[error("user not found")]
    BadUser,

    /// The user record exists but is administratively disabled.
    #[error("user disabled")]
    AccountDisabled,

    /// The presented password did not match.
    #[error("bad password")]
    BadPassword,

    /// The password (or the secret it lives in) could not be materialised.
    #[error("secret error: {0}")]
    SecretError(String),

    /// Anything else the implementation wants to surface.
    #[error("{0}")]
    ImplPropagated(String),
}

impl AuthenticationError {
    /// Creates an implementation-specific error from a message.
    pub fn new<M: Into<String>>(msg: M) -> Self {
        AuthenticationError::ImplPropagated(msg.into())
    }

    /// Creates a secret materialisation error, preserving the source message.
    pub fn secret<E: std::fmt::Display>(err: E) -> Self {
        AuthenticationError::SecretError(err.to_string())
    }

    /// A short stable label for metrics and logs.
    pub fn reason_label(&self) -> &'static str {
        match self {
            AuthenticationError::BadUser => "user_not_found",
            AuthenticationError::AccountDisabled => "user_disabled",
            AuthenticationError::BadPassword => "invalid_password",
            AuthenticationError::SecretError(_) => "secret_error",
            AuthenticationError::ImplPropagated(_) => "other",
        }
    }
}
