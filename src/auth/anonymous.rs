use super::{AuthenticationError, Authenticator, Credentials, DefaultUser};
use async_trait::async_trait;

/// [`Authenticator`] implementation that authenticates everyone.
///
/// # Example
///
/// ```rust
/// use tenftp::auth::{Authenticator, AnonymousAuthenticator, Credentials};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let creds = Credentials { password: Some("anything".into()), source_ip: "127.0.0.1".parse().unwrap() };
/// AnonymousAuthenticator.authenticate("ferris", &creds).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator<DefaultUser> for AnonymousAuthenticator {
    async fn authenticate(&self, _username: &str, _creds: &Credentials) -> Result<DefaultUser, AuthenticationError> {
        Ok(DefaultUser)
    }
}
