//! The RFC 959 Password (`PASS`) command: authenticates the candidate
//! username against the control plane and, on success, binds the session to
//! the identity and materialises its storage binding.

use crate::{
    auth::{Credentials, UserDetail},
    metrics,
    server::{
        controlchan::{
            Reply, ReplyCode,
            error::{ControlChanError, ControlChanErrorKind},
            handler::{CommandContext, CommandHandler},
        },
        password::Password,
        session::SessionState,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug)]
pub struct Pass {
    password: Password,
}

impl Pass {
    pub fn new(password: Password) -> Self {
        Pass { password }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Pass
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        if session.state != SessionState::WaitPass {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "Please supply a username first"));
        }
        let username = match session.username.clone() {
            Some(username) => username,
            None => return Err(ControlChanError::new(ControlChanErrorKind::IllegalState)),
        };

        let creds = Credentials {
            password: Some(String::from_utf8_lossy(self.password.as_ref()).to_string()),
            source_ip: session.source.ip(),
        };
        match args.authenticator.authenticate(&username, &creds).await {
            Ok(user_detail) => {
                if !user_detail.account_enabled() {
                    slog::warn!(args.logger, "Login denied, account disabled"; "username" => %username);
                    metrics::add_auth_failure("user_disabled");
                    return Ok(Reply::new(ReplyCode::NotLoggedIn, "Account is disabled"));
                }

                // Materialise the session's storage binding. Using
                // Arc::get_mut works because the control loop is strictly
                // serial per session: nothing else holds a clone while PASS
                // is being serviced.
                match Arc::get_mut(&mut session.storage).map(|storage| storage.enter(&user_detail)) {
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        slog::error!(args.logger, "Failed to bind storage for user: {}", err; "username" => %username);
                        metrics::add_auth_failure("secret_error");
                        return Ok(Reply::new(ReplyCode::NotLoggedIn, "Storage unavailable"));
                    }
                    None => {
                        slog::error!(args.logger, "Session storage unexpectedly shared during PASS");
                        return Err(ControlChanError::new(ControlChanErrorKind::InternalServerError));
                    }
                }

                metrics::add_auth_success(user_detail.auth_method().as_str());
                args.bindings.bind(session.id, &username);
                slog::info!(args.logger, "Login successful"; "username" => %username, "method" => user_detail.auth_method().as_str());

                session.user = Arc::new(Some(user_detail));
                session.state = SessionState::WaitCmd;
                session.cwd = "/".into();
                Ok(Reply::new(ReplyCode::UserLoggedIn, "User logged in, proceed"))
            }
            Err(err) => {
                slog::warn!(args.logger, "Login failed: {}", err; "username" => %username);
                metrics::add_auth_failure(err.reason_label());
                session.state = SessionState::New;
                session.username = None;
                Ok(Reply::new(ReplyCode::NotLoggedIn, "Authentication failed"))
            }
        }
    }
}
