//! The RFC 2228 Authentication/Security Mechanism (`AUTH`) command.
//! This deployment terminates TLS outside the server, so channel security
//! negotiation is refused.

use crate::{
    auth::UserDetail,
    server::controlchan::{
        Reply, ReplyCode,
        command::AuthParam,
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Auth {
    protocol: AuthParam,
}

impl Auth {
    pub fn new(protocol: AuthParam) -> Self {
        Auth { protocol }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Auth
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        slog::debug!(args.logger, "AUTH {:?} refused, no TLS layer configured", self.protocol);
        Ok(Reply::new(ReplyCode::CommandNotImplemented, "TLS is not configured on this server"))
    }
}
