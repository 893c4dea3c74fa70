//! The RFC 2428 Extended Passive Mode (`EPSV`) command. Same dance as PASV
//! with an address-family-neutral reply.

use super::passive_common;
use crate::{
    auth::UserDetail,
    server::controlchan::{
        Reply, ReplyCode,
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Epsv;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Epsv
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let port = match passive_common::start_passive_listener(&args).await {
            Some(port) => port,
            None => return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "No data connection established")),
        };

        Ok(Reply::new_with_string(
            ReplyCode::EnteringExtendedPassiveMode,
            format!("Entering Extended Passive Mode (|||{}|)", port),
        ))
    }
}
