//! The RFC 959 File Structure (`STRU`) command. Only the File structure is
//! supported.

use crate::{
    auth::UserDetail,
    server::controlchan::{
        Reply, ReplyCode,
        command::StruParam,
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Stru {
    structure: StruParam,
}

impl Stru {
    pub fn new(structure: StruParam) -> Self {
        Stru { structure }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Stru
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, _args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        match self.structure {
            StruParam::File => Ok(Reply::new(ReplyCode::CommandOkay, "Using File structure")),
            _ => Ok(Reply::new(
                ReplyCode::CommandNotImplementedForParameter,
                "Only File structure is supported",
            )),
        }
    }
}
