//! The RFC 3659 Restart of Interrupted Transfer (`REST`) command. The
//! offset is honoured by RETR; STOR narrows it back to zero because none of
//! the storage back-ends offer uniform append-at-offset semantics.

use crate::{
    auth::UserDetail,
    storage,
    server::controlchan::{
        Reply, ReplyCode,
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Rest {
    offset: u64,
}

impl Rest {
    pub fn new(offset: u64) -> Self {
        Rest { offset }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Rest
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        if args.storage_features & storage::FEATURE_RESTART == 0 {
            return Ok(Reply::new(ReplyCode::CommandNotImplemented, "Restarts are not supported by the storage back-end"));
        }
        let mut session = args.session.lock().await;
        session.start_pos = self.offset;
        Ok(Reply::new_with_string(
            ReplyCode::FileActionPending,
            format!("Restarting at {}. Send STORE or RETRIEVE", self.offset),
        ))
    }
}
