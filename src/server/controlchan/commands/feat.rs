//! The RFC 2389 Feature (`FEAT`) command: lists the extensions we support.

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
pub struct Feat;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Feat
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut lines = vec!["Extensions supported:".to_string()];
        lines.push("UTF8".to_string());
        lines.push("SIZE".to_string());
        lines.push("MDTM".to_string());
        lines.push("EPSV".to_string());
        lines.push("MLST type*;size*;modify*;".to_string());
        if args.storage_features & storage::FEATURE_RESTART > 0 {
            lines.push("REST STREAM".to_string());
        }
        lines.push("END".to_string());
        Ok(Reply::new_multiline(ReplyCode::SystemStatus, lines))
    }
}
