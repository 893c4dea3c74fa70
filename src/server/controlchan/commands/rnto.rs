//! The RFC 959 Rename To (`RNTO`) command: completes the rename started by
//! RNFR. Both ends of the rename are confinement-checked.

use crate::{
    auth::{StoragePermissions, UserDetail},
    server::{
        chroot,
        controlchan::{
            Reply, ReplyCode,
            commands::storage_error_reply,
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
        },
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub struct Rnto {
    file: PathBuf,
}

impl Rnto {
    pub fn new(file: PathBuf) -> Self {
        Rnto { file }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Rnto
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let storage = Arc::clone(&session.storage);
        let to = {
            let user = match session.user.as_ref() {
                Some(user) => user,
                None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
            };
            let to = match chroot::resolve(user, &session.cwd, &self.file) {
                Ok(path) => path,
                Err(err) => return Ok(storage_error_reply(err)),
            };
            if !user.storage_permissions().contains(StoragePermissions::RENAME) {
                return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
            }
            to
        };

        let from = match session.rename_from.take() {
            Some(from) => from,
            None => return Ok(Reply::new(ReplyCode::BadCommandSequence, "Please tell me what file you want to rename first")),
        };

        match storage.rename(session.user.as_ref().as_ref().unwrap(), from, to).await {
            Ok(()) => Ok(Reply::new(ReplyCode::FileActionOkay, "Renamed")),
            Err(err) => {
                slog::warn!(args.logger, "RNTO failed: {}", err);
                Ok(storage_error_reply(err))
            }
        }
    }
}
