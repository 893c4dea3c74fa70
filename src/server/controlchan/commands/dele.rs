//! The RFC 959 Delete (`DELE`) command.

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
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub struct Dele {
    path: String,
}

impl Dele {
    pub fn new(path: String) -> Self {
        Dele { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Dele
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let session = args.session.lock().await;
        let storage = Arc::clone(&session.storage);
        let user = match session.user.as_ref() {
            Some(user) => user,
            None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
        };
        let resolved = match chroot::resolve(user, &session.cwd, Path::new(&self.path)) {
            Ok(path) => path,
            Err(err) => return Ok(storage_error_reply(err)),
        };
        if !user.storage_permissions().contains(StoragePermissions::DEL) {
            return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
        }

        match storage.del(user, resolved).await {
            Ok(()) => Ok(Reply::new(ReplyCode::FileActionOkay, "File successfully removed")),
            Err(err) => {
                slog::warn!(args.logger, "DELE failed: {}", err);
                Ok(storage_error_reply(err))
            }
        }
    }
}
