//! The RFC 959 Make Directory (`MKD`) command.

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
pub struct Mkd {
    path: PathBuf,
}

impl Mkd {
    pub fn new(path: PathBuf) -> Self {
        Mkd { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Mkd
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
        let resolved = match chroot::resolve(user, &session.cwd, &self.path) {
            Ok(path) => path,
            Err(err) => return Ok(storage_error_reply(err)),
        };
        if !user.storage_permissions().contains(StoragePermissions::MK_DIR) {
            return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
        }
        let vpath = match chroot::virtual_path(&session.cwd, &self.path) {
            Ok(vpath) => vpath,
            Err(err) => return Ok(storage_error_reply(err)),
        };

        match storage.mkd(user, resolved).await {
            Ok(()) => Ok(Reply::new_with_string(
                ReplyCode::DirCreated,
                format!("\"{}\" directory created", vpath.display()),
            )),
            Err(err) => {
                slog::warn!(args.logger, "MKD failed: {}", err);
                Ok(storage_error_reply(err))
            }
        }
    }
}
