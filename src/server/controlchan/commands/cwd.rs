//! The RFC 959 Change Working Directory (`CWD`) command.

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
pub struct Cwd {
    path: PathBuf,
}

impl Cwd {
    pub fn new(path: PathBuf) -> Self {
        Cwd { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Cwd
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let storage = Arc::clone(&session.storage);
        let (resolved, vpath) = {
            let user = match session.user.as_ref() {
                Some(user) => user,
                None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
            };
            let resolved = match chroot::resolve(user, &session.cwd, &self.path) {
                Ok(path) => path,
                Err(err) => return Ok(storage_error_reply(err)),
            };
            if !user.storage_permissions().contains(StoragePermissions::GET) {
                return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
            }
            let vpath = match chroot::virtual_path(&session.cwd, &self.path) {
                Ok(vpath) => vpath,
                Err(err) => return Ok(storage_error_reply(err)),
            };
            (resolved, vpath)
        };

        match storage.cwd(session.user.as_ref().as_ref().unwrap(), resolved).await {
            Ok(()) => {
                session.cwd = vpath;
                Ok(Reply::new(ReplyCode::FileActionOkay, "Directory changed"))
            }
            Err(err) => {
                slog::warn!(args.logger, "CWD failed: {}", err);
                Ok(storage_error_reply(err))
            }
        }
    }
}
