//! The RFC 3659 File Size (`SIZE`) command. Directories have no size; the
//! reply for one is a 550.

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
pub struct Size {
    file: PathBuf,
}

impl Size {
    pub fn new(file: PathBuf) -> Self {
        Size { file }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Size
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
        let resolved = match chroot::resolve(user, &session.cwd, &self.file) {
            Ok(path) => path,
            Err(err) => return Ok(storage_error_reply(err)),
        };
        if !user.storage_permissions().contains(StoragePermissions::GET) {
            return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
        }

        match storage.metadata(user, resolved).await {
            Ok(metadata) if metadata.is_dir() => Ok(Reply::new(ReplyCode::FileError, "Not a regular file")),
            Ok(metadata) => Ok(Reply::new_with_string(ReplyCode::FileStatus, metadata.len().to_string())),
            Err(err) => Ok(storage_error_reply(err)),
        }
    }
}
