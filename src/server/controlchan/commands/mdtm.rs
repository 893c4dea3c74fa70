//! The RFC 3659 Modify Time (`MDTM`) command: when a file in the server
//! NVFS was last modified, as `YYYYMMDDHHMMSS` in UTC.

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
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub struct Mdtm {
    file: PathBuf,
}

impl Mdtm {
    pub fn new(file: PathBuf) -> Self {
        Mdtm { file }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Mdtm
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
            Ok(metadata) => match metadata.modified() {
                Ok(modified) => Ok(Reply::new_with_string(
                    ReplyCode::FileStatus,
                    DateTime::<Utc>::from(modified).format("%Y%m%d%H%M%S").to_string(),
                )),
                Err(err) => Ok(storage_error_reply(err)),
            },
            Err(err) => Ok(storage_error_reply(err)),
        }
    }
}
