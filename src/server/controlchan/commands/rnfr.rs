//! The RFC 959 Rename From (`RNFR`) command: remembers the source for the
//! RNTO that must follow.

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
    storage::{ErrorKind, Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub struct Rnfr {
    file: PathBuf,
}

impl Rnfr {
    pub fn new(file: PathBuf) -> Self {
        Rnfr { file }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Rnfr
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let storage = Arc::clone(&session.storage);
        let resolved = {
            let user = match session.user.as_ref() {
                Some(user) => user,
                None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
            };
            let resolved = match chroot::resolve(user, &session.cwd, &self.file) {
                Ok(path) => path,
                Err(err) => return Ok(storage_error_reply(err)),
            };
            if !user.storage_permissions().contains(StoragePermissions::RENAME) {
                return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
            }
            resolved
        };

        // A missing rename source is an ordinary client mistake, not a
        // server-side error; don't log it as one.
        match storage.metadata(session.user.as_ref().as_ref().unwrap(), &resolved).await {
            Ok(_) => {
                session.rename_from = Some(resolved);
                Ok(Reply::new(ReplyCode::FileActionPending, "Tell me, what would you like the new name to be?"))
            }
            Err(err) if err.kind() == ErrorKind::PermanentFileNotAvailable => {
                slog::debug!(args.logger, "RNFR of a non-existent path {:?}", resolved);
                Ok(storage_error_reply(err))
            }
            Err(err) => Ok(storage_error_reply(err)),
        }
    }
}
