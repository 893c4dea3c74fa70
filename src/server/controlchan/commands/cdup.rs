//! The RFC 959 Change To Parent Directory (`CDUP`) command. Equivalent to
//! `CWD ..`; at the confinement root it stays at the root.

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
pub struct Cdup;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Cdup
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let storage = Arc::clone(&session.storage);

        // The parent of the virtual root is the virtual root itself.
        let vpath = if session.cwd == Path::new("/") {
            session.cwd.clone()
        } else {
            match chroot::virtual_path(&session.cwd, Path::new("..")) {
                Ok(vpath) => vpath,
                Err(err) => return Ok(storage_error_reply(err)),
            }
        };

        let resolved = {
            let user = match session.user.as_ref() {
                Some(user) => user,
                None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
            };
            if !user.storage_permissions().contains(StoragePermissions::GET) {
                return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
            }
            match chroot::resolve(user, &vpath, Path::new(".")) {
                Ok(path) => path,
                Err(err) => return Ok(storage_error_reply(err)),
            }
        };

        match storage.cwd(session.user.as_ref().as_ref().unwrap(), resolved).await {
            Ok(()) => {
                session.cwd = vpath;
                Ok(Reply::new(ReplyCode::FileActionOkay, "Directory changed"))
            }
            Err(err) => Ok(storage_error_reply(err)),
        }
    }
}
