//! The RFC 959 Store (`STOR`) command, also servicing APPE.
//!
//! A restart offset set with REST is narrowed to zero here: the storage
//! back-ends have no uniform append-at-offset, so uploads always (re)write
//! from the beginning. The same narrowing turns APPE into a plain store.
//! Both coercions are logged.

use crate::{
    auth::{StoragePermissions, UserDetail},
    server::{
        chancomms::DataChanCmd,
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

#[derive(Debug)]
pub struct Stor {
    path: String,
    appending: bool,
}

impl Stor {
    pub fn new(path: String) -> Self {
        Stor { path, appending: false }
    }

    /// An APPE arrives here; append semantics collapse to a plain store.
    pub fn appe(path: String) -> Self {
        Stor { path, appending: true }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Stor
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let resolved = {
            let user = match session.user.as_ref() {
                Some(user) => user,
                None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
            };
            let resolved = match chroot::resolve(user, &session.cwd, Path::new(&self.path)) {
                Ok(path) => path,
                Err(err) => return Ok(storage_error_reply(err)),
            };
            if !user.storage_permissions().contains(StoragePermissions::PUT) {
                return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
            }
            resolved
        };

        if session.start_pos > 0 {
            slog::warn!(
                args.logger,
                "Client asked to restart upload at offset {}, coercing to 0", session.start_pos;
                "path" => %resolved.display()
            );
            session.start_pos = 0;
        }
        if self.appending {
            slog::warn!(args.logger, "APPE handled as STOR, upload overwrites from offset 0"; "path" => %resolved.display());
        }

        let tx = match session.data_cmd_tx.take() {
            Some(tx) => tx,
            None => return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "No data connection established")),
        };
        if tx.send(DataChanCmd::Stor { path: resolved }).await.is_err() {
            return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "Data connection went away"));
        }
        Ok(Reply::new(ReplyCode::FileStatusOkay, "Ready to receive data"))
    }
}
