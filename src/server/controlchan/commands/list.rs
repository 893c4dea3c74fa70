//! The RFC 959 List (`LIST`) command: streams a human-readable directory
//! listing over the data channel.

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
pub struct List {
    path: Option<String>,
}

impl List {
    pub fn new(path: Option<String>) -> Self {
        List { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for List
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let input = self.path.clone().unwrap_or_else(|| ".".to_string());
        let resolved = {
            let user = match session.user.as_ref() {
                Some(user) => user,
                None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
            };
            let resolved = match chroot::resolve(user, &session.cwd, Path::new(&input)) {
                Ok(path) => path,
                Err(err) => return Ok(storage_error_reply(err)),
            };
            if !user.storage_permissions().contains(StoragePermissions::LIST) {
                return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
            }
            resolved
        };

        let tx = match session.data_cmd_tx.take() {
            Some(tx) => tx,
            None => return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "No data connection established")),
        };
        if tx.send(DataChanCmd::List { path: resolved }).await.is_err() {
            return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "Data connection went away"));
        }
        Ok(Reply::new(ReplyCode::FileStatusOkay, "Sending directory list"))
    }
}
