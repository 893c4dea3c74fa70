//! The RFC 3659 Machine List Single (`MLST`) command: machine-readable
//! facts about one file or directory, on the control channel.

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
    storage::{Metadata, StorageBackend, mlsx_line},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub struct Mlst {
    path: Option<String>,
}

impl Mlst {
    pub fn new(path: Option<String>) -> Self {
        Mlst { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Mlst
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
        let input: PathBuf = self.path.clone().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let resolved = match chroot::resolve(user, &session.cwd, &input) {
            Ok(path) => path,
            Err(err) => return Ok(storage_error_reply(err)),
        };
        if !user.storage_permissions().contains(StoragePermissions::GET) {
            return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
        }

        let vpath = match chroot::virtual_path(&session.cwd, &input) {
            Ok(vpath) => vpath,
            Err(err) => return Ok(storage_error_reply(err)),
        };

        match storage.metadata(user, resolved).await {
            Ok(metadata) => {
                let name = vpath
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "/".to_string());
                let facts = mlsx_line(&name, &metadata);
                Ok(Reply::new_multiline(
                    ReplyCode::FileActionOkay,
                    vec!["Listing".to_string(), format!(" {}", facts), "End".to_string()],
                ))
            }
            Err(err) => Ok(storage_error_reply(err)),
        }
    }
}
