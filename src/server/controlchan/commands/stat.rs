//! The RFC 959 Status (`STAT`) command. Without a path it reports on the
//! session; with a path it returns the listing inline on the control
//! channel.

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
pub struct Stat {
    path: Option<String>,
}

impl Stat {
    pub fn new(path: Option<String>) -> Self {
        Stat { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Stat
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let session = args.session.lock().await;
        match &self.path {
            None => {
                let bound = args.bindings.username(session.id).unwrap_or_else(|| "(none)".to_string());
                let up_secs = session.start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0);
                let lines = vec![
                    "server status:".to_string(),
                    format!("connected from {}", session.source),
                    format!("logged in as {}", bound),
                    format!("working directory {}", session.cwd.display()),
                    format!("session up {}s", up_secs),
                    "End of status".to_string(),
                ];
                Ok(Reply::new_multiline(ReplyCode::SystemStatus, lines))
            }
            Some(path) => {
                let storage = Arc::clone(&session.storage);
                let user = match session.user.as_ref() {
                    Some(user) => user,
                    None => return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate")),
                };
                let resolved = match chroot::resolve(user, &session.cwd, Path::new(path)) {
                    Ok(path) => path,
                    Err(err) => return Ok(storage_error_reply(err)),
                };
                if !user.storage_permissions().contains(StoragePermissions::LIST) {
                    return Ok(Reply::new(ReplyCode::FileError, "Permission denied"));
                }
                match storage.list_vec(user, resolved).await {
                    Ok(mut lines) => {
                        lines.insert(0, format!("status of {}:", path));
                        lines.push("End of status".to_string());
                        Ok(Reply::new_multiline(ReplyCode::FileStatus, lines))
                    }
                    Err(err) => Ok(storage_error_reply(err)),
                }
            }
        }
    }
}
