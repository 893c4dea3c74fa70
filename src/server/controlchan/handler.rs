use crate::{
    auth::{Authenticator, UserDetail},
    server::{
        SessionBindings,
        chancomms::ControlChanMsg,
        controlchan::{Reply, command::Command, error::ControlChanError},
        ftpserver::options::PassiveHost,
        portpool::PassivePorts,
        session::SharedSession,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc::Sender;

// Common interface for all handlers of `Command`s
#[async_trait]
pub(crate) trait CommandHandler<Storage, User>: Send + Sync + std::fmt::Debug
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError>;
}

/// Represents arguments passed to a `CommandHandler`
#[derive(Debug)]
pub(crate) struct CommandContext<Storage, User>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata + Sync,
    User: UserDetail + 'static,
{
    pub parsed_command: Command,
    pub session: SharedSession<Storage, User>,
    pub authenticator: Arc<dyn Authenticator<User>>,
    pub passive_ports: PassivePorts,
    pub passive_host: PassiveHost,
    pub tx_control_chan: Sender<ControlChanMsg>,
    pub local_addr: SocketAddr,
    pub storage_features: u32,
    pub logger: slog::Logger,
    pub bindings: Arc<SessionBindings>,
}
