//! Contains the code that listens for control channel connections.

use super::error::ServerError;
use crate::{
    auth::{Authenticator, UserDetail},
    server::{SessionBindings, controlchan, ftpserver::options::PassiveHost, portpool::PassivePorts, shutdown},
    storage::StorageBackend,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// Listener accepts control connections on the configured address and spawns
// a control channel loop in a new task for each of them.
pub struct Listener<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    pub bind_address: SocketAddr,
    pub logger: slog::Logger,
    pub storage: Arc<dyn (Fn() -> Storage) + Send + Sync>,
    pub authenticator: Arc<dyn Authenticator<User>>,
    pub greeting: String,
    pub passive_ports: PassivePorts,
    pub passive_host: PassiveHost,
    pub collect_metrics: bool,
    pub idle_session_timeout: Duration,
    pub bindings: Arc<SessionBindings>,
    pub shutdown_topic: Arc<shutdown::Notifier>,
}

impl<Storage, User> Listener<Storage, User>
where
    Storage: StorageBackend<User> + 'static,
    User: UserDetail + 'static,
{
    // Starts listening, returning an error if the TCP address could not be
    // bound. Runs until the shutdown notifier fires.
    pub async fn listen(self) -> std::result::Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind_address).await?;
        slog::info!(self.logger, "Listening for control connections"; "address" => %self.bind_address);
        loop {
            let mut shutdown_listener = self.shutdown_topic.subscribe().await;
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown_listener.listen() => {
                    slog::info!(self.logger, "Stopped accepting new connections");
                    return Ok(());
                }
            };
            match accepted {
                Ok((tcp_stream, socket_addr)) => {
                    slog::info!(self.logger, "Incoming control connection"; "peer" => %socket_addr);
                    let config = controlchan::control_loop::LoopConfig {
                        storage: (self.storage)(),
                        authenticator: self.authenticator.clone(),
                        greeting: self.greeting.clone(),
                        passive_ports: self.passive_ports.clone(),
                        passive_host: self.passive_host.clone(),
                        collect_metrics: self.collect_metrics,
                        idle_session_timeout: self.idle_session_timeout,
                        logger: self.logger.clone(),
                        bindings: self.bindings.clone(),
                    };
                    let result = controlchan::control_loop::spawn_loop(config, tcp_stream, shutdown_listener).await;
                    if let Err(err) = result {
                        slog::error!(self.logger, "Could not spawn control channel loop for connection from {:?}: {:?}", socket_addr, err);
                    }
                }
                Err(err) => {
                    slog::error!(self.logger, "Error accepting incoming control connection {:?}", err);
                }
            }
        }
    }
}
