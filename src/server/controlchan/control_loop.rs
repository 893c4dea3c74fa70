//! The per-connection control channel event loop: decodes commands,
//! dispatches them to their handlers, relays data-channel outcomes and
//! enforces the idle timeout and shutdown drain.

use crate::{
    auth::Authenticator,
    auth::UserDetail,
    metrics,
    server::{
        SessionBindings,
        chancomms::ControlChanMsg,
        controlchan::{
            Reply, ReplyCode,
            codecs::FtpCodec,
            command::Command,
            commands,
            commands::storage_error_reply,
            error::{ControlChanError, ControlChanErrorKind},
            handler::{CommandContext, CommandHandler},
        },
        ftpserver::options::PassiveHost,
        portpool::PassivePorts,
        session::{Session, SessionState, SharedSession},
        shutdown,
    },
    storage::{Metadata, StorageBackend},
};

use futures_util::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio_util::codec::Framed;

// Everything a control loop needs to service one connection.
pub(crate) struct LoopConfig<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    pub storage: Storage,
    pub authenticator: Arc<dyn Authenticator<User>>,
    pub greeting: String,
    pub passive_ports: PassivePorts,
    pub passive_host: PassiveHost,
    pub collect_metrics: bool,
    pub idle_session_timeout: Duration,
    pub logger: slog::Logger,
    pub bindings: Arc<SessionBindings>,
}

// Takes over a freshly accepted control connection: greets the client and
// spawns the event loop. Returns the loop's join handle.
pub(crate) async fn spawn_loop<Storage, User>(
    config: LoopConfig<Storage, User>,
    tcp_stream: TcpStream,
    mut shutdown_listener: shutdown::Listener,
) -> Result<tokio::task::JoinHandle<()>, ControlChanError>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    let local_addr = tcp_stream.local_addr()?;
    let peer_addr = tcp_stream.peer_addr()?;

    let storage_features = config.storage.supported_features();
    let collect_metrics = config.collect_metrics;
    let idle_session_timeout = config.idle_session_timeout;
    let session = Session::new(Arc::new(config.storage), peer_addr).metrics(collect_metrics);
    let session_id = session.id;
    let logger = config.logger.new(slog::o!("session" => session_id.to_string()));
    let session: SharedSession<Storage, User> = Arc::new(Mutex::new(session));

    let (control_msg_tx, mut control_msg_rx): (Sender<ControlChanMsg>, Receiver<ControlChanMsg>) = channel(8);

    let codec = FtpCodec::new();
    let (mut reply_sink, mut command_source) = Framed::new(tcp_stream, codec).split();

    reply_sink
        .send(Reply::new_with_string(ReplyCode::ServiceReady, config.greeting.clone()))
        .await?;
    reply_sink.flush().await?;

    let authenticator = config.authenticator;
    let passive_ports = config.passive_ports;
    let passive_host = config.passive_host;
    let bindings = config.bindings;

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd_result = command_source.next() => {
                    match cmd_result {
                        None => {
                            slog::info!(logger, "Client closed the control connection");
                            break;
                        }
                        Some(Ok(cmd)) => {
                            // The Password newtype keeps PASS/ACCT payloads out of this line.
                            slog::debug!(logger, "Processing command {:?}", cmd);
                            if collect_metrics {
                                metrics::add_command_metric(&cmd);
                            }
                            let result = dispatch_command(
                                cmd,
                                session.clone(),
                                authenticator.clone(),
                                passive_ports.clone(),
                                passive_host.clone(),
                                control_msg_tx.clone(),
                                local_addr,
                                storage_features,
                                logger.clone(),
                                bindings.clone(),
                            )
                            .await;
                            match result {
                                Ok(reply) => {
                                    if collect_metrics {
                                        metrics::add_reply_metric(&reply);
                                    }
                                    let close = reply.matches_code(ReplyCode::ClosingControlConnection);
                                    if reply_sink.send(reply).await.is_err() {
                                        slog::warn!(logger, "Could not send reply");
                                        break;
                                    }
                                    if close {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    slog::warn!(logger, "Command handler error: {}", err);
                                    break;
                                }
                            }
                        }
                        Some(Err(err)) => {
                            if collect_metrics {
                                metrics::add_error_metric(err.kind());
                            }
                            let reply = handle_control_channel_error(&err);
                            let close = reply.matches_code(ReplyCode::ClosingControlConnection);
                            if reply_sink.send(reply).await.is_err() || close {
                                break;
                            }
                        }
                    }
                },
                Some(msg) = control_msg_rx.recv() => {
                    slog::debug!(logger, "Data channel reported {:?}", msg);
                    let reply = handle_internal_msg(msg, &session).await;
                    if collect_metrics {
                        metrics::add_reply_metric(&reply);
                    }
                    if reply_sink.send(reply).await.is_err() {
                        break;
                    }
                },
                _ = tokio::time::sleep(idle_session_timeout) => {
                    slog::info!(logger, "Connection idle for {:?}, closing", idle_session_timeout);
                    let _ = reply_sink
                        .send(Reply::new(ReplyCode::ServiceNotAvailable, "Session timed out. Closing control connection"))
                        .await;
                    break;
                },
                _ = shutdown_listener.listen() => {
                    slog::info!(logger, "Server is shutting down, closing session");
                    let _ = reply_sink
                        .send(Reply::new(ReplyCode::ServiceNotAvailable, "Service shutting down, goodbye"))
                        .await;
                    break;
                }
            }
        }

        bindings.clear(session_id);
    });

    Ok(handle)
}

// Commands a client may issue before it is authenticated.
fn pre_login_allowed(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::User { .. }
            | Command::Pass { .. }
            | Command::Acct { .. }
            | Command::Auth { .. }
            | Command::Feat
            | Command::Help
            | Command::Noop
            | Command::Quit
            | Command::Syst
            | Command::Type
    )
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_command<Storage, User>(
    cmd: Command,
    session: SharedSession<Storage, User>,
    authenticator: Arc<dyn Authenticator<User>>,
    passive_ports: PassivePorts,
    passive_host: PassiveHost,
    tx_control_chan: Sender<ControlChanMsg>,
    local_addr: std::net::SocketAddr,
    storage_features: u32,
    logger: slog::Logger,
    bindings: Arc<SessionBindings>,
) -> Result<Reply, ControlChanError>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    if !pre_login_allowed(&cmd) {
        let session = session.lock().await;
        if session.state != SessionState::WaitCmd {
            return Ok(Reply::new(ReplyCode::NotLoggedIn, "Please authenticate"));
        }
    }

    let args = CommandContext {
        parsed_command: cmd.clone(),
        session,
        authenticator,
        passive_ports,
        passive_host,
        tx_control_chan,
        local_addr,
        storage_features,
        logger,
        bindings,
    };

    let handler: Box<dyn CommandHandler<Storage, User>> = match cmd {
        Command::User { username } => Box::new(commands::User::new(username)),
        Command::Pass { password } => Box::new(commands::Pass::new(password)),
        Command::Acct { .. } => Box::new(commands::Acct),
        Command::Syst => Box::new(commands::Syst),
        Command::Stat { path } => Box::new(commands::Stat::new(path)),
        Command::Type => Box::new(commands::Type),
        Command::Stru { structure } => Box::new(commands::Stru::new(structure)),
        Command::Mode { mode } => Box::new(commands::Mode::new(mode)),
        Command::Help => Box::new(commands::Help),
        Command::Noop => Box::new(commands::Noop),
        Command::Pasv => Box::new(commands::Pasv),
        Command::Epsv => Box::new(commands::Epsv),
        Command::Port { .. } => Box::new(commands::Port),
        Command::Retr { path } => Box::new(commands::Retr::new(path)),
        Command::Stor { path } => Box::new(commands::Stor::new(path)),
        Command::Appe { path } => Box::new(commands::Stor::appe(path)),
        Command::List { path, .. } => Box::new(commands::List::new(path)),
        Command::Nlst { path } => Box::new(commands::Nlst::new(path)),
        Command::Mlsd { path } => Box::new(commands::Mlsd::new(path)),
        Command::Mlst { path } => Box::new(commands::Mlst::new(path)),
        Command::Feat => Box::new(commands::Feat),
        Command::Opts { option } => Box::new(commands::Opts::new(option)),
        Command::Pwd => Box::new(commands::Pwd),
        Command::Cwd { path } => Box::new(commands::Cwd::new(path)),
        Command::Cdup => Box::new(commands::Cdup),
        Command::Dele { path } => Box::new(commands::Dele::new(path)),
        Command::Rmd { path } => Box::new(commands::Rmd::new(path)),
        Command::Quit => Box::new(commands::Quit),
        Command::Mkd { path } => Box::new(commands::Mkd::new(path)),
        Command::Allo => Box::new(commands::Allo),
        Command::Abor => Box::new(commands::Abor),
        Command::Rnfr { file } => Box::new(commands::Rnfr::new(file)),
        Command::Rnto { file } => Box::new(commands::Rnto::new(file)),
        Command::Auth { protocol } => Box::new(commands::Auth::new(protocol)),
        Command::Size { file } => Box::new(commands::Size::new(file)),
        Command::Rest { offset } => Box::new(commands::Rest::new(offset)),
        Command::Mdtm { file } => Box::new(commands::Mdtm::new(file)),
    };

    handler.handle(args).await
}

async fn handle_internal_msg<Storage, User>(msg: ControlChanMsg, session: &SharedSession<Storage, User>) -> Reply
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    use ControlChanMsg::*;

    match msg {
        SentData { bytes } => {
            let mut session = session.lock().await;
            session.start_pos = 0;
            Reply::new_with_string(ReplyCode::ClosingDataConnection, format!("Successfully sent {} bytes", bytes))
        }
        WrittenData { bytes } => {
            let mut session = session.lock().await;
            session.start_pos = 0;
            Reply::new_with_string(ReplyCode::ClosingDataConnection, format!("File successfully written ({} bytes)", bytes))
        }
        DirectorySuccessfullyListed => Reply::new(ReplyCode::ClosingDataConnection, "Listed the directory"),
        DataConnectionTimedOut => Reply::new(ReplyCode::CantOpenDataConnection, "Data connection timed out"),
        TransferAborted => Reply::new(ReplyCode::ConnectionClosed, "Transfer aborted"),
        StorageError(err) => storage_error_reply(err),
    }
}

fn handle_control_channel_error(error: &ControlChanError) -> Reply {
    match error.kind() {
        ControlChanErrorKind::UnknownCommand { .. } => Reply::new(ReplyCode::CommandSyntaxError, "Command not implemented"),
        ControlChanErrorKind::Utf8Error => Reply::new(ReplyCode::CommandSyntaxError, "Invalid UTF8 in command"),
        ControlChanErrorKind::InvalidCommand | ControlChanErrorKind::ParseError => Reply::new(ReplyCode::ParameterSyntaxError, "Invalid Parameter"),
        ControlChanErrorKind::IoError => Reply::new(ReplyCode::ClosingControlConnection, "Connection error, closing control connection"),
        _ => Reply::new(ReplyCode::LocalError, "Unknown internal server error, please try again later"),
    }
}
