//! Contains shared code for the PASV and EPSV commands: port reservation,
//! listener setup and the accept task that hands the connection to the data
//! channel.

use crate::{
    auth::UserDetail,
    server::{
        chancomms::{ControlChanMsg, DataChanCmd},
        controlchan::handler::CommandContext,
        datachan,
        portpool::PortLease,
        session::SharedSession,
    },
    storage::{Metadata, StorageBackend},
};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::mpsc::{Receiver, Sender, channel};

// How long we wait for the client to connect to the advertised port before
// giving the port back.
const DATA_CONNECT_DEADLINE: Duration = Duration::from_secs(15);

// Wires up the channels through which the control loop talks to the
// upcoming data channel task.
async fn setup_inter_loop_comms<Storage, User>(session: &SharedSession<Storage, User>, control_loop_tx: Sender<ControlChanMsg>)
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    let (cmd_tx, cmd_rx): (Sender<DataChanCmd>, Receiver<DataChanCmd>) = channel(1);
    let (data_abort_tx, data_abort_rx): (Sender<()>, Receiver<()>) = channel(1);

    let mut session = session.lock().await;
    session.data_cmd_tx = Some(cmd_tx);
    session.data_cmd_rx = Some(cmd_rx);
    session.data_abort_tx = Some(data_abort_tx);
    session.data_abort_rx = Some(data_abort_rx);
    session.control_msg_tx = Some(control_loop_tx);
}

// Reserves a passive port, binds it and spawns the accept task. Returns the
// bound port so the caller can format its 227/229 reply, or None when the
// pool is exhausted (reply 425).
pub(super) async fn start_passive_listener<Storage, User>(args: &CommandContext<Storage, User>) -> Option<u16>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    let lease: PortLease = args.passive_ports.acquire()?;
    let port = lease.port();

    let listener = match bind_listener(args.local_addr.ip(), port) {
        Ok(listener) => listener,
        Err(err) => {
            slog::warn!(args.logger, "Could not bind passive port {}: {}", port, err);
            return None;
        }
    };

    setup_inter_loop_comms(&args.session, args.tx_control_chan.clone()).await;
    args.session.lock().await.port_lease = Some(lease);

    let session = args.session.clone();
    let logger = args.logger.clone();
    let tx = args.tx_control_chan.clone();

    // Accept in a new task; the reply telling the client where to connect
    // must go out first.
    tokio::spawn(async move {
        match tokio::time::timeout(DATA_CONNECT_DEADLINE, listener.accept()).await {
            Ok(Ok((socket, _remote))) => datachan::spawn_processing(logger, session, socket).await,
            Ok(Err(err)) => {
                slog::error!(logger, "Error waiting for data connection: {}", err);
                session.lock().await.port_lease.take();
            }
            Err(_) => {
                slog::warn!(logger, "Client did not connect to the data port in time");
                session.lock().await.port_lease.take();
                let _ = tx.send(ControlChanMsg::DataConnectionTimedOut).await;
            }
        }
    });

    Some(port)
}

fn bind_listener(ip: std::net::IpAddr, port: u16) -> std::io::Result<TcpListener> {
    let socket = match ip {
        std::net::IpAddr::V4(_) => TcpSocket::new_v4()?,
        std::net::IpAddr::V6(_) => TcpSocket::new_v6()?,
    };
    // The same port cycles rapidly through transfers; without reuseaddr the
    // TIME_WAIT state of the previous transfer would make rebinding fail.
    socket.set_reuseaddr(true)?;
    socket.bind(std::net::SocketAddr::new(ip, port))?;
    socket.listen(1024)
}
