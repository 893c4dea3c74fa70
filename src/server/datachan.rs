//! Contains code pertaining to the FTP *data* channel: it runs exactly one
//! transfer over an accepted passive connection and reports the outcome to
//! the control loop.

use super::chancomms::{ControlChanMsg, DataChanCmd};
use crate::auth::UserDetail;
use crate::server::session::SharedSession;
use crate::storage::{Error, ErrorKind, StorageBackend};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{Receiver, Sender};

// Runs the data channel for one transfer: waits for the command the control
// loop queued, executes it against the storage back-end and emits the
// outcome. The caller holds the passive port lease for the duration.
pub async fn spawn_processing<Storage, User>(logger: slog::Logger, session: SharedSession<Storage, User>, socket: TcpStream)
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
{
    let (mut cmd_rx, mut abort_rx, user, storage, tx) = {
        let mut session = session.lock().await;
        let cmd_rx: Receiver<DataChanCmd> = match session.data_cmd_rx.take() {
            Some(rx) => rx,
            None => {
                slog::warn!(logger, "Data connection accepted without a pending command channel");
                return;
            }
        };
        let abort_rx: Receiver<()> = match session.data_abort_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let tx: Sender<ControlChanMsg> = match session.control_msg_tx.clone() {
            Some(tx) => tx,
            None => return,
        };
        (cmd_rx, abort_rx, session.user.clone(), Arc::clone(&session.storage), tx)
    };

    let cmd = tokio::select! {
        cmd = cmd_rx.recv() => match cmd {
            Some(cmd) => cmd,
            // Control channel went away before a data command arrived.
            None => return,
        },
        _ = abort_rx.recv() => {
            let _ = tx.send(ControlChanMsg::TransferAborted).await;
            return;
        }
    };

    let msg = match user.as_ref() {
        Some(user) => {
            tokio::select! {
                msg = execute(&logger, cmd, user, &storage, socket) => msg,
                _ = abort_rx.recv() => ControlChanMsg::TransferAborted,
            }
        }
        None => ControlChanMsg::StorageError(Error::from(ErrorKind::PermissionDenied)),
    };

    if let Err(err) = tx.send(msg).await {
        slog::warn!(logger, "Control loop went away before transfer outcome could be sent: {}", err);
    }

    // Free the passive port for the next PASV.
    session.lock().await.port_lease.take();
}

async fn execute<Storage, User>(
    logger: &slog::Logger,
    cmd: DataChanCmd,
    user: &User,
    storage: &Arc<Storage>,
    mut socket: TcpStream,
) -> ControlChanMsg
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
{
    match cmd {
        DataChanCmd::Retr { path, start_pos } => {
            slog::debug!(logger, "Sending {:?} from offset {}", path, start_pos);
            let msg = match storage.get_into(user, path, start_pos, &mut socket).await {
                Ok(bytes) => ControlChanMsg::SentData { bytes },
                Err(err) => ControlChanMsg::StorageError(err),
            };
            let _ = socket.shutdown().await;
            msg
        }
        DataChanCmd::Stor { path } => {
            slog::debug!(logger, "Receiving into {:?}", path);
            // put() needs an owned reader; keep the write half to close the
            // socket cleanly afterwards.
            let (read_half, mut write_half) = socket.into_split();
            let msg = match storage.put(user, read_half, path, 0).await {
                Ok(bytes) => ControlChanMsg::WrittenData { bytes },
                Err(err) => ControlChanMsg::StorageError(err),
            };
            let _ = write_half.shutdown().await;
            msg
        }
        DataChanCmd::List { path } => send_listing(storage.list_fmt(user, path).await, socket).await,
        DataChanCmd::Nlst { path } => send_listing(storage.nlst(user, path).await, socket).await,
        DataChanCmd::Mlsd { path } => send_listing(storage.mlsd_fmt(user, path).await, socket).await,
    }
}

async fn send_listing(listing: Result<std::io::Cursor<Vec<u8>>, Error>, mut socket: TcpStream) -> ControlChanMsg {
    let msg = match listing {
        Ok(mut cursor) => match tokio::io::copy(&mut cursor, &mut socket).await {
            Ok(_) => ControlChanMsg::DirectorySuccessfullyListed,
            Err(err) => ControlChanMsg::StorageError(err.into()),
        },
        Err(err) => ControlChanMsg::StorageError(err),
    };
    let _ = socket.shutdown().await;
    msg
}
