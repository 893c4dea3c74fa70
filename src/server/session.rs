//! Per-connection session state.

use super::chancomms::{ControlChanMsg, DataChanCmd};
use super::portpool::PortLease;
use crate::auth::UserDetail;
use crate::metrics;
use crate::storage::StorageBackend;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, Sender};
use uuid::Uuid;

pub type SharedSession<Storage, User> = Arc<Mutex<Session<Storage, User>>>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionState {
    New,
    WaitPass,
    WaitCmd,
}

// All the state for one FTP session. One exists per control connection and
// is dropped when that connection goes away; the storage binding (the
// `storage` instance after `enter()`) never outlives it.
pub struct Session<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    pub id: Uuid,
    pub source: SocketAddr,
    pub start_time: SystemTime,
    pub state: SessionState,
    // Candidate username after USER, bound identity after PASS.
    pub username: Option<String>,
    pub user: Arc<Option<User>>,
    pub storage: Arc<Storage>,
    // The client-visible working directory ("/" is the top of the
    // confinement), tracked by CWD/CDUP and rendered by PWD.
    pub cwd: PathBuf,
    // Resolved source path between RNFR and RNTO.
    pub rename_from: Option<PathBuf>,
    // Restart offset set by REST. Honoured by RETR, narrowed to 0 by STOR.
    pub start_pos: u64,
    pub data_cmd_tx: Option<Sender<DataChanCmd>>,
    pub data_cmd_rx: Option<Receiver<DataChanCmd>>,
    pub data_abort_tx: Option<Sender<()>>,
    pub data_abort_rx: Option<Receiver<()>>,
    pub control_msg_tx: Option<Sender<ControlChanMsg>>,
    // Passive port reservation for the pending/active data connection.
    pub port_lease: Option<PortLease>,
    pub collect_metrics: bool,
}

impl<Storage, User> Session<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    pub fn new(storage: Arc<Storage>, source: SocketAddr) -> Self {
        Session {
            id: Uuid::new_v4(),
            source,
            start_time: SystemTime::now(),
            state: SessionState::New,
            username: None,
            user: Arc::new(None),
            storage,
            cwd: "/".into(),
            rename_from: None,
            start_pos: 0,
            data_cmd_tx: None,
            data_cmd_rx: None,
            data_abort_tx: None,
            data_abort_rx: None,
            control_msg_tx: None,
            port_lease: None,
            collect_metrics: false,
        }
    }

    pub fn metrics(mut self, collect_metrics: bool) -> Self {
        if collect_metrics {
            metrics::inc_session();
        }
        self.collect_metrics = collect_metrics;
        self
    }
}

impl<Storage, User> fmt::Debug for Session<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("username", &self.username)
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl<Storage, User> Drop for Session<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    fn drop(&mut self) {
        if self.collect_metrics {
            metrics::dec_session();
        }
    }
}
