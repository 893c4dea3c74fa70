//! Contains the messages passed between the control channel loop and the
//! per-transfer data channel task.

use crate::storage::Error;
use std::path::PathBuf;

// The one command a data channel task executes. Paths are fully resolved
// (chroot + cwd) by the control channel before they get here; the restart
// offset travels with the command so a REST between PASV and RETR cannot
// be missed.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum DataChanCmd {
    Retr { path: PathBuf, start_pos: u64 },
    Stor { path: PathBuf },
    List { path: PathBuf },
    Nlst { path: PathBuf },
    Mlsd { path: PathBuf },
}

// Status messages from the data channel task (and a few command handlers)
// back to the control loop, which turns them into replies.
#[derive(Debug)]
pub enum ControlChanMsg {
    /// Sent the file to the client.
    SentData {
        bytes: u64,
    },
    /// Wrote the client's upload to the storage back-end.
    WrittenData {
        bytes: u64,
    },
    /// Listed the directory successfully.
    DirectorySuccessfullyListed,
    /// The client never connected to the advertised passive port.
    DataConnectionTimedOut,
    /// The transfer was aborted via ABOR.
    TransferAborted,
    /// Errors coming from the storage back-end.
    StorageError(Error),
}
