//! One handler per control-channel command.

mod abor;
mod acct;
mod allo;
mod auth;
mod cdup;
mod cwd;
mod dele;
mod epsv;
mod feat;
mod help;
mod list;
mod mdtm;
mod mkd;
mod mlsd;
mod mlst;
mod mode;
mod nlst;
mod noop;
mod opts;
mod pass;
mod passive_common;
mod pasv;
mod port;
mod pwd;
mod quit;
mod rest;
mod retr;
mod rmd;
mod rnfr;
mod rnto;
mod size;
mod stat;
mod stor;
mod stru;
mod syst;
mod type_;
mod user;

pub use abor::Abor;
pub use acct::Acct;
pub use allo::Allo;
pub use auth::Auth;
pub use cdup::Cdup;
pub use cwd::Cwd;
pub use dele::Dele;
pub use epsv::Epsv;
pub use feat::Feat;
pub use help::Help;
pub use list::List;
pub use mdtm::Mdtm;
pub use mkd::Mkd;
pub use mlsd::Mlsd;
pub use mlst::Mlst;
pub use mode::Mode;
pub use nlst::Nlst;
pub use noop::Noop;
pub use opts::Opts;
pub use pass::Pass;
pub use pasv::Pasv;
pub use port::Port;
pub use pwd::Pwd;
pub use quit::Quit;
pub use rest::Rest;
pub use retr::Retr;
pub use rmd::Rmd;
pub use rnfr::Rnfr;
pub use rnto::Rnto;
pub use size::Size;
pub use stat::Stat;
pub use stor::Stor;
pub use stru::Stru;
pub use syst::Syst;
pub use type_::Type;
pub use user::User;

use crate::server::controlchan::{Reply, ReplyCode};
use crate::storage::{Error, ErrorKind};

// Turns a storage error into the reply its kind prescribes. The kind's
// display string carries the reply text.
pub(crate) fn storage_error_reply(err: Error) -> Reply {
    let code = match err.kind() {
        ErrorKind::TransientFileNotAvailable => ReplyCode::TransientFileError,
        ErrorKind::PermanentFileNotAvailable
        | ErrorKind::PermanentDirectoryNotAvailable
        | ErrorKind::PermanentDirectoryNotEmpty
        | ErrorKind::PermissionDenied
        | ErrorKind::ReadOnlyStorage
        | ErrorKind::CredentialError => ReplyCode::FileError,
        ErrorKind::SizeMismatch | ErrorKind::PartialRename | ErrorKind::LocalError => ReplyCode::LocalError,
        ErrorKind::ConnectionClosed => ReplyCode::ConnectionClosed,
        ErrorKind::InsufficientStorageSpaceError => ReplyCode::OutOfSpace,
        ErrorKind::ExceededStorageAllocationError => ReplyCode::ExceededStorageAllocation,
        ErrorKind::FileNameNotAllowedError => ReplyCode::BadFileName,
        ErrorKind::CommandNotImplemented => ReplyCode::CommandNotImplemented,
    };
    let msg = err.kind().to_string();
    // The display string leads with the numeric code; strip it, the codec
    // writes the code itself.
    let msg = msg.splitn(2, ' ').nth(1).unwrap_or("Failed").to_string();
    Reply::new_with_string(code, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reply_text_loses_the_leading_code() {
        let reply = storage_error_reply(Error::from(ErrorKind::PermanentFileNotAvailable));
        match reply {
            Reply::CodeAndMsg { code, msg } => {
                assert_eq!(code, ReplyCode::FileError);
                assert_eq!(msg, "Permanent file not available");
            }
            _ => panic!("expected CodeAndMsg"),
        }
    }

    #[test]
    fn size_mismatch_maps_to_451() {
        let reply = storage_error_reply(Error::from(ErrorKind::SizeMismatch));
        assert!(reply.matches_code(ReplyCode::LocalError));
    }
}
