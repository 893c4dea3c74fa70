use crate::server::password::Password;

use bytes::Bytes;
use std::{fmt, path::PathBuf};

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    User {
        /// The bytes making up the actual username.
        username: Bytes,
    },
    Pass {
        /// The password; redacted in logs by construction.
        password: Password,
    },
    Acct {
        /// The account token; treated like a password for logging purposes.
        account: Password,
    },
    Syst,
    Stat {
        /// The path about which information is requested, if given.
        path: Option<String>,
    },
    Type,
    Stru {
        /// The structure the client wants to switch to. Only `File` is supported.
        structure: StruParam,
    },
    Mode {
        /// The transfer mode the client wants to switch to. Only `Stream` is supported.
        mode: ModeParam,
    },
    Help,
    Noop,
    Pasv,
    Epsv,
    Port {
        /// The address the client wants us to make an active connection to.
        /// Active mode is not supported; the handler refuses it.
        addr: String,
    },
    Retr {
        /// The path to the file the client would like to retrieve.
        path: String,
    },
    Stor {
        /// The path to the file the client would like to store.
        path: String,
    },
    Appe {
        /// The path the client wants to append to. Handled as a plain store;
        /// none of the storage back-ends offer append-at-offset.
        path: String,
    },
    List {
        /// Arguments passed along with the list command.
        options: Option<String>,
        /// The path of the file/directory the client wants to list.
        path: Option<String>,
    },
    Nlst {
        /// The path of the directory the client wants to list.
        path: Option<String>,
    },
    /// Machine-readable directory listing over the data channel (RFC 3659).
    Mlsd {
        path: Option<String>,
    },
    /// Machine-readable facts about a single path (RFC 3659).
    Mlst {
        path: Option<String>,
    },
    Feat,
    Opts {
        /// The option the client wants to set.
        option: Opt,
    },
    Pwd,
    Cwd {
        /// The path the client would like to change directory to.
        path: PathBuf,
    },
    Cdup,
    Dele {
        /// The (regular) file to delete.
        path: String,
    },
    Rmd {
        /// The directory to delete.
        path: String,
    },
    Quit,
    Mkd {
        /// The path to the directory the client wants to create.
        path: PathBuf,
    },
    Allo,
    Abor,
    Rnfr {
        /// The file to be renamed.
        file: PathBuf,
    },
    Rnto {
        /// The filename to rename to.
        file: PathBuf,
    },
    Auth {
        /// The protocol the client wants to secure the channel with. This
        /// deployment carries no TLS layer, so the handler refuses.
        protocol: AuthParam,
    },
    Size {
        file: PathBuf,
    },
    Rest {
        offset: u64,
    },
    /// Modification Time (MDTM) as specified in RFC 3659.
    Mdtm {
        file: PathBuf,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StruParam {
    File,
    Record,
    Page,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ModeParam {
    Stream,
    Block,
    Compressed,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AuthParam {
    Tls,
    Ssl,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Opt {
    /// The client wants us to enable/disable UTF-8 treatment of paths.
    /// We always deal in UTF-8, so this is a no-op either way.
    Utf8 {
        on: bool,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Debug keeps PASS/ACCT redacted through the Password newtype.
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pass_formats_redacted() {
        let cmd = Command::Pass {
            password: "letmein".into(),
        };
        assert_eq!(format!("{}", cmd), "Pass { password: Password { bytes: ******* } }");
    }

    #[test]
    fn acct_formats_redacted() {
        let cmd = Command::Acct {
            account: "acct-token".into(),
        };
        assert!(!format!("{}", cmd).contains("acct-token"));
    }
}
