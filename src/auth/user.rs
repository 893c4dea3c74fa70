use bitflags::bitflags;
use std::{
    fmt::{self, Debug, Display, Formatter},
    path::Path,
};

/// UserDetail defines the requirements for implementations that hold
/// _security subject_ information for use by the server: account state,
/// confinement and authorization.
pub trait UserDetail: Send + Sync + Display + Debug {
    /// Tells if this subject's account is enabled. This default implementation simply returns true.
    fn account_enabled(&self) -> bool {
        true
    }

    /// Returns the user's home directory, if any. If the user has a home
    /// directory and [`chroot`](UserDetail::chroot) is on, their session is
    /// confined to this subtree.
    ///
    /// The path must be absolute.
    fn home(&self) -> Option<&Path> {
        None
    }

    /// Tells whether client paths are confined to the home directory. When
    /// false the client addresses the back-end root directly.
    fn chroot(&self) -> bool {
        true
    }

    /// Tells what the user is authorised to do in terms of FTP filesystem operations.
    ///
    /// The default implementation gives all permissions.
    fn storage_permissions(&self) -> StoragePermissions {
        StoragePermissions::all()
    }

    /// Tells how this user authenticated. Used to tag the login counter.
    fn auth_method(&self) -> AuthMethod {
        AuthMethod::Inline
    }
}

/// How a user's password was established during login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// The password literal on the user record matched.
    Inline,
    /// The password was resolved from a referenced secret.
    Secret,
    /// Anonymous login; any password is accepted.
    Anonymous,
}

impl AuthMethod {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Inline => "inline",
            AuthMethod::Secret => "secret",
            AuthMethod::Anonymous => "anonymous",
        }
    }
}

bitflags! {
    /// The FTP operations that can be enabled/disabled for the storage back-end.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct StoragePermissions: u32 {
        /// If set allows FTP make directory
        const MK_DIR = 0b00000001;
        /// If set allows FTP remove directory
        const RM_DIR = 0b00000010;
        /// If set allows FTP GET i.e. clients can download files.
        const GET    = 0b00000100;
        /// If set allows FTP PUT i.e. clients can upload files.
        const PUT    = 0b00001000;
        /// If set allows FTP DELE i.e. clients can remove files.
        const DEL    = 0b00010000;
        /// If set allows FTP RENAME i.e. clients can rename directories and files
        const RENAME = 0b00100000;
        /// If set allows clients to list the contents of a directory.
        const LIST   = 0b01000000;

        /// Convenience aggregation of all the write operation bits.
        const WRITE_OPS = Self::MK_DIR.bits() | Self::RM_DIR.bits() | Self::PUT.bits() | Self::DEL.bits() | Self::RENAME.bits();
    }
}

impl StoragePermissions {
    /// Builds the permission set from the four booleans carried on a user
    /// record: `read` gates downloads and stats, `write` gates uploads,
    /// directory creation and renames, `delete` gates file and directory
    /// removal, `list` gates directory listings.
    pub fn from_bools(read: bool, write: bool, delete: bool, list: bool) -> Self {
        let mut perms = StoragePermissions::empty();
        if read {
            perms |= StoragePermissions::GET;
        }
        if write {
            perms |= StoragePermissions::PUT | StoragePermissions::MK_DIR | StoragePermissions::RENAME;
        }
        if delete {
            perms |= StoragePermissions::DEL | StoragePermissions::RM_DIR;
        }
        if list {
            perms |= StoragePermissions::LIST;
        }
        perms
    }
}

/// DefaultUser is a default implementation of the [`UserDetail`] trait that
/// doesn't hold any user information. It allows for quicker prototyping and
/// is what the tests of this crate use.
#[derive(Debug, PartialEq, Eq)]
pub struct DefaultUser;

impl UserDetail for DefaultUser {}

impl Display for DefaultUser {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultUser")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn permission_bools_map_onto_bits() {
        let p = StoragePermissions::from_bools(true, false, false, true);
        assert_eq!(p, StoragePermissions::GET | StoragePermissions::LIST);

        let p = StoragePermissions::from_bools(false, true, false, false);
        assert!(p.contains(StoragePermissions::PUT));
        assert!(p.contains(StoragePermissions::MK_DIR));
        assert!(p.contains(StoragePermissions::RENAME));
        assert!(!p.contains(StoragePermissions::DEL));

        let p = StoragePermissions::from_bools(false, false, true, false);
        assert_eq!(p, StoragePermissions::DEL | StoragePermissions::RM_DIR);
    }
}
