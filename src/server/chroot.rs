//! Rewrites client-supplied paths into the user's home subtree.
//!
//! Every command handler that takes a path runs it through [`resolve`]
//! before anything touches storage; for RNFR/RNTO both ends are resolved.
//! The resolution is purely lexical: `.` and `..` are folded without
//! consulting the back-end, so a path that *names* something outside the
//! confinement is refused even if nothing exists there.

use crate::auth::UserDetail;
use crate::storage::{Error, ErrorKind};
use std::path::{Component, Path, PathBuf};

// Folds `.`/`..` over the virtual root. Returns None when `..` reaches above
// the root, which is the escape case callers must refuse.
fn clean_virtual(base: &Path, input: &Path) -> Option<PathBuf> {
    let start: PathBuf = if input.is_absolute() { PathBuf::from("/") } else { base.to_path_buf() };
    let mut stack: Vec<std::ffi::OsString> = start
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            _ => None,
        })
        .collect();

    for component in input.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Prefix(_) => return None,
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return None;
                }
            }
            Component::Normal(part) => stack.push(part.to_os_string()),
        }
    }

    let mut out = PathBuf::from("/");
    for part in stack {
        out.push(part);
    }
    Some(out)
}

/// Resolves a client path to the session's *virtual* absolute path: `/` is
/// the top of what the client can see. Fails with `PermissionDenied` when
/// the path climbs above the virtual root.
pub(crate) fn virtual_path(cwd: &Path, input: &Path) -> Result<PathBuf, Error> {
    clean_virtual(cwd, input).ok_or_else(|| Error::from(ErrorKind::PermissionDenied))
}

/// Resolves a client path to the path handed to the storage back-end.
///
/// For a confined user the virtual root is the user's home directory, so the
/// result is `home` + virtual path and can never leave the home subtree; the
/// virtual root itself resolves to the home directory and is always valid.
/// For an unconfined user the cleaned virtual path is returned as-is.
pub(crate) fn resolve<User: UserDetail>(user: &User, cwd: &Path, input: &Path) -> Result<PathBuf, Error> {
    let vpath = virtual_path(cwd, input)?;
    if !user.chroot() {
        return Ok(vpath);
    }
    let home = match user.home() {
        Some(home) => home,
        None => return Ok(vpath),
    };
    match vpath.strip_prefix("/") {
        Ok(rel) if rel.as_os_str().is_empty() => Ok(home.to_path_buf()),
        Ok(rel) => Ok(home.join(rel)),
        Err(_) => Ok(home.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{StoragePermissions, UserDetail};
    use pretty_assertions::assert_eq;
    use std::fmt;

    #[derive(Debug)]
    struct TestUser {
        home: PathBuf,
        chroot: bool,
    }

    impl fmt::Display for TestUser {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test-user")
        }
    }

    impl UserDetail for TestUser {
        fn home(&self) -> Option<&Path> {
            Some(&self.home)
        }
        fn chroot(&self) -> bool {
            self.chroot
        }
        fn storage_permissions(&self) -> StoragePermissions {
            StoragePermissions::all()
        }
    }

    fn bob() -> TestUser {
        TestUser {
            home: PathBuf::from("/b"),
            chroot: true,
        }
    }

    #[test]
    fn absolute_paths_are_anchored_at_home() {
        let p = resolve(&bob(), Path::new("/"), Path::new("/docs/report.txt")).unwrap();
        assert_eq!(p, PathBuf::from("/b/docs/report.txt"));
    }

    #[test]
    fn relative_paths_join_the_cwd() {
        let p = resolve(&bob(), Path::new("/docs"), Path::new("report.txt")).unwrap();
        assert_eq!(p, PathBuf::from("/b/docs/report.txt"));
    }

    #[test]
    fn the_virtual_root_is_the_home_directory() {
        let p = resolve(&bob(), Path::new("/"), Path::new("/")).unwrap();
        assert_eq!(p, PathBuf::from("/b"));
    }

    #[test]
    fn dotdot_inside_the_tree_folds() {
        let p = resolve(&bob(), Path::new("/docs/deep"), Path::new("../other/x")).unwrap();
        assert_eq!(p, PathBuf::from("/b/docs/other/x"));
    }

    #[test]
    fn escape_by_dotdot_is_denied() {
        let err = resolve(&bob(), Path::new("/"), Path::new("../../etc/passwd")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn escape_by_absolute_dotdot_is_denied() {
        let err = resolve(&bob(), Path::new("/docs"), Path::new("/../etc")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn absolute_path_does_not_leave_home() {
        // "/etc" is a name *inside* the confinement, never the system path.
        let p = resolve(&bob(), Path::new("/"), Path::new("/etc")).unwrap();
        assert_eq!(p, PathBuf::from("/b/etc"));
    }

    #[test]
    fn unconfined_user_passes_through() {
        let user = TestUser {
            home: PathBuf::from("/b"),
            chroot: false,
        };
        let p = resolve(&user, Path::new("/"), Path::new("/srv/shared")).unwrap();
        assert_eq!(p, PathBuf::from("/srv/shared"));
    }

    #[test]
    fn virtual_cwd_tracking() {
        let v = virtual_path(Path::new("/"), Path::new("docs")).unwrap();
        assert_eq!(v, PathBuf::from("/docs"));
        let v = virtual_path(&v, Path::new("..")).unwrap();
        assert_eq!(v, PathBuf::from("/"));
    }
}
