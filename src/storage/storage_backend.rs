//! Defines the service provider interface for storage back-end implementors.

use super::error::Error;
use crate::auth::UserDetail;
use async_trait::async_trait;
use chrono::{
    Datelike,
    prelude::{DateTime, Utc},
};
use std::{
    fmt::{self, Debug, Formatter, Write},
    io,
    path::Path,
    result,
    time::SystemTime,
};

/// Tells if STOR/RETR restarts are supported by the storage back-end
/// i.e. starting from a different byte offset.
pub const FEATURE_RESTART: u32 = 0b0000_0001;

/// Result type used by traits in this module
pub type Result<T> = result::Result<T, Error>;

/// Represents the metadata of a _FTP File_
pub trait Metadata {
    /// Returns the length (size) of the file in bytes.
    fn len(&self) -> u64;

    /// Returns `self.len() == 0`.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the path is a directory.
    fn is_dir(&self) -> bool;

    /// Returns true if the path is a file.
    fn is_file(&self) -> bool;

    /// Returns true if the path is a symbolic link.
    fn is_symlink(&self) -> bool {
        false
    }

    /// Returns the last modified time of the path.
    fn modified(&self) -> Result<SystemTime>;

    /// Returns the `gid` of the file.
    fn gid(&self) -> u32 {
        0
    }

    /// Returns the `uid` of the file.
    fn uid(&self) -> u32 {
        0
    }

    /// Returns the number of links to the file. The default implementation always returns `1`
    fn links(&self) -> u64 {
        1
    }

    /// Returns the `permissions` of the file. The default implementation assumes unix permissions
    /// and defaults to "rwxr-xr-x" (octal 0755)
    fn permissions(&self) -> Permissions {
        Permissions(0o755)
    }
}

/// Represents the permissions of a _FTP File_
pub struct Permissions(pub u32);

const PERM_READ: u32 = 0b100100100;
const PERM_WRITE: u32 = 0b010010010;
const PERM_EXEC: u32 = 0b001001001;
const PERM_USER: u32 = 0b111000000;
const PERM_GROUP: u32 = 0b000111000;
const PERM_OTHERS: u32 = 0b000000111;

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_char(if self.0 & PERM_USER & PERM_READ > 0 { 'r' } else { '-' })?;
        f.write_char(if self.0 & PERM_USER & PERM_WRITE > 0 { 'w' } else { '-' })?;
        f.write_char(if self.0 & PERM_USER & PERM_EXEC > 0 { 'x' } else { '-' })?;
        f.write_char(if self.0 & PERM_GROUP & PERM_READ > 0 { 'r' } else { '-' })?;
        f.write_char(if self.0 & PERM_GROUP & PERM_WRITE > 0 { 'w' } else { '-' })?;
        f.write_char(if self.0 & PERM_GROUP & PERM_EXEC > 0 { 'x' } else { '-' })?;
        f.write_char(if self.0 & PERM_OTHERS & PERM_READ > 0 { 'r' } else { '-' })?;
        f.write_char(if self.0 & PERM_OTHERS & PERM_WRITE > 0 { 'w' } else { '-' })?;
        f.write_char(if self.0 & PERM_OTHERS & PERM_EXEC > 0 { 'x' } else { '-' })?;
        Ok(())
    }
}

/// Fileinfo contains the path and [`Metadata`] of a file.
#[derive(Clone)]
pub struct Fileinfo<P, M>
where
    P: AsRef<Path>,
    M: Metadata,
{
    /// The full path to the file
    pub path: P,
    /// The file's metadata
    pub metadata: M,
}

impl<P, M> fmt::Display for Fileinfo<P, M>
where
    P: AsRef<Path>,
    M: Metadata,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let modified: String = self
            .metadata
            .modified()
            .map(|modified| {
                let modified = DateTime::<Utc>::from(modified);
                let now = Utc::now();
                if modified.year() == now.year() {
                    modified.format("%b %d %H:%M").to_string()
                } else {
                    modified.format("%b %d %Y").to_string()
                }
            })
            .unwrap_or_else(|_| "--- -- --:--".to_string());
        let basename = self.path.as_ref().components().next_back();
        let path = match basename {
            Some(v) => v.as_os_str().to_string_lossy(),
            None => {
                return Err(fmt::Error);
            }
        };
        write!(
            f,
            "{filetype}{permissions} {links:>12} {owner:>12} {group:>12} {size:#14} {modified:>12} {path}",
            filetype = if self.metadata.is_dir() { "d" } else { "-" },
            permissions = self.metadata.permissions(),
            links = self.metadata.links(),
            owner = self.metadata.uid(),
            group = self.metadata.gid(),
            size = self.metadata.len(),
            modified = modified,
            path = path,
        )
    }
}

/// Formats one fact line of a MLSD/MLST response per RFC 3659.
pub fn mlsx_line<M: Metadata>(name: &str, metadata: &M) -> String {
    let modify = metadata
        .modified()
        .map(|m| DateTime::<Utc>::from(m).format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|_| "19700101000000".to_string());
    if metadata.is_dir() {
        format!("type=dir;modify={}; {}", modify, name)
    } else {
        format!("type=file;size={};modify={}; {}", metadata.len(), modify, name)
    }
}

/// The `StorageBackend` trait can be implemented to create custom FTP virtual
/// file systems. Implementations are registered with the
/// [`Server`](crate::Server) on construction; one instance is created per
/// control connection.
#[async_trait]
pub trait StorageBackend<User: UserDetail>: Send + Sync + Debug {
    /// The concrete type of the _metadata_ used by this storage back-end.
    type Metadata: Metadata + Sync + Send;

    /// Restrict the back-end's capabilities commensurate with the provided
    /// [`UserDetail`](crate::auth::UserDetail). Called once, after the user
    /// authenticated. This is where a multi-tenant back-end materialises the
    /// session's storage binding (resolves credentials, opens clients).
    ///
    /// Once restricted, it may never be unrestricted.
    fn enter(&mut self, _user_detail: &User) -> io::Result<()> {
        Ok(())
    }

    /// Implement to set the name of the storage back-end. By default it returns the type signature.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Tells which optional features are supported by the storage back-end
    /// Return a value with bits set according to the FEATURE_* constants.
    fn supported_features(&self) -> u32 {
        0
    }

    /// Returns the `Metadata` for the given file or directory.
    ///
    /// Back-ends that emulate directories (key prefixes, collections) must
    /// report a directory here whenever a listing of the path would succeed,
    /// even if that listing is empty. Rejecting empty directories breaks
    /// directory navigation after a full delete.
    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<Self::Metadata>;

    /// Returns the list of files in the given directory.
    async fn list<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<Vec<Fileinfo<std::path::PathBuf, Self::Metadata>>>
    where
        <Self as StorageBackend<User>>::Metadata: Metadata;

    /// Returns some bytes that make up a directory listing that can immediately be sent to the client.
    #[allow(clippy::type_complexity)]
    #[tracing_attributes::instrument]
    async fn list_fmt<P>(&self, user: &User, path: P) -> std::result::Result<std::io::Cursor<Vec<u8>>, Error>
    where
        P: AsRef<Path> + Send + Debug,
        Self::Metadata: Metadata + 'static,
    {
        let list = self.list(user, path).await?;

        let buffer = list.iter().fold(String::new(), |mut buf, fi| {
            let _ = write!(buf, "{}\r\n", fi);
            buf
        });

        Ok(std::io::Cursor::new(buffer.into_bytes()))
    }

    /// Returns directory listing as a vec of strings used for multi line responses in the control channel.
    #[tracing_attributes::instrument]
    async fn list_vec<P>(&self, user: &User, path: P) -> std::result::Result<Vec<String>, Error>
    where
        P: AsRef<Path> + Send + Debug,
        Self::Metadata: Metadata + 'static,
    {
        let inlist = self.list(user, path).await?;
        let out = inlist.iter().map(|fi| fi.to_string()).collect::<Vec<String>>();

        Ok(out)
    }

    /// Returns some bytes that make up a NLST directory listing (only the basename) that can
    /// immediately be sent to the client.
    #[allow(clippy::type_complexity)]
    #[tracing_attributes::instrument]
    async fn nlst<P>(&self, user: &User, path: P) -> std::result::Result<std::io::Cursor<Vec<u8>>, Error>
    where
        P: AsRef<Path> + Send + Debug,
        Self::Metadata: Metadata + 'static,
    {
        let list = self.list(user, path).await?;

        let buffer = list.iter().fold(String::new(), |mut buf, fi| {
            let _ = write!(
                buf,
                "{}\r\n",
                fi.path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("")).to_str().unwrap_or("")
            );
            buf
        });

        Ok(std::io::Cursor::new(buffer.into_bytes()))
    }

    /// Returns a machine-readable MLSD listing (RFC 3659) ready to be sent
    /// over the data channel.
    #[allow(clippy::type_complexity)]
    #[tracing_attributes::instrument]
    async fn mlsd_fmt<P>(&self, user: &User, path: P) -> std::result::Result<std::io::Cursor<Vec<u8>>, Error>
    where
        P: AsRef<Path> + Send + Debug,
        Self::Metadata: Metadata + 'static,
    {
        let list = self.list(user, path).await?;

        let buffer = list.iter().fold(String::new(), |mut buf, fi| {
            let name = fi.path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("")).to_string_lossy();
            let _ = write!(buf, "{}\r\n", mlsx_line(&name, &fi.metadata));
            buf
        });

        Ok(std::io::Cursor::new(buffer.into_bytes()))
    }

    /// Gets the content of the given FTP file from offset start_pos by copying it to the output writer.
    /// The starting position is only greater than zero if the storage back-end implementation
    /// advertises partial reads through the supported_features method.
    async fn get_into<'a, P, W: ?Sized>(&self, user: &User, path: P, start_pos: u64, output: &'a mut W) -> Result<u64>
    where
        W: tokio::io::AsyncWrite + Unpin + Sync + Send,
        P: AsRef<Path> + Send + Debug,
    {
        let mut reader = self.get(user, path, start_pos).await?;
        Ok(tokio::io::copy(&mut reader, output).await.map_err(Error::from)?)
    }

    /// Returns the content of the given file from offset start_pos.
    /// The starting position is only greater than zero if the storage back-end implementation
    /// advertises partial reads through the supported_features method.
    async fn get<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P, start_pos: u64) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    /// Writes bytes from the given reader to the specified path. The returned
    /// value is the number of bytes written *as verified after the write*:
    /// implementations stat their own artifact after streaming completes and,
    /// when the stored size differs from the streamed byte count, remove the
    /// artifact on a best-effort basis and fail with
    /// [`ErrorKind::SizeMismatch`](super::ErrorKind).
    ///
    /// `start_pos` is always `0` by the time a client request reaches the
    /// back-end; the engine narrows restarted uploads (see the STOR handler).
    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        user: &User,
        input: R,
        path: P,
        start_pos: u64,
    ) -> Result<u64>;

    /// Deletes the file at the given path.
    async fn del<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;

    /// Creates the given directory.
    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;

    /// Renames the given file to the given new filename.
    async fn rename<P: AsRef<Path> + Send + Debug>(&self, user: &User, from: P, to: P) -> Result<()>;

    /// Deletes the given directory. Not recursive: back-ends refuse to remove
    /// non-empty directories.
    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;

    /// Changes the working directory to the given path. Implementations only
    /// verify that the path exists and is a directory; the working directory
    /// itself is session state kept by the engine.
    async fn cwd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Meta {
        len: u64,
        dir: bool,
    }

    impl Metadata for Meta {
        fn len(&self) -> u64 {
            self.len
        }
        fn is_dir(&self) -> bool {
            self.dir
        }
        fn is_file(&self) -> bool {
            !self.dir
        }
        fn modified(&self) -> Result<SystemTime> {
            Ok(SystemTime::UNIX_EPOCH)
        }
    }

    #[test]
    fn mlsx_line_for_file_and_dir() {
        let file = Meta { len: 12, dir: false };
        assert_eq!(mlsx_line("hello.txt", &file), "type=file;size=12;modify=19700101000000; hello.txt");

        let dir = Meta { len: 0, dir: true };
        assert_eq!(mlsx_line("docs", &dir), "type=dir;modify=19700101000000; docs");
    }

    #[test]
    fn permissions_render_rwx_triples() {
        assert_eq!(format!("{}", Permissions(0o755)), "rwxr-xr-x");
        assert_eq!(format!("{}", Permissions(0o640)), "rw-r-----");
    }
}
