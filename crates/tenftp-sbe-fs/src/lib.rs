#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! A [tenftp](https://crates.io/crates/tenftp) storage back-end that keeps
//! its files under a directory on local disk.
//!
//! Uploads are atomic: the payload is streamed into a `.tmp` sibling,
//! fsynced, size-verified, renamed into place and verified once more. A
//! failure anywhere on that path removes the partial artifact. The back-end
//! can be configured read-only, with an upload size cap, and with the file
//! and directory modes to create entries with.

use async_trait::async_trait;
use std::{
    fmt::Debug,
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tenftp::auth::UserDetail;
use tenftp::storage::{Error, ErrorKind, FEATURE_RESTART, Fileinfo, Metadata, Permissions, Result, StorageBackend};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Compile-time defaults for the modes; deployments normally configure
/// these from the backend record.
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// The [`Filesystem`] back-end stores every path under `base_path`.
/// [`full_path`](Filesystem::full_path) clamps every resolved path to that
/// base, independently of the confinement the engine already applies.
#[derive(Debug, Clone)]
pub struct Filesystem {
    base_path: PathBuf,
    read_only: bool,
    file_mode: u32,
    dir_mode: u32,
    /// 0 means unbounded.
    max_file_size: u64,
}

/// Metadata for the filesystem back-end.
#[derive(Debug)]
pub struct Meta {
    inner: std::fs::Metadata,
}

impl Filesystem {
    /// Creates a back-end rooted at `base_path` with default modes, no size
    /// cap and writes enabled.
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Filesystem {
            base_path: base_path.into(),
            read_only: false,
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
            max_file_size: 0,
        }
    }

    /// Refuse every mutating operation.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Mode bits for created files.
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Mode bits for created directories.
    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Per-file upload cap in bytes; 0 disables the cap.
    pub fn max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = limit;
        self
    }

    /// Maps a client path onto the disk. The path is cleaned lexically and
    /// clamped to `base_path`: anything that would climb above the base
    /// resolves to the base itself, so no operation can ever leave it.
    fn full_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let mut clean = PathBuf::new();
        for component in path.as_ref().components() {
            match component {
                std::path::Component::Normal(part) => {
                    clean.push(part);
                }
                std::path::Component::ParentDir => {
                    // Popping an empty stack means the path tries to leave
                    // the base; the clamp ignores it.
                    clean.pop();
                }
                _ => {}
            }
        }
        self.base_path.join(clean)
    }

    fn deny_writes(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::from(ErrorKind::ReadOnlyStorage));
        }
        Ok(())
    }

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    // The write half of the atomic upload protocol: stream into a `.tmp`
    // sibling, fsync, verify the byte count, rename into place, verify the
    // final path. Failures remove whatever half-artifact exists.
    async fn write_atomically<R: tokio::io::AsyncRead + Send + Unpin>(&self, input: R, target: PathBuf) -> Result<u64> {
        let tmp = {
            let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| ".upload".into());
            name.push(".tmp");
            target.with_file_name(name)
        };

        let result = self.stream_to_tmp(input, &tmp, &target).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    async fn stream_to_tmp<R: tokio::io::AsyncRead + Send + Unpin>(&self, input: R, tmp: &Path, target: &Path) -> Result<u64> {
        let file = tokio::fs::File::create(tmp).await?;
        Self::set_mode(tmp, self.file_mode)?;

        let mut reader = tokio::io::BufReader::with_capacity(4096, input);
        let mut writer = tokio::io::BufWriter::with_capacity(4096, file);

        let mut buf = vec![0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if self.max_file_size > 0 && written > self.max_file_size {
                return Err(Error::from(ErrorKind::ExceededStorageAllocationError));
            }
            writer.write_all(&buf[..n]).await?;
        }
        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_all().await?;
        drop(file);

        // First verification: the temp artifact holds what was streamed.
        let tmp_meta = tokio::fs::metadata(tmp).await?;
        if tmp_meta.len() != written {
            return Err(Error::from(ErrorKind::SizeMismatch));
        }

        // Atomic within one filesystem.
        tokio::fs::rename(tmp, target).await?;

        // Second verification: what landed under the final name.
        let final_meta = tokio::fs::metadata(target).await?;
        if final_meta.len() != written {
            let _ = tokio::fs::remove_file(target).await;
            return Err(Error::from(ErrorKind::SizeMismatch));
        }

        Ok(written)
    }
}

#[async_trait]
impl<User: UserDetail> StorageBackend<User> for Filesystem {
    type Metadata = Meta;

    fn supported_features(&self) -> u32 {
        FEATURE_RESTART
    }

    #[tracing_attributes::instrument]
    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<Self::Metadata> {
        let full_path = self.full_path(path);
        let inner = tokio::fs::symlink_metadata(&full_path).await?;
        Ok(Meta { inner })
    }

    #[allow(clippy::type_complexity)]
    #[tracing_attributes::instrument]
    async fn list<P>(&self, _user: &User, path: P) -> Result<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        P: AsRef<Path> + Send + Debug,
        <Self as StorageBackend<User>>::Metadata: Metadata,
    {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&full_path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(Fileinfo {
                path: entry.file_name().into(),
                metadata: Meta { inner: metadata },
            });
        }
        Ok(entries)
    }

    async fn get<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P, start_pos: u64) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let full_path = self.full_path(path);
        let mut file = tokio::fs::File::open(&full_path).await?;
        if start_pos > 0 {
            file.seek(io::SeekFrom::Start(start_pos)).await?;
        }
        Ok(Box::new(tokio::io::BufReader::with_capacity(4096, file)) as Box<dyn tokio::io::AsyncRead + Send + Unpin>)
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        _user: &User,
        input: R,
        path: P,
        _start_pos: u64,
    ) -> Result<u64> {
        self.deny_writes()?;
        let target = self.full_path(path);
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
                Self::set_mode(parent, self.dir_mode)?;
            }
        }
        self.write_atomically(input, target).await
    }

    #[tracing_attributes::instrument]
    async fn del<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        self.deny_writes()?;
        let full_path = self.full_path(path);
        tokio::fs::remove_file(&full_path).await.map_err(|err: io::Error| err.into())
    }

    #[tracing_attributes::instrument]
    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        self.deny_writes()?;
        let full_path = self.full_path(path);
        tokio::fs::create_dir_all(&full_path).await?;
        Self::set_mode(&full_path, self.dir_mode)?;
        Ok(())
    }

    #[tracing_attributes::instrument]
    async fn rename<P: AsRef<Path> + Send + Debug>(&self, _user: &User, from: P, to: P) -> Result<()> {
        self.deny_writes()?;
        let from = self.full_path(from);
        let to = self.full_path(to);
        // Only rename things that exist; rename(2) on some platforms would
        // otherwise invent empty targets.
        let metadata = tokio::fs::symlink_metadata(&from).await?;
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(Error::from(ErrorKind::PermanentFileNotAvailable));
        }
        tokio::fs::rename(&from, &to).await.map_err(|err: io::Error| err.into())
    }

    #[tracing_attributes::instrument]
    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        self.deny_writes()?;
        let full_path = self.full_path(path);
        tokio::fs::remove_dir(&full_path).await.map_err(|err: io::Error| err.into())
    }

    #[tracing_attributes::instrument]
    async fn cwd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        let full_path = self.full_path(path);
        let metadata = tokio::fs::metadata(&full_path).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(Error::from(ErrorKind::PermanentDirectoryNotAvailable))
        }
    }
}

impl Metadata for Meta {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn is_dir(&self) -> bool {
        self.inner.is_dir()
    }

    fn is_file(&self) -> bool {
        self.inner.is_file()
    }

    fn is_symlink(&self) -> bool {
        self.inner.file_type().is_symlink()
    }

    fn modified(&self) -> Result<SystemTime> {
        self.inner.modified().map_err(|e| e.into())
    }

    fn gid(&self) -> u32 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            self.inner.gid()
        }
        #[cfg(not(unix))]
        {
            0
        }
    }

    fn uid(&self) -> u32 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            self.inner.uid()
        }
        #[cfg(not(unix))]
        {
            0
        }
    }

    fn links(&self) -> u64 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            self.inner.nlink()
        }
        #[cfg(not(unix))]
        {
            1
        }
    }

    fn permissions(&self) -> Permissions {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Permissions(self.inner.permissions().mode())
        }
        #[cfg(not(unix))]
        {
            Permissions(0o755)
        }
    }
}

#[cfg(test)]
mod tests;
