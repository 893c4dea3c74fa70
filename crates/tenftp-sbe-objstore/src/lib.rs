#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! A [tenftp](https://crates.io/crates/tenftp) storage back-end for
//! S3-compatible object stores (MinIO, Ceph RGW, AWS S3, ...).
//!
//! Objects have no directories, so the back-end emulates them:
//!
//! * a path is a file when an object with that exact key exists;
//! * a path is a directory when a delimited listing under `key/` can be
//!   made, even when that listing is empty. Directories emptied by a full
//!   delete therefore keep working;
//! * `mkd` writes a zero-byte marker object at `key/` so the directory
//!   survives stats and listings before anything is uploaded into it;
//! * listings collapse deeper keys into one synthetic directory entry per
//!   first segment.
//!
//! Uploads stream with an unknown size. After the store acknowledges the
//! PUT the object is stat'ed and its size compared against the streamed
//! byte count; a mismatch deletes the object and fails the transfer.

mod client;
mod list_response;
mod sign;

pub use client::TlsConfig;

use async_trait::async_trait;
use client::ObjectClient;
use secrecy::SecretString;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tenftp::auth::UserDetail;
use tenftp::storage::{Error, ErrorKind, Fileinfo, Metadata, Result, StorageBackend};

/// The object-store back-end. Keys are laid out as
/// `pathPrefix / resolved-client-path`.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    client: ObjectClient,
    prefix: String,
}

/// Metadata synthesized from HeadObject responses and listings.
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    size: u64,
    is_dir: bool,
    modified: Option<SystemTime>,
}

impl ObjectStorage {
    /// Connects to `endpoint`/`bucket` with the given credential pair.
    /// `path_prefix` sits between the bucket root and every path this
    /// back-end touches.
    pub fn new(
        endpoint: &str,
        bucket: impl Into<String>,
        region: impl Into<String>,
        path_prefix: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: SecretString,
        tls: &TlsConfig,
    ) -> std::result::Result<Self, Error> {
        let client = ObjectClient::new(endpoint, bucket.into(), region.into(), access_key.into(), secret_key, tls)?;
        let prefix = path_prefix.into().trim_matches('/').to_string();
        Ok(ObjectStorage { client, prefix })
    }

    // Maps a resolved client path onto an object key (no trailing slash).
    fn key_for<P: AsRef<Path>>(&self, path: P) -> String {
        let rel = path.as_ref().to_string_lossy();
        let rel = rel.trim_matches('/');
        match (self.prefix.is_empty(), rel.is_empty()) {
            (true, true) => String::new(),
            (true, false) => rel.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, rel),
        }
    }

    fn dir_prefix_for<P: AsRef<Path>>(&self, path: P) -> String {
        let key = self.key_for(path);
        if key.is_empty() { key } else { format!("{}/", key) }
    }

    async fn head_file(&self, key: &str) -> Result<ObjectMetadata> {
        let head = self.client.head(key).await?;
        Ok(ObjectMetadata {
            size: head.size,
            is_dir: false,
            modified: head.last_modified.map(SystemTime::from),
        })
    }
}

fn synthetic_dir() -> ObjectMetadata {
    ObjectMetadata {
        size: 0,
        is_dir: true,
        modified: None,
    }
}

fn basename(key: &str) -> String {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key).to_string()
}

#[async_trait]
impl<User: UserDetail> StorageBackend<User> for ObjectStorage {
    type Metadata = ObjectMetadata;

    #[tracing_attributes::instrument]
    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<Self::Metadata> {
        let key = self.key_for(&path);
        if key.is_empty() || key == self.prefix {
            // The root of the subtree is always a directory.
            return Ok(synthetic_dir());
        }
        match self.head_file(&key).await {
            Ok(meta) => Ok(meta),
            Err(err) if err.kind() == ErrorKind::PermanentFileNotAvailable => {
                // No object with that exact key: the path is a directory
                // when a delimited listing under it can be made. The
                // listing may be empty; emptied directories stay valid.
                let prefix = self.dir_prefix_for(&path);
                self.client.list(&prefix, None, Some(1)).await?;
                Ok(synthetic_dir())
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::type_complexity)]
    #[tracing_attributes::instrument]
    async fn list<P>(&self, _user: &User, path: P) -> Result<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        P: AsRef<Path> + Send + Debug,
        <Self as StorageBackend<User>>::Metadata: Metadata,
    {
        let prefix = self.dir_prefix_for(&path);
        let mut entries: Vec<Fileinfo<PathBuf, ObjectMetadata>> = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self.client.list(&prefix, continuation.take(), None).await?;

            for entry in &page.contents {
                // The zero-byte directory marker lists as the prefix itself.
                if entry.key == prefix || entry.key.ends_with('/') {
                    continue;
                }
                entries.push(Fileinfo {
                    path: PathBuf::from(basename(&entry.key)),
                    metadata: ObjectMetadata {
                        size: entry.size,
                        is_dir: false,
                        modified: entry.last_modified.map(SystemTime::from),
                    },
                });
            }
            for sub_prefix in &page.common_prefixes {
                entries.push(Fileinfo {
                    path: PathBuf::from(basename(sub_prefix)),
                    metadata: synthetic_dir(),
                });
            }

            if page.is_truncated && page.next_continuation_token.is_some() {
                continuation = page.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(entries)
    }

    async fn get<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P, start_pos: u64) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        self.client.get(&self.key_for(path), start_pos).await
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        _user: &User,
        input: R,
        path: P,
        _start_pos: u64,
    ) -> Result<u64> {
        let key = self.key_for(&path);

        // The store takes the stream without a declared size, so count the
        // bytes on the way through for the post-write verification.
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counted = CountingReader {
            inner: input,
            count: counter.clone(),
        };

        self.client.put_streaming(&key, counted).await?;
        let streamed = counter.load(std::sync::atomic::Ordering::SeqCst);

        // Post-write verification: what landed must be exactly what was
        // streamed; otherwise remove the incomplete object and fail.
        let stat = self.client.head(&key).await?;
        if stat.size != streamed {
            let _ = self.client.delete(&key).await;
            return Err(Error::from(ErrorKind::SizeMismatch));
        }

        Ok(streamed)
    }

    #[tracing_attributes::instrument]
    async fn del<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        self.client.delete(&self.key_for(path)).await
    }

    #[tracing_attributes::instrument]
    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        // A zero-byte marker object at `key/` makes the directory visible
        // to stat and list before anything is uploaded into it.
        let marker = self.dir_prefix_for(path);
        self.client.put_streaming(&marker, std::io::Cursor::new(Vec::new())).await
    }

    #[tracing_attributes::instrument]
    async fn rename<P: AsRef<Path> + Send + Debug>(&self, _user: &User, from: P, to: P) -> Result<()> {
        let from_key = self.key_for(&from);
        let to_key = self.key_for(&to);

        match self.client.head(&from_key).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::PermanentFileNotAvailable => {
                // Directory renames would need a copy per contained object;
                // the store offers nothing atomic to build them on.
                return Err(Error::new(ErrorKind::CommandNotImplemented, "directory rename is not supported on object storage"));
            }
            Err(err) => return Err(err),
        }

        // Copy first; a failure here leaves the source untouched.
        self.client.copy(&from_key, &to_key).await?;

        // A failure after the copy leaves both names; the client sees that
        // the rename did not complete.
        self.client
            .delete(&from_key)
            .await
            .map_err(|err| Error::new(ErrorKind::PartialRename, err))
    }

    #[tracing_attributes::instrument]
    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        let prefix = self.dir_prefix_for(&path);

        // Refuse to remove non-empty directories; only the marker object
        // (if any) may remain under the prefix.
        let listing = self.client.list(&prefix, None, Some(2)).await?;
        let occupied = !listing.common_prefixes.is_empty() || listing.contents.iter().any(|e| e.key != prefix);
        if occupied {
            return Err(Error::from(ErrorKind::PermanentDirectoryNotEmpty));
        }

        if listing.contents.iter().any(|e| e.key == prefix) {
            self.client.delete(&prefix).await?;
        }
        Ok(())
    }

    #[tracing_attributes::instrument]
    async fn cwd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()> {
        let meta = self.metadata(user, path).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(Error::from(ErrorKind::PermanentDirectoryNotAvailable))
        }
    }
}

// Counts the bytes flowing through an upload stream.
struct CountingReader<R> {
    inner: R,
    count: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl<R: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let me = &mut *self;
        let poll = std::pin::Pin::new(&mut me.inner).poll_read(cx, buf);
        if let std::task::Poll::Ready(Ok(())) = &poll {
            let read = (buf.filled().len() - before) as u64;
            me.count.fetch_add(read, std::sync::atomic::Ordering::SeqCst);
        }
        poll
    }
}

impl Metadata for ObjectMetadata {
    fn len(&self) -> u64 {
        self.size
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn is_file(&self) -> bool {
        !self.is_dir
    }

    fn modified(&self) -> Result<SystemTime> {
        self.modified.ok_or_else(|| Error::from(ErrorKind::PermanentFileNotAvailable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    fn storage(prefix: &str) -> ObjectStorage {
        ObjectStorage::new(
            "http://127.0.0.1:9000",
            "b",
            "us-east-1",
            prefix,
            "minio",
            SecretString::from("minio123".to_string()),
            &TlsConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn keys_carry_the_prefix_and_resolved_path() {
        let s = storage("tenants");
        assert_eq!(s.key_for("/alice/hello.txt"), "tenants/alice/hello.txt");
        assert_eq!(s.key_for("alice/hello.txt"), "tenants/alice/hello.txt");
        assert_eq!(s.key_for("/"), "tenants");
        assert_eq!(s.dir_prefix_for("/alice"), "tenants/alice/");
    }

    #[test]
    fn keys_without_prefix() {
        let s = storage("");
        assert_eq!(s.key_for("/alice/hello.txt"), "alice/hello.txt");
        assert_eq!(s.key_for("/"), "");
        assert_eq!(s.dir_prefix_for("/"), "");
    }

    #[test]
    fn basenames_of_keys_and_prefixes() {
        assert_eq!(basename("tenants/alice/hello.txt"), "hello.txt");
        assert_eq!(basename("tenants/alice/docs/"), "docs");
        assert_eq!(basename("solo"), "solo");
    }

    #[tokio::test]
    async fn counting_reader_counts() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut reader = CountingReader {
            inner: std::io::Cursor::new(vec![7u8; 1000]),
            count: counter.clone(),
        };
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1000);
        assert_eq!(sink.len(), 1000);
    }

    #[test]
    fn synthetic_directory_metadata() {
        let dir = synthetic_dir();
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert_eq!(dir.len(), 0);
        assert!(dir.modified().is_err());
    }
}
