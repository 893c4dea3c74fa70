//! The per-session storage binding: a [`StorageBackend`] that starts
//! unbound and, at login, captures the user's backend reference. The first
//! storage operation resolves the referenced backend record and its
//! credentials into one of the three concrete back-ends.
//!
//! Credentials are resolved per session and never cached across sessions,
//! so secret rotation takes effect on the next login.

use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tenftp::storage::{Error, ErrorKind, FEATURE_RESTART, Fileinfo, Metadata, Result, StorageBackend};
use tenftp_registry::records::{BackendKind, BackendRef, parse_mode};
use tenftp_registry::resolve::{self, OBJECT_STORE_KEYS, WEBDAV_KEYS};
use tenftp_registry::{RecordCache, TenantUser};
use tenftp_sbe_fs::Filesystem;
use tenftp_sbe_objstore::ObjectStorage;
use tenftp_sbe_webdav::WebdavStorage;
use tokio::sync::OnceCell;

// The closed set of back-ends a session can bind to.
enum Backend {
    ObjectStore(ObjectStorage),
    Webdav(WebdavStorage),
    Filesystem(Filesystem),
}

impl Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::ObjectStore(_) => write!(f, "ObjectStore"),
            Backend::Webdav(_) => write!(f, "WebDAV"),
            Backend::Filesystem(_) => write!(f, "Filesystem"),
        }
    }
}

/// Storage for one session. Created unbound by the server's storage
/// generator; `enter()` pins it to the authenticated user.
#[derive(Debug)]
pub struct DispatchingStorage {
    registry: Arc<RecordCache>,
    binding: Option<BindingSpec>,
    backend: OnceCell<Backend>,
}

#[derive(Debug, Clone)]
struct BindingSpec {
    backend_ref: BackendRef,
    // Namespace of the user record; backend refs without one resolve here.
    namespace: String,
    username: String,
}

impl DispatchingStorage {
    pub fn new(registry: Arc<RecordCache>) -> Self {
        DispatchingStorage {
            registry,
            binding: None,
            backend: OnceCell::new(),
        }
    }

    fn credential_error<E: std::fmt::Display>(err: E) -> Error {
        Error::new(ErrorKind::CredentialError, err.to_string())
    }

    async fn backend(&self) -> Result<&Backend> {
        let spec = self.binding.as_ref().ok_or_else(|| Error::from(ErrorKind::PermissionDenied))?;
        self.backend
            .get_or_try_init(|| async { self.bind(spec).await })
            .await
    }

    // Resolves the backend record plus its credentials and constructs the
    // concrete back-end. Runs once per session.
    async fn bind(&self, spec: &BindingSpec) -> Result<Backend> {
        let namespace = spec.backend_ref.namespace.as_deref().unwrap_or(&spec.namespace);
        let source = self.registry.source();

        tracing::debug!(
            username = %spec.username,
            kind = ?spec.backend_ref.kind,
            backend = %spec.backend_ref.name,
            namespace,
            "binding session storage"
        );

        match spec.backend_ref.kind {
            BackendKind::ObjectStore => {
                let record = self
                    .registry
                    .get_object_store_backend(&spec.backend_ref.name, namespace)
                    .await
                    .map_err(Self::credential_error)?;
                let (access_key, secret_key) = resolve::resolve_backend_credentials(&record.credentials, &record.namespace, OBJECT_STORE_KEYS, source.as_ref())
                    .await
                    .map_err(Self::credential_error)?;
                let tls = tenftp_sbe_objstore::TlsConfig {
                    insecure_skip_verify: record.tls.as_ref().is_some_and(|t| t.insecure_skip_verify),
                    ca_cert: record.tls.as_ref().and_then(|t| t.ca_cert.clone()),
                };
                let storage = ObjectStorage::new(&record.endpoint, record.bucket, record.region, record.path_prefix, access_key, secret_key, &tls)?;
                Ok(Backend::ObjectStore(storage))
            }
            BackendKind::WebDav => {
                let record = self
                    .registry
                    .get_webdav_backend(&spec.backend_ref.name, namespace)
                    .await
                    .map_err(Self::credential_error)?;
                let (username, password) = resolve::resolve_backend_credentials(&record.credentials, &record.namespace, WEBDAV_KEYS, source.as_ref())
                    .await
                    .map_err(Self::credential_error)?;
                let tls = tenftp_sbe_webdav::TlsConfig {
                    insecure_skip_verify: record.tls.as_ref().is_some_and(|t| t.insecure_skip_verify),
                    ca_cert: record.tls.as_ref().and_then(|t| t.ca_cert.clone()),
                };
                let storage = WebdavStorage::new(&record.endpoint, record.base_path, username, password, &tls)?;
                Ok(Backend::Webdav(storage))
            }
            BackendKind::Filesystem => {
                let record = self
                    .registry
                    .get_filesystem_backend(&spec.backend_ref.name, namespace)
                    .await
                    .map_err(Self::credential_error)?;
                let file_mode = parse_mode(&record.file_mode).map_err(|e| Error::new(ErrorKind::LocalError, e))?;
                let dir_mode = parse_mode(&record.dir_mode).map_err(|e| Error::new(ErrorKind::LocalError, e))?;
                let storage = Filesystem::new(record.base_path)
                    .read_only(record.read_only)
                    .file_mode(file_mode)
                    .dir_mode(dir_mode)
                    .max_file_size(record.max_file_size);
                Ok(Backend::Filesystem(storage))
            }
        }
    }
}

/// Metadata from whichever back-end the session bound to.
#[derive(Debug)]
pub enum DispatchMeta {
    ObjectStore(tenftp_sbe_objstore::ObjectMetadata),
    Webdav(tenftp_sbe_webdav::DavMetadata),
    Filesystem(tenftp_sbe_fs::Meta),
}

impl Metadata for DispatchMeta {
    fn len(&self) -> u64 {
        match self {
            DispatchMeta::ObjectStore(m) => m.len(),
            DispatchMeta::Webdav(m) => m.len(),
            DispatchMeta::Filesystem(m) => m.len(),
        }
    }

    fn is_dir(&self) -> bool {
        match self {
            DispatchMeta::ObjectStore(m) => m.is_dir(),
            DispatchMeta::Webdav(m) => m.is_dir(),
            DispatchMeta::Filesystem(m) => m.is_dir(),
        }
    }

    fn is_file(&self) -> bool {
        match self {
            DispatchMeta::ObjectStore(m) => m.is_file(),
            DispatchMeta::Webdav(m) => m.is_file(),
            DispatchMeta::Filesystem(m) => m.is_file(),
        }
    }

    fn is_symlink(&self) -> bool {
        match self {
            DispatchMeta::Filesystem(m) => m.is_symlink(),
            _ => false,
        }
    }

    fn modified(&self) -> Result<SystemTime> {
        match self {
            DispatchMeta::ObjectStore(m) => m.modified(),
            DispatchMeta::Webdav(m) => m.modified(),
            DispatchMeta::Filesystem(m) => m.modified(),
        }
    }

    fn uid(&self) -> u32 {
        match self {
            DispatchMeta::Filesystem(m) => m.uid(),
            _ => 0,
        }
    }

    fn gid(&self) -> u32 {
        match self {
            DispatchMeta::Filesystem(m) => m.gid(),
            _ => 0,
        }
    }

    fn links(&self) -> u64 {
        match self {
            DispatchMeta::Filesystem(m) => m.links(),
            _ => 1,
        }
    }
}

fn map_files<M: Metadata>(files: Vec<Fileinfo<PathBuf, M>>, wrap: fn(M) -> DispatchMeta) -> Vec<Fileinfo<PathBuf, DispatchMeta>> {
    files
        .into_iter()
        .map(|fi| Fileinfo {
            path: fi.path,
            metadata: wrap(fi.metadata),
        })
        .collect()
}

#[async_trait]
impl StorageBackend<TenantUser> for DispatchingStorage {
    type Metadata = DispatchMeta;

    fn enter(&mut self, user: &TenantUser) -> io::Result<()> {
        self.binding = Some(BindingSpec {
            backend_ref: user.backend_ref.clone(),
            namespace: user.namespace.clone(),
            username: user.username.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "dispatching"
    }

    fn supported_features(&self) -> u32 {
        // Offset reads work on all three back-ends (seek or Range); upload
        // offsets are narrowed by the engine regardless.
        FEATURE_RESTART
    }

    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, user: &TenantUser, path: P) -> Result<Self::Metadata> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.metadata(user, path).await.map(DispatchMeta::ObjectStore),
            Backend::Webdav(s) => s.metadata(user, path).await.map(DispatchMeta::Webdav),
            Backend::Filesystem(s) => s.metadata(user, path).await.map(DispatchMeta::Filesystem),
        }
    }

    async fn list<P>(&self, user: &TenantUser, path: P) -> Result<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        P: AsRef<Path> + Send + Debug,
        <Self as StorageBackend<TenantUser>>::Metadata: Metadata,
    {
        match self.backend().await? {
            Backend::ObjectStore(s) => Ok(map_files(s.list(user, path).await?, DispatchMeta::ObjectStore)),
            Backend::Webdav(s) => Ok(map_files(s.list(user, path).await?, DispatchMeta::Webdav)),
            Backend::Filesystem(s) => Ok(map_files(s.list(user, path).await?, DispatchMeta::Filesystem)),
        }
    }

    async fn get<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &TenantUser,
        path: P,
        start_pos: u64,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.get(user, path, start_pos).await,
            Backend::Webdav(s) => s.get(user, path, start_pos).await,
            Backend::Filesystem(s) => s.get(user, path, start_pos).await,
        }
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        user: &TenantUser,
        input: R,
        path: P,
        start_pos: u64,
    ) -> Result<u64> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.put(user, input, path, start_pos).await,
            Backend::Webdav(s) => s.put(user, input, path, start_pos).await,
            Backend::Filesystem(s) => s.put(user, input, path, start_pos).await,
        }
    }

    async fn del<P: AsRef<Path> + Send + Debug>(&self, user: &TenantUser, path: P) -> Result<()> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.del(user, path).await,
            Backend::Webdav(s) => s.del(user, path).await,
            Backend::Filesystem(s) => s.del(user, path).await,
        }
    }

    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, user: &TenantUser, path: P) -> Result<()> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.mkd(user, path).await,
            Backend::Webdav(s) => s.mkd(user, path).await,
            Backend::Filesystem(s) => s.mkd(user, path).await,
        }
    }

    async fn rename<P: AsRef<Path> + Send + Debug>(&self, user: &TenantUser, from: P, to: P) -> Result<()> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.rename(user, from, to).await,
            Backend::Webdav(s) => s.rename(user, from, to).await,
            Backend::Filesystem(s) => s.rename(user, from, to).await,
        }
    }

    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, user: &TenantUser, path: P) -> Result<()> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.rmd(user, path).await,
            Backend::Webdav(s) => s.rmd(user, path).await,
            Backend::Filesystem(s) => s.rmd(user, path).await,
        }
    }

    async fn cwd<P: AsRef<Path> + Send + Debug>(&self, user: &TenantUser, path: P) -> Result<()> {
        match self.backend().await? {
            Backend::ObjectStore(s) => s.cwd(user, path).await,
            Backend::Webdav(s) => s.cwd(user, path).await,
            Backend::Filesystem(s) => s.cwd(user, path).await,
        }
    }
}
