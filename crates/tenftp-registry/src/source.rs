//! The read interface over the external record store, plus two concrete
//! sources: a JSON file for self-contained deployments and an in-memory set
//! for tests and embedding.

use crate::records::{FilesystemBackendRecord, ObjectStoreBackendRecord, SecretRecord, UserRecord, WebDavBackendRecord};
use async_trait::async_trait;
use base64::Engine;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fmt::Debug;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by a [`RecordSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// The store could not be consulted at all.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Typed reads over the control plane's records. The core only ever reads;
/// reconciliation and validation of the records happen elsewhere.
#[async_trait]
pub trait RecordSource: Send + Sync + Debug {
    /// Lists every user record.
    async fn list_users(&self) -> Result<Vec<UserRecord>, SourceError>;

    /// Fetches one user by username.
    async fn get_user(&self, username: &str) -> Result<UserRecord, SourceError> {
        self.list_users()
            .await?
            .into_iter()
            .find(|u| u.username == username)
            .ok_or_else(|| SourceError::NotFound(format!("user/{}", username)))
    }

    /// Fetches a secret by name and namespace. Callers must not cache the
    /// result; rotation is only honoured by re-reading.
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<SecretRecord, SourceError>;

    /// Fetches an object-store backend record.
    async fn get_object_store_backend(&self, name: &str, namespace: &str) -> Result<ObjectStoreBackendRecord, SourceError>;

    /// Fetches a WebDAV backend record.
    async fn get_webdav_backend(&self, name: &str, namespace: &str) -> Result<WebDavBackendRecord, SourceError>;

    /// Fetches a filesystem backend record.
    async fn get_filesystem_backend(&self, name: &str, namespace: &str) -> Result<FilesystemBackendRecord, SourceError>;
}

/// One document's worth of records, the shape [`FileSource`] reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordSet {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub object_store_backends: Vec<ObjectStoreBackendRecord>,
    #[serde(default)]
    pub webdav_backends: Vec<WebDavBackendRecord>,
    #[serde(default)]
    pub filesystem_backends: Vec<FilesystemBackendRecord>,
    #[serde(default)]
    pub secrets: Vec<SecretRecord>,
}

impl RecordSet {
    /// Parses a record set from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        serde_json::from_str(json).map_err(|e| SourceError::Unavailable(format!("malformed records: {}", e)))
    }
}

/// A [`RecordSource`] backed by one JSON document on disk. The file may be
/// plain, gzipped, or gzipped+base64 (the latter helps squeeze records
/// through size-limited config mounts). Every read re-opens the file, so
/// edits and secret rotation take effect without a restart.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading from `path`. Fails fast when the file is
    /// unreadable or malformed so that startup catches configuration errors.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let source = FileSource {
            path: path.as_ref().to_path_buf(),
        };
        source.read()?;
        Ok(source)
    }

    fn read(&self) -> Result<RecordSet, SourceError> {
        let mut f = std::fs::File::open(&self.path).map_err(|e| SourceError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        let mut magic: [u8; 4] = [0; 4];
        let n = f.read(&mut magic[..]).map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let is_gz = n > 2 && magic[0] == 0x1F && magic[1] == 0x8B && magic[2] == 0x8;
        // The first 3 gzip magic bytes translate to "H4sI" in base64.
        let is_base64gz = n > 3 && magic[0] == b'H' && magic[1] == b'4' && magic[2] == b's' && magic[3] == b'I';

        f.rewind().map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let json: String = if is_gz | is_base64gz {
            let mut gzdata: Vec<u8> = Vec::new();
            if is_base64gz {
                let mut b = Vec::new();
                f.read_to_end(&mut b).map_err(|e| SourceError::Unavailable(e.to_string()))?;
                b.retain(|&x| x != b'\n' && x != b'\r');
                gzdata = base64::engine::general_purpose::STANDARD
                    .decode(b)
                    .map_err(|e| SourceError::Unavailable(format!("bad base64: {}", e)))?;
            } else {
                f.read_to_end(&mut gzdata).map_err(|e| SourceError::Unavailable(e.to_string()))?;
            }
            let mut d = GzDecoder::new(&gzdata[..]);
            let mut s = String::new();
            d.read_to_string(&mut s).map_err(|e| SourceError::Unavailable(format!("bad gzip: {}", e)))?;
            s
        } else {
            let mut s = String::new();
            f.read_to_string(&mut s).map_err(|e| SourceError::Unavailable(e.to_string()))?;
            s
        };

        RecordSet::from_json(&json)
    }
}

#[async_trait]
impl RecordSource for FileSource {
    async fn list_users(&self) -> Result<Vec<UserRecord>, SourceError> {
        Ok(self.read()?.users)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<SecretRecord, SourceError> {
        self.read()?
            .secrets
            .into_iter()
            .find(|s| s.name == name && s.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("secret/{}/{}", namespace, name)))
    }

    async fn get_object_store_backend(&self, name: &str, namespace: &str) -> Result<ObjectStoreBackendRecord, SourceError> {
        self.read()?
            .object_store_backends
            .into_iter()
            .find(|b| b.name == name && b.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("objectstorebackend/{}/{}", namespace, name)))
    }

    async fn get_webdav_backend(&self, name: &str, namespace: &str) -> Result<WebDavBackendRecord, SourceError> {
        self.read()?
            .webdav_backends
            .into_iter()
            .find(|b| b.name == name && b.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("webdavbackend/{}/{}", namespace, name)))
    }

    async fn get_filesystem_backend(&self, name: &str, namespace: &str) -> Result<FilesystemBackendRecord, SourceError> {
        self.read()?
            .filesystem_backends
            .into_iter()
            .find(|b| b.name == name && b.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("filesystembackend/{}/{}", namespace, name)))
    }
}

/// An in-memory [`RecordSource`], mostly for tests and embedders that fetch
/// records themselves.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: std::sync::Arc<std::sync::RwLock<RecordSet>>,
}

impl MemorySource {
    pub fn new(records: RecordSet) -> Self {
        MemorySource {
            records: std::sync::Arc::new(std::sync::RwLock::new(records)),
        }
    }

    /// Replaces the record set wholesale; the next read sees the new state.
    pub fn replace(&self, records: RecordSet) {
        *self.records.write().expect("record set poisoned") = records;
    }

    fn snapshot(&self) -> RecordSet {
        self.records.read().expect("record set poisoned").clone()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn list_users(&self) -> Result<Vec<UserRecord>, SourceError> {
        Ok(self.snapshot().users)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<SecretRecord, SourceError> {
        self.snapshot()
            .secrets
            .into_iter()
            .find(|s| s.name == name && s.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("secret/{}/{}", namespace, name)))
    }

    async fn get_object_store_backend(&self, name: &str, namespace: &str) -> Result<ObjectStoreBackendRecord, SourceError> {
        self.snapshot()
            .object_store_backends
            .into_iter()
            .find(|b| b.name == name && b.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("objectstorebackend/{}/{}", namespace, name)))
    }

    async fn get_webdav_backend(&self, name: &str, namespace: &str) -> Result<WebDavBackendRecord, SourceError> {
        self.snapshot()
            .webdav_backends
            .into_iter()
            .find(|b| b.name == name && b.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("webdavbackend/{}/{}", namespace, name)))
    }

    async fn get_filesystem_backend(&self, name: &str, namespace: &str) -> Result<FilesystemBackendRecord, SourceError> {
        self.snapshot()
            .filesystem_backends
            .into_iter()
            .find(|b| b.name == name && b.namespace == namespace)
            .ok_or_else(|| SourceError::NotFound(format!("filesystembackend/{}/{}", namespace, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    const RECORDS: &str = r#"{
        "users": [
            {
                "username": "alice",
                "password": "P@ssw0rd!",
                "backendRef": {"kind": "ObjectStore", "name": "minio-main"},
                "homeDirectory": "/alice"
            }
        ],
        "objectStoreBackends": [
            {
                "name": "minio-main",
                "endpoint": "http://127.0.0.1:9000",
                "bucket": "b",
                "pathPrefix": "tenants",
                "credentials": {"accessKeyId": "minio", "secretAccessKey": "minio123"}
            }
        ],
        "secrets": [
            {"name": "creds", "namespace": "ns-a", "data": {"password": "U3Ryb25nUHc5IQ=="}}
        ]
    }"#;

    #[tokio::test]
    async fn file_source_reads_plain_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(RECORDS.as_bytes()).unwrap();
        let source = FileSource::new(f.path()).unwrap();

        let users = source.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");

        let backend = source.get_object_store_backend("minio-main", "default").await.unwrap();
        assert_eq!(backend.bucket, "b");
    }

    #[tokio::test]
    async fn file_source_reads_gzipped_json() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(RECORDS.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&gz).unwrap();
        let source = FileSource::new(f.path()).unwrap();
        assert_eq!(source.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn secrets_resolve_by_name_and_namespace() {
        let source = MemorySource::new(RecordSet::from_json(RECORDS).unwrap());
        assert!(source.get_secret("creds", "ns-a").await.is_ok());
        assert!(matches!(source.get_secret("creds", "ns-b").await, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let source = MemorySource::new(RecordSet::from_json(RECORDS).unwrap());
        assert!(matches!(source.get_user("mallory").await, Err(SourceError::NotFound(_))));
        assert!(source.get_user("alice").await.is_ok());
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(RecordSet::from_json("{\"users\": [{\"username\": 1}]}").is_err());
        assert!(RecordSet::from_json("{\"unknownTopLevel\": []}").is_err());
    }
}
