#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! A [tenftp](https://crates.io/crates/tenftp) storage back-end over a
//! remote WebDAV share.
//!
//! The operation mapping is the classic one: stat is PROPFIND depth 0,
//! listings are PROPFIND depth 1, downloads are GET (with a `Range` header
//! for restarts), uploads are a streamed PUT re-stat'ed for size
//! verification, deletes are DELETE, directories come from MKCOL and
//! renames from MOVE with a `Destination` header.

mod propfind;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use propfind::DavEntry;
use reqwest::{Method, StatusCode, header::HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use std::{
    fmt::Debug,
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tenftp::auth::UserDetail;
use tenftp::storage::{Error, ErrorKind, Fileinfo, Metadata, Result, StorageBackend};
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

/// TLS knobs taken from the backend record.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub insecure_skip_verify: bool,
    /// PEM bundle to trust in addition to the system roots.
    pub ca_cert: Option<String>,
}

/// The WebDAV back-end. Paths are laid out as
/// `endpoint / basePath / resolved-client-path`.
pub struct WebdavStorage {
    client: reqwest::Client,
    endpoint: Url,
    base_path: String,
    username: String,
    password: SecretString,
}

impl Debug for WebdavStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebdavStorage")
            .field("endpoint", &self.endpoint.as_str())
            .field("base_path", &self.base_path)
            .field("username", &self.username)
            .finish()
    }
}

/// Metadata distilled from PROPFIND responses.
#[derive(Debug, Clone)]
pub struct DavMetadata {
    size: u64,
    is_dir: bool,
    modified: Option<SystemTime>,
}

const CONTROL_DEADLINE: Duration = Duration::from_secs(30);

impl WebdavStorage {
    /// Connects to the share at `endpoint` with HTTP basic authentication.
    pub fn new(
        endpoint: &str,
        base_path: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
        tls: &TlsConfig,
    ) -> std::result::Result<Self, Error> {
        let endpoint = Url::parse(endpoint).map_err(|e| Error::new(ErrorKind::LocalError, format!("bad endpoint: {}", e)))?;

        let mut builder = reqwest::Client::builder().connect_timeout(CONTROL_DEADLINE);
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(pem) = &tls.ca_cert {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|e| Error::new(ErrorKind::LocalError, format!("bad caCert: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder.build().map_err(|e| Error::new(ErrorKind::LocalError, e))?;

        Ok(WebdavStorage {
            client,
            endpoint,
            base_path: base_path.into().trim_matches('/').to_string(),
            username: username.into(),
            password,
        })
    }

    // Builds the URL for a resolved client path. Segments go through the
    // Url path-segment API so reserved characters end up encoded.
    fn url_for<P: AsRef<Path>>(&self, path: P, trailing_slash: bool) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| Error::from(ErrorKind::FileNameNotAllowedError))?;
            segments.pop_if_empty();
            for segment in self.base_path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
            for component in path.as_ref().components() {
                if let std::path::Component::Normal(part) = component {
                    segments.push(&part.to_string_lossy());
                }
            }
            if trailing_slash {
                segments.push("");
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    async fn propfind(&self, url: Url, depth: &str) -> Result<Vec<DavEntry>> {
        let response = self
            .request(Method::from_bytes(b"PROPFIND").expect("static method name"), url)
            .header("Depth", depth)
            .timeout(CONTROL_DEADLINE)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response)?;
        let xml = response.text().await.map_err(transport_error)?;
        propfind::parse_multistatus(&xml)
    }

    // The server echoes the requested collection as its own first response
    // row; a listing must not contain the directory being listed.
    fn is_self_row(entry: &DavEntry, requested: &Url) -> bool {
        let entry_path = entry.href_path.trim_end_matches('/');
        let requested_path = requested.path().trim_end_matches('/');
        let decoded = percent_encoding::percent_decode_str(requested_path).decode_utf8_lossy();
        entry_path == decoded || entry_path == requested_path
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::new(ErrorKind::TransientFileNotAvailable, err)
    } else {
        Error::new(ErrorKind::LocalError, err)
    }
}

// HTTP status classes map onto the reply taxonomy: auth failures are
// permission problems, 404 is the permanent not-found, conflicts mean the
// directory structure refused the operation, upstream 5xx is worth a
// retry.
fn status_error(status: StatusCode) -> Error {
    let kind = match status.as_u16() {
        401 | 403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::PermanentFileNotAvailable,
        405 | 409 => ErrorKind::PermanentDirectoryNotAvailable,
        429 => ErrorKind::TransientFileNotAvailable,
        s if s >= 500 => ErrorKind::TransientFileNotAvailable,
        _ => ErrorKind::LocalError,
    };
    Error::new(kind, format!("webdav server replied {}", status))
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() || status == StatusCode::MULTI_STATUS {
        Ok(response)
    } else {
        Err(status_error(status))
    }
}

#[async_trait]
impl<User: UserDetail> StorageBackend<User> for WebdavStorage {
    type Metadata = DavMetadata;

    #[tracing_attributes::instrument]
    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<Self::Metadata> {
        let url = self.url_for(&path, false)?;
        let entries = self.propfind(url, "0").await?;
        let entry = entries.first().ok_or_else(|| Error::from(ErrorKind::PermanentFileNotAvailable))?;
        Ok(DavMetadata {
            size: entry.size,
            is_dir: entry.is_dir,
            modified: entry.modified,
        })
    }

    #[allow(clippy::type_complexity)]
    #[tracing_attributes::instrument]
    async fn list<P>(&self, _user: &User, path: P) -> Result<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        P: AsRef<Path> + Send + Debug,
        <Self as StorageBackend<User>>::Metadata: Metadata,
    {
        let url = self.url_for(&path, true)?;
        let entries = self.propfind(url.clone(), "1").await?;
        Ok(entries
            .iter()
            .filter(|entry| !Self::is_self_row(entry, &url))
            .map(|entry| Fileinfo {
                path: PathBuf::from(entry.name()),
                metadata: DavMetadata {
                    size: entry.size,
                    is_dir: entry.is_dir,
                    modified: entry.modified,
                },
            })
            .collect())
    }

    async fn get<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P, start_pos: u64) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let url = self.url_for(&path, false)?;
        let mut request = self.request(Method::GET, url);
        if start_pos > 0 {
            request = request.header(reqwest::header::RANGE, HeaderValue::from_str(&format!("bytes={}-", start_pos)).expect("ascii header"));
        }
        let response = check_status(request.send().await.map_err(transport_error)?)?;
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        user: &User,
        input: R,
        path: P,
        _start_pos: u64,
    ) -> Result<u64> {
        let path = path.as_ref().to_path_buf();
        let url = self.url_for(&path, false)?;

        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counting = CountingReader {
            inner: input,
            count: counter.clone(),
        };
        let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(counting, 64 * 1024));

        let response = self.request(Method::PUT, url).body(body).send().await.map_err(transport_error)?;
        check_status(response)?;
        let streamed = counter.load(std::sync::atomic::Ordering::SeqCst);

        // Re-stat and verify: the share must report exactly the streamed
        // byte count, else the incomplete file is removed and the transfer
        // fails.
        let stat = self.metadata(user, path.clone()).await?;
        if stat.size != streamed {
            let _ = self.del(user, path).await;
            return Err(Error::from(ErrorKind::SizeMismatch));
        }
        Ok(streamed)
    }

    #[tracing_attributes::instrument]
    async fn del<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        let url = self.url_for(&path, false)?;
        let response = self
            .request(Method::DELETE, url)
            .timeout(CONTROL_DEADLINE)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
    }

    #[tracing_attributes::instrument]
    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        let url = self.url_for(&path, true)?;
        let response = self
            .request(Method::from_bytes(b"MKCOL").expect("static method name"), url)
            .timeout(CONTROL_DEADLINE)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
    }

    #[tracing_attributes::instrument]
    async fn rename<P: AsRef<Path> + Send + Debug>(&self, _user: &User, from: P, to: P) -> Result<()> {
        let from_url = self.url_for(&from, false)?;
        let to_url = self.url_for(&to, false)?;
        let response = self
            .request(Method::from_bytes(b"MOVE").expect("static method name"), from_url)
            .header("Destination", to_url.as_str())
            .timeout(CONTROL_DEADLINE)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
    }

    #[tracing_attributes::instrument]
    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        // DAV DELETE on a collection is recursive by definition; keep the
        // uniform non-recursive contract by refusing occupied directories.
        if !self.list(user, path.clone()).await?.is_empty() {
            return Err(Error::from(ErrorKind::PermanentDirectoryNotEmpty));
        }
        let url = self.url_for(&path, true)?;
        let response = self
            .request(Method::DELETE, url)
            .header("Depth", "infinity")
            .timeout(CONTROL_DEADLINE)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
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

// Counts upload bytes for the post-write verification.
struct CountingReader<R> {
    inner: R,
    count: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl<R: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
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

impl Metadata for DavMetadata {
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

    fn storage() -> WebdavStorage {
        WebdavStorage::new(
            "https://dav.example.net/remote.php",
            "dav",
            "bob",
            SecretString::from("hunter2".to_string()),
            &TlsConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn urls_nest_endpoint_base_and_path() {
        let s = storage();
        let url = s.url_for("/bob/notes v2.txt", false).unwrap();
        assert_eq!(url.as_str(), "https://dav.example.net/remote.php/dav/bob/notes%20v2.txt");

        let dir = s.url_for("/bob", true).unwrap();
        assert_eq!(dir.as_str(), "https://dav.example.net/remote.php/dav/bob/");
    }

    #[test]
    fn root_url_is_the_base_collection() {
        let s = storage();
        let url = s.url_for("/", true).unwrap();
        assert_eq!(url.as_str(), "https://dav.example.net/remote.php/dav/");
    }

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED).kind(), ErrorKind::PermissionDenied);
        assert_eq!(status_error(StatusCode::FORBIDDEN).kind(), ErrorKind::PermissionDenied);
        assert_eq!(status_error(StatusCode::NOT_FOUND).kind(), ErrorKind::PermanentFileNotAvailable);
        assert_eq!(status_error(StatusCode::METHOD_NOT_ALLOWED).kind(), ErrorKind::PermanentDirectoryNotAvailable);
        assert_eq!(status_error(StatusCode::CONFLICT).kind(), ErrorKind::PermanentDirectoryNotAvailable);
        assert_eq!(status_error(StatusCode::INTERNAL_SERVER_ERROR).kind(), ErrorKind::TransientFileNotAvailable);
        assert_eq!(status_error(StatusCode::BAD_GATEWAY).kind(), ErrorKind::TransientFileNotAvailable);
        assert_eq!(status_error(StatusCode::TOO_MANY_REQUESTS).kind(), ErrorKind::TransientFileNotAvailable);
    }

    #[test]
    fn self_row_detection_handles_encoding_and_slashes() {
        let url = Url::parse("https://dav.example.net/dav/bob%20x/").unwrap();
        let own = DavEntry {
            href_path: "/dav/bob x/".to_string(),
            is_dir: true,
            size: 0,
            modified: None,
        };
        let child = DavEntry {
            href_path: "/dav/bob x/file.txt".to_string(),
            is_dir: false,
            size: 1,
            modified: None,
        };
        assert!(WebdavStorage::is_self_row(&own, &url));
        assert!(!WebdavStorage::is_self_row(&child, &url));
    }
}
