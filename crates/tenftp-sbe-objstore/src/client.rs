//! The minimal S3 REST client the back-end is built on: head, list, get,
//! put, delete and copy against one bucket, path-style, with SigV4 signing.

use crate::list_response::{ListBucketResult, parse_list_response};
use crate::sign::{Signer, uri_encode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, Empty, StreamBody, combinators::BoxBody};
use hyper::body::Frame;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use secrecy::SecretString;
use std::future::Future;
use std::io;
use std::time::Duration;
use tenftp::storage::{Error, ErrorKind};
use tokio_util::io::{ReaderStream, StreamReader};

type Body = BoxBody<Bytes, io::Error>;
type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

// Deadline for metadata-sized calls; transfers stream without one.
const CONTROL_DEADLINE: Duration = Duration::from_secs(30);

async fn with_deadline<T>(fut: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
    match tokio::time::timeout(CONTROL_DEADLINE, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::new(ErrorKind::TransientFileNotAvailable, "object store request timed out")),
    }
}

/// TLS knobs taken from the backend record.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub insecure_skip_verify: bool,
    /// PEM bundle replacing the system trust roots.
    pub ca_cert: Option<String>,
}

/// What HeadObject tells us about one key.
#[derive(Debug, Clone)]
pub(crate) struct HeadResult {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectClient {
    // Scheme of the endpoint, e.g. "http" or "https".
    scheme: String,
    // Host (and port) as it appears on the wire; signed as the host header.
    authority: String,
    bucket: String,
    http: HttpClient,
    signer: Signer,
}

fn empty_body() -> Body {
    Empty::<Bytes>::new().map_err(io::Error::other).boxed()
}

impl ObjectClient {
    /// Builds a client for `endpoint` (e.g. `https://minio.example:9000`)
    /// and `bucket`, signing with the given credential pair.
    pub fn new(
        endpoint: &str,
        bucket: String,
        region: String,
        access_key: String,
        secret_key: SecretString,
        tls: &TlsConfig,
    ) -> Result<Self, Error> {
        let uri: hyper::Uri = endpoint
            .parse()
            .map_err(|e| Error::new(ErrorKind::LocalError, format!("bad endpoint '{}': {}", endpoint, e)))?;
        let scheme = uri.scheme_str().unwrap_or("https").to_string();
        let authority = uri
            .authority()
            .ok_or_else(|| Error::new(ErrorKind::LocalError, format!("endpoint '{}' has no host", endpoint)))?
            .to_string();

        let connector = build_connector(tls)?;
        let http = Client::builder(TokioExecutor::new()).build(connector);

        Ok(ObjectClient {
            scheme,
            authority,
            bucket,
            http,
            signer: Signer::new(access_key, secret_key, region),
        })
    }

    fn uri(&self, path: &str, query: &[(String, String)]) -> Result<hyper::Uri, Error> {
        let mut s = format!("{}://{}{}", self.scheme, self.authority, path);
        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k, false), uri_encode(v, false)))
                .collect::<Vec<_>>()
                .join("&");
            s.push('?');
            s.push_str(&encoded);
        }
        hyper::Uri::try_from(s).map_err(|_| Error::from(ErrorKind::FileNameNotAllowedError))
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", uri_encode(&self.bucket, false), uri_encode(key, true))
    }

    fn bucket_path(&self) -> String {
        format!("/{}", uri_encode(&self.bucket, false))
    }

    async fn request(
        &self,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        extra_headers: Vec<(&'static str, String)>,
        body: Body,
    ) -> Result<Response<hyper::body::Incoming>, Error> {
        let signed = self.signer.sign(method.as_str(), &self.authority, &path, &query, Utc::now());
        let uri = self.uri(&path, &query)?;

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256);
        for (name, value) in extra_headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(body).map_err(|e| Error::new(ErrorKind::LocalError, e))?;

        // Connection-level failures are worth a client retry.
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| Error::new(ErrorKind::TransientFileNotAvailable, e))?;

        if !response.status().is_success() {
            return Err(error_for_status(response.status()));
        }
        Ok(response)
    }

    pub async fn head(&self, key: &str) -> Result<HeadResult, Error> {
        let response = with_deadline(self.request(Method::HEAD, self.object_path(key), vec![], vec![], empty_body())).await?;
        let size = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(HeadResult { size, last_modified })
    }

    /// One page of a delimited listing under `prefix`.
    pub async fn list(&self, prefix: &str, continuation: Option<String>, max_keys: Option<u32>) -> Result<ListBucketResult, Error> {
        let mut query: Vec<(String, String)> = vec![
            ("list-type".to_string(), "2".to_string()),
            ("delimiter".to_string(), "/".to_string()),
        ];
        if !prefix.is_empty() {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = continuation {
            query.push(("continuation-token".to_string(), token));
        }
        if let Some(n) = max_keys {
            query.push(("max-keys".to_string(), n.to_string()));
        }

        let response = with_deadline(self.request(Method::GET, self.bucket_path(), query, vec![], empty_body())).await?;
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::new(ErrorKind::TransientFileNotAvailable, e))?
            .to_bytes();
        let xml = std::str::from_utf8(&body).map_err(|e| Error::new(ErrorKind::LocalError, e))?;
        parse_list_response(xml)
    }

    pub async fn get(&self, key: &str, start_pos: u64) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>, Error> {
        let headers = if start_pos > 0 {
            vec![("range", format!("bytes={}-", start_pos))]
        } else {
            vec![]
        };
        let response = self.request(Method::GET, self.object_path(key), vec![], headers, empty_body()).await?;
        let stream = response.into_body().into_data_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    /// Streams `src` into `key` with an unknown length.
    pub async fn put_streaming<R>(&self, key: &str, src: R) -> Result<(), Error>
    where
        R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static,
    {
        let reader = tokio::io::BufReader::with_capacity(64 * 1024, src);
        let body = StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data)).boxed();
        self.request(Method::PUT, self.object_path(key), vec![], vec![], body).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        with_deadline(self.request(Method::DELETE, self.object_path(key), vec![], vec![], empty_body())).await?;
        Ok(())
    }

    /// Server-side copy; the two steps of a rename are not atomic together.
    pub async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), Error> {
        let source = format!("/{}/{}", uri_encode(&self.bucket, false), uri_encode(src_key, true));
        with_deadline(self.request(
            Method::PUT,
            self.object_path(dst_key),
            vec![],
            vec![("x-amz-copy-source", source)],
            empty_body(),
        ))
        .await?;
        Ok(())
    }
}

fn error_for_status(status: StatusCode) -> Error {
    let kind = match status.as_u16() {
        404 => ErrorKind::PermanentFileNotAvailable,
        401 | 403 => ErrorKind::PermissionDenied,
        429 => ErrorKind::TransientFileNotAvailable,
        s if s >= 500 => ErrorKind::TransientFileNotAvailable,
        _ => ErrorKind::LocalError,
    };
    Error::new(kind, format!("object store replied {}", status))
}

fn build_connector(tls: &TlsConfig) -> Result<HttpsConnector<HttpConnector>, Error> {
    let provider = std::sync::Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = HttpsConnectorBuilder::new();
    let builder = if tls.insecure_skip_verify {
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::new(ErrorKind::LocalError, format!("bad tls config: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(std::sync::Arc::new(danger::NoVerification::new()))
            .with_no_client_auth();
        builder.with_tls_config(config)
    } else if let Some(pem) = &tls.ca_cert {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut pem.as_bytes()) {
            let cert = cert.map_err(|e| Error::new(ErrorKind::LocalError, format!("bad caCert: {}", e)))?;
            roots
                .add(cert)
                .map_err(|e| Error::new(ErrorKind::LocalError, format!("bad caCert: {}", e)))?;
        }
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::new(ErrorKind::LocalError, format!("bad tls config: {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        builder.with_tls_config(config)
    } else {
        builder
            .with_provider_and_native_roots(provider)
            .map_err(|e| Error::new(ErrorKind::LocalError, format!("could not load trust roots: {}", e)))?
    };
    Ok(builder.https_or_http().enable_http1().build())
}

mod danger {
    //! Certificate verification bypass for `insecureSkipVerify` back-ends.
    //! Signatures are still checked, only the chain is not.

    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::CryptoProvider;

    #[derive(Debug)]
    pub(super) struct NoVerification(std::sync::Arc<CryptoProvider>);

    impl NoVerification {
        pub fn new() -> Self {
            NoVerification(rustls::crypto::aws_lc_rs::default_provider().into())
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &rustls::pki_types::CertificateDer<'_>,
            _intermediates: &[rustls::pki_types::CertificateDer<'_>],
            _server_name: &rustls::pki_types::ServerName<'_>,
            _ocsp_response: &[u8],
            _now: rustls::pki_types::UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &rustls::pki_types::CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &rustls::pki_types::CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}
