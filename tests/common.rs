//! Harness shared by the end-to-end tests: a small multi-user
//! authenticator, a server bootstrapped on an ephemeral port, and a
//! line-oriented FTP test client.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenftp::ServerBuilder;
use tenftp::auth::{AuthenticationError, Authenticator, Credentials, StoragePermissions, UserDetail};
use tenftp_sbe_fs::Filesystem;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, Clone)]
pub struct TestUser {
    pub username: String,
    pub home: PathBuf,
    pub permissions: StoragePermissions,
}

impl fmt::Display for TestUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

impl UserDetail for TestUser {
    fn home(&self) -> Option<&Path> {
        Some(&self.home)
    }

    fn storage_permissions(&self) -> StoragePermissions {
        self.permissions
    }
}

// Authenticates against a fixed (username -> password, home) table.
#[derive(Debug, Default)]
pub struct TableAuthenticator {
    users: HashMap<String, (String, PathBuf)>,
}

impl TableAuthenticator {
    pub fn with_user(mut self, username: &str, password: &str, home: &str) -> Self {
        self.users.insert(username.to_string(), (password.to_string(), PathBuf::from(home)));
        self
    }
}

#[async_trait]
impl Authenticator<TestUser> for TableAuthenticator {
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<TestUser, AuthenticationError> {
        let (expected, home) = self.users.get(username).ok_or(AuthenticationError::BadUser)?;
        match &creds.password {
            Some(p) if p == expected => Ok(TestUser {
                username: username.to_string(),
                home: home.clone(),
                permissions: StoragePermissions::all(),
            }),
            _ => Err(AuthenticationError::BadPassword),
        }
    }
}

pub struct Harness {
    pub addr: String,
    pub root: tempfile::TempDir,
}

// Starts a server over a filesystem back-end rooted in a fresh temp dir.
// `homes` are created up front so logins land in an existing directory.
pub async fn start_server(auth: TableAuthenticator, homes: &[&str], passive_ports: std::ops::RangeInclusive<u16>) -> Harness {
    let root = tempfile::TempDir::new().unwrap();
    for home in homes {
        std::fs::create_dir_all(root.path().join(home.trim_start_matches('/'))).unwrap();
    }

    // Grab an ephemeral port, then hand it to the server.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);
    let addr = format!("127.0.0.1:{}", port);

    let base = root.path().to_path_buf();
    let server = ServerBuilder::with_authenticator(Box::new(move || Filesystem::new(base.clone())), Arc::new(auth))
        .greeting("tenftp test server")
        .passive_ports(passive_ports)
        .idle_session_timeout(30)
        .build()
        .unwrap();

    let listen_addr = addr.clone();
    tokio::spawn(async move {
        server.listen(listen_addr).await.unwrap();
    });

    // Wait for the listener to come up.
    for _ in 0..50 {
        if TcpStream::connect(&addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    Harness { addr, root }
}

// A blocking-style FTP client for tests: send one command, read one reply
// (following multi-line replies to their closing line).
pub struct TestClient {
    reader: BufReader<TcpStream>,
}

impl TestClient {
    pub async fn connect(addr: &str) -> TestClient {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = TestClient {
            reader: BufReader::new(stream),
        };
        let greeting = client.read_reply().await;
        assert!(greeting.starts_with("220 "), "unexpected greeting: {}", greeting);
        client
    }

    pub async fn cmd(&mut self, line: &str) -> String {
        self.reader
            .get_mut()
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
        self.read_reply().await
    }

    // Reads one full reply; multi-line replies are joined with '\n'.
    pub async fn read_reply(&mut self) -> String {
        let mut first = String::new();
        self.reader.read_line(&mut first).await.unwrap();
        let first = first.trim_end().to_string();

        let bytes = first.as_bytes();
        if bytes.len() >= 4 && bytes[3] == b'-' {
            let code = &first[..3];
            let terminator = format!("{} ", code);
            let mut lines = vec![first.clone()];
            loop {
                let mut line = String::new();
                self.reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end().to_string();
                let done = line.starts_with(&terminator);
                lines.push(line);
                if done {
                    break;
                }
            }
            lines.join("\n")
        } else {
            first
        }
    }

    pub async fn login(&mut self, username: &str, password: &str) {
        let reply = self.cmd(&format!("USER {}", username)).await;
        assert!(reply.starts_with("331 "), "expected 331, got: {}", reply);
        let reply = self.cmd(&format!("PASS {}", password)).await;
        assert!(reply.starts_with("230 "), "expected 230, got: {}", reply);
    }

    // Issues PASV and returns the advertised data address.
    pub async fn pasv(&mut self) -> SocketAddr {
        let reply = self.cmd("PASV").await;
        assert!(reply.starts_with("227 "), "expected 227, got: {}", reply);
        parse_pasv_reply(&reply)
    }

    // Runs one upload over a fresh passive connection.
    pub async fn store(&mut self, path: &str, payload: &[u8]) -> String {
        let data_addr = self.pasv().await;
        let reply = self.cmd(&format!("STOR {}", path)).await;
        assert!(reply.starts_with("150 "), "expected 150, got: {}", reply);
        let mut data = TcpStream::connect(data_addr).await.unwrap();
        data.write_all(payload).await.unwrap();
        data.shutdown().await.unwrap();
        drop(data);
        self.read_reply().await
    }

    // Runs one download over a fresh passive connection, returning the bytes.
    pub async fn retrieve(&mut self, path: &str) -> (String, Vec<u8>) {
        let data_addr = self.pasv().await;
        let reply = self.cmd(&format!("RETR {}", path)).await;
        if !reply.starts_with("150 ") {
            return (reply, Vec::new());
        }
        let mut data = TcpStream::connect(data_addr).await.unwrap();
        let mut payload = Vec::new();
        data.read_to_end(&mut payload).await.unwrap();
        let closing = self.read_reply().await;
        (closing, payload)
    }
}

pub fn parse_pasv_reply(reply: &str) -> SocketAddr {
    let open = reply.find('(').expect("no address in PASV reply");
    let close = reply.find(')').expect("no address in PASV reply");
    let parts: Vec<u16> = reply[open + 1..close].split(',').map(|p| p.trim().parse().unwrap()).collect();
    assert_eq!(parts.len(), 6, "malformed PASV reply: {}", reply);
    let ip = format!("{}.{}.{}.{}", parts[0], parts[1], parts[2], parts[3]);
    let port = parts[4] * 256 + parts[5];
    format!("{}:{}", ip, port).parse().unwrap()
}
