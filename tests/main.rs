//! End-to-end tests: a real server on a loopback socket, driven over the
//! wire protocol.

mod common;

use common::{TableAuthenticator, TestClient, start_server};
use pretty_assertions::assert_eq;

fn alice() -> TableAuthenticator {
    TableAuthenticator::default().with_user("alice", "P@ssw0rd!", "/alice")
}

#[tokio::test(flavor = "multi_thread")]
async fn login_round_trip() {
    let harness = start_server(alice(), &["/alice"], 40000..=40009).await;
    let mut client = TestClient::connect(&harness.addr).await;

    let reply = client.cmd("USER alice").await;
    assert!(reply.starts_with("331 "), "got: {}", reply);
    let reply = client.cmd("PASS wrong-password").await;
    assert!(reply.starts_with("530 "), "got: {}", reply);

    // A failed PASS drops the candidate username; start over.
    client.login("alice", "P@ssw0rd!").await;
    let reply = client.cmd("QUIT").await;
    assert!(reply.starts_with("221 "), "got: {}", reply);
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_require_login() {
    let harness = start_server(alice(), &["/alice"], 40010..=40019).await;
    let mut client = TestClient::connect(&harness.addr).await;

    let reply = client.cmd("PWD").await;
    assert!(reply.starts_with("530 "), "got: {}", reply);
    let reply = client.cmd("SYST").await;
    assert!(reply.starts_with("215 "), "got: {}", reply);
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_then_stat_and_download() {
    let harness = start_server(alice(), &["/alice"], 40020..=40029).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    let closing = client.store("hello.txt", b"hi").await;
    assert!(closing.starts_with("226 "), "got: {}", closing);

    let reply = client.cmd("SIZE hello.txt").await;
    assert_eq!(reply, "213 2");

    let (closing, payload) = client.retrieve("hello.txt").await;
    assert!(closing.starts_with("226 "), "got: {}", closing);
    assert_eq!(payload, b"hi");

    // The bytes landed inside alice's home on the backing store.
    let on_disk = std::fs::read(harness.root.path().join("alice/hello.txt")).unwrap();
    assert_eq!(on_disk, b"hi");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_directory_navigation() {
    let harness = start_server(alice(), &["/alice"], 40030..=40039).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    let reply = client.cmd("MKD docs").await;
    assert!(reply.starts_with("257 "), "got: {}", reply);

    // A directory has no SIZE.
    let reply = client.cmd("SIZE docs").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);

    let reply = client.cmd("CWD docs").await;
    assert!(reply.starts_with("250 "), "got: {}", reply);
    let reply = client.cmd("PWD").await;
    assert_eq!(reply, "257 \"/docs\"");

    let reply = client.cmd("CDUP").await;
    assert!(reply.starts_with("250 "), "got: {}", reply);
    let reply = client.cmd("PWD").await;
    assert_eq!(reply, "257 \"/\"");
}

#[tokio::test(flavor = "multi_thread")]
async fn chroot_escapes_are_denied() {
    let harness = start_server(alice(), &["/alice"], 40040..=40049).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    // "/etc" resolves inside the confinement and does not exist there.
    let reply = client.cmd("CWD /etc").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);

    // Climbing above the virtual root is refused outright, before any
    // data connection is involved.
    let reply = client.cmd("RETR ../../etc/passwd").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);

    let reply = client.cmd("DELE ../../../etc/passwd").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);
}

#[tokio::test(flavor = "multi_thread")]
async fn rest_offset_is_coerced_to_zero_on_stor() {
    let harness = start_server(alice(), &["/alice"], 40050..=40059).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    let reply = client.cmd("REST 5").await;
    assert!(reply.starts_with("350 "), "got: {}", reply);

    let closing = client.store("fresh.bin", b"abc").await;
    assert!(closing.starts_with("226 "), "got: {}", closing);

    // The upload began at position 0 of the target, not at offset 5.
    let reply = client.cmd("SIZE fresh.bin").await;
    assert_eq!(reply, "213 3");
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_moves_files() {
    let harness = start_server(alice(), &["/alice"], 40060..=40069).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    client.store("old.txt", b"payload").await;

    let reply = client.cmd("RNFR missing.txt").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);

    let reply = client.cmd("RNFR old.txt").await;
    assert!(reply.starts_with("350 "), "got: {}", reply);
    let reply = client.cmd("RNTO new.txt").await;
    assert!(reply.starts_with("250 "), "got: {}", reply);

    let reply = client.cmd("SIZE old.txt").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);
    let reply = client.cmd("SIZE new.txt").await;
    assert_eq!(reply, "213 7");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_sessions_keep_their_own_identity() {
    let auth = TableAuthenticator::default()
        .with_user("u1", "pw1", "/home/u1")
        .with_user("u2", "pw2", "/home/u2");
    let harness = start_server(auth, &["/home/u1", "/home/u2"], 40070..=40079).await;

    let mut c1 = TestClient::connect(&harness.addr).await;
    let mut c2 = TestClient::connect(&harness.addr).await;
    c1.login("u1", "pw1").await;
    c2.login("u2", "pw2").await;

    // Each session reports its own binding.
    let status1 = c1.cmd("STAT").await;
    let status2 = c2.cmd("STAT").await;
    assert!(status1.contains("logged in as u1"), "got: {}", status1);
    assert!(status2.contains("logged in as u2"), "got: {}", status2);

    // A file stored by u1 is invisible to u2: the sessions resolve paths
    // against their own homes, never each other's.
    let closing = c1.store("mine.txt", b"u1 data").await;
    assert!(closing.starts_with("226 "), "got: {}", closing);

    let reply = c1.cmd("SIZE mine.txt").await;
    assert_eq!(reply, "213 7");
    let reply = c2.cmd("SIZE mine.txt").await;
    assert!(reply.starts_with("550 "), "got: {}", reply);

    assert!(harness.root.path().join("home/u1/mine.txt").exists());
    assert!(!harness.root.path().join("home/u2/mine.txt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn passive_port_pool_exhaustion_replies_425() {
    // A pool of exactly one port: the second PASV while the first
    // reservation is outstanding must be refused.
    let harness = start_server(alice(), &["/alice"], 40080..=40080).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    let reply = client.cmd("PASV").await;
    assert!(reply.starts_with("227 "), "got: {}", reply);
    let reply = client.cmd("PASV").await;
    assert!(reply.starts_with("425 "), "got: {}", reply);
}

#[tokio::test(flavor = "multi_thread")]
async fn listings_flow_over_the_data_channel() {
    let harness = start_server(alice(), &["/alice"], 40090..=40099).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    client.store("a.txt", b"A").await;
    client.cmd("MKD sub").await;

    let data_addr = client.pasv().await;
    let reply = client.cmd("LIST").await;
    assert!(reply.starts_with("150 "), "got: {}", reply);
    let mut data = tokio::net::TcpStream::connect(data_addr).await.unwrap();
    let mut listing = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut data, &mut listing).await.unwrap();
    let closing = client.read_reply().await;
    assert!(closing.starts_with("226 "), "got: {}", closing);
    assert!(listing.contains("a.txt"), "listing was: {}", listing);
    assert!(listing.contains("sub"), "listing was: {}", listing);

    // Machine-readable variant.
    let data_addr = client.pasv().await;
    let reply = client.cmd("MLSD").await;
    assert!(reply.starts_with("150 "), "got: {}", reply);
    let mut data = tokio::net::TcpStream::connect(data_addr).await.unwrap();
    let mut listing = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut data, &mut listing).await.unwrap();
    let closing = client.read_reply().await;
    assert!(closing.starts_with("226 "), "got: {}", closing);
    assert!(listing.contains("type=file;size=1;"), "listing was: {}", listing);
    assert!(listing.contains("type=dir;"), "listing was: {}", listing);
}

#[tokio::test(flavor = "multi_thread")]
async fn active_mode_and_tls_are_refused() {
    let harness = start_server(alice(), &["/alice"], 40100..=40109).await;
    let mut client = TestClient::connect(&harness.addr).await;
    client.login("alice", "P@ssw0rd!").await;

    let reply = client.cmd("PORT 127,0,0,1,10,10").await;
    assert!(reply.starts_with("502 "), "got: {}", reply);
    let reply = client.cmd("AUTH TLS").await;
    assert!(reply.starts_with("502 "), "got: {}", reply);
}

#[tokio::test(flavor = "multi_thread")]
async fn feat_advertises_extensions() {
    let harness = start_server(alice(), &["/alice"], 40110..=40119).await;
    let mut client = TestClient::connect(&harness.addr).await;

    let reply = client.cmd("FEAT").await;
    assert!(reply.contains("UTF8"), "got: {}", reply);
    assert!(reply.contains("MDTM"), "got: {}", reply);
    assert!(reply.contains("REST STREAM"), "got: {}", reply);
}
