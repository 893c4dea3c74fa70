//! tenftpd: the multi-tenant FTP server daemon.
//!
//! Users, credentials and storage placement come from a records file (the
//! same shapes the control plane stores); each session is dispatched to the
//! storage back-end its user record references.

mod dispatch;

use clap::Parser;
use dispatch::DispatchingStorage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tenftp::ServerBuilder;
use tenftp::options;
use tenftp_registry::{FileSource, RecordCache, RegistryAuthenticator};

#[derive(Parser, Debug)]
#[command(name = "tenftpd", version, about = "Multi-tenant FTP server driven by declarative records")]
struct Args {
    /// Address to bind the control channel listener to.
    #[arg(long, env = "TENFTPD_BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: String,

    /// Control channel port.
    #[arg(long, env = "TENFTPD_PORT", default_value_t = 21)]
    port: u16,

    /// Passive data port range, inclusive, as low-high.
    #[arg(long, env = "TENFTPD_PASSIVE_PORTS", default_value = "10000-10019")]
    passive_ports: String,

    /// Public IPv4 address to advertise in PASV replies (NAT/load balancer).
    #[arg(long, env = "TENFTPD_PUBLIC_IP")]
    public_ip: Option<std::net::Ipv4Addr>,

    /// Welcome banner sent on connect.
    #[arg(long, env = "TENFTPD_GREETING", default_value = "Welcome to the tenftp FTP server")]
    greeting: String,

    /// Path to the records file (plain, gzipped or gzipped+base64 JSON).
    #[arg(long, env = "TENFTPD_RECORDS_FILE")]
    records_file: PathBuf,

    /// Seconds between full refreshes of the user record cache.
    #[arg(long, env = "TENFTPD_REFRESH_INTERVAL_SECS", default_value_t = 60)]
    refresh_interval_secs: u64,

    /// Seconds a control connection may sit idle before it is closed.
    #[arg(long, env = "TENFTPD_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    idle_timeout_secs: u64,

    /// Seconds in-flight sessions get to finish on shutdown.
    #[arg(long, env = "TENFTPD_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    shutdown_grace_secs: u64,

    /// Let anonymous users keep the write permissions their records grant.
    #[arg(long, env = "TENFTPD_ALLOW_ANONYMOUS_WRITE", default_value_t = false)]
    allow_anonymous_write: bool,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    if let Err(err) = run(Args::parse()).await {
        eprintln!("tenftpd: {}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if args.bind_address.trim().is_empty() {
        return Err("bind address must not be empty".into());
    }
    if args.port == 0 {
        return Err("control port must be nonzero".into());
    }
    let passive_ports = options::parse_passive_ports(&args.passive_ports)?;

    let source = FileSource::new(&args.records_file)?;
    let registry = RecordCache::new(Arc::new(source)).await?;
    let _refresh_task = registry.spawn_refresh_task(Duration::from_secs(args.refresh_interval_secs));

    let authenticator = Arc::new(RegistryAuthenticator::new(registry.clone()).allow_anonymous_write(args.allow_anonymous_write));

    let grace = Duration::from_secs(args.shutdown_grace_secs);
    let storage_registry = registry.clone();
    let mut builder = ServerBuilder::with_authenticator(
        Box::new(move || DispatchingStorage::new(storage_registry.clone())),
        authenticator,
    )
    .greeting(args.greeting.clone())
    .passive_ports(passive_ports)
    .idle_session_timeout(args.idle_timeout_secs)
    .metrics()
    .shutdown_indicator(async move {
        // First SIGINT starts the drain; the process exits 0 when all
        // sessions finished or the grace period ran out.
        let _ = tokio::signal::ctrl_c().await;
        options::Shutdown::new().grace_period(grace)
    });
    if let Some(ip) = args.public_ip {
        builder = builder.passive_host(ip);
    }
    let server = builder.build()?;

    let bind = format!("{}:{}", args.bind_address, args.port);
    log::info!("starting tenftpd on {} (passive ports {})", bind, args.passive_ports);
    server.listen(bind).await?;
    log::info!("tenftpd shut down cleanly");
    Ok(())
}
