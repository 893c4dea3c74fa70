pub mod error;
mod listen;
pub mod options;

use super::{SessionBindings, portpool::PassivePorts, shutdown};
use crate::{
    auth::{Authenticator, UserDetail},
    server::ftpserver::{error::ServerError, options::PassiveHost},
    storage::{Metadata, StorageBackend},
};
use options::{DEFAULT_GREETING, DEFAULT_IDLE_SESSION_TIMEOUT_SECS, DEFAULT_PASSIVE_HOST, DEFAULT_PASSIVE_PORTS};
use slog::Drain;
use std::{fmt::Debug, future::Future, net::SocketAddr, ops::RangeInclusive, pin::Pin, sync::Arc, time::Duration};

/// An instance of an FTP server. It aggregates an
/// [`Authenticator`](crate::auth::Authenticator) implementation that is used
/// for authentication and a [`StorageBackend`](crate::storage::StorageBackend)
/// generator that produces one virtual file system per connection.
///
/// The server can be started with the [`listen`](crate::Server::listen) method.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tenftp::{ServerBuilder, auth::AnonymousAuthenticator};
/// # async fn demo<S>(storage_generator: Box<dyn (Fn() -> S) + Send + Sync>)
/// # where S: tenftp::storage::StorageBackend<tenftp::auth::DefaultUser> + 'static {
/// let server = ServerBuilder::with_authenticator(storage_generator, Arc::new(AnonymousAuthenticator))
///     .greeting("Welcome to my FTP server")
///     .passive_ports(10000..=10019)
///     .build()
///     .unwrap();
/// server.listen("127.0.0.1:2121").await.unwrap();
/// # }
/// ```
pub struct Server<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    storage: Arc<dyn (Fn() -> Storage) + Send + Sync>,
    authenticator: Arc<dyn Authenticator<User>>,
    greeting: String,
    passive_ports: RangeInclusive<u16>,
    passive_host: PassiveHost,
    collect_metrics: bool,
    idle_session_timeout: Duration,
    logger: slog::Logger,
    shutdown: Pin<Box<dyn Future<Output = options::Shutdown> + Send>>,
}

/// Used to create [`Server`]s.
pub struct ServerBuilder<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    storage: Arc<dyn (Fn() -> Storage) + Send + Sync>,
    authenticator: Arc<dyn Authenticator<User>>,
    greeting: String,
    passive_ports: RangeInclusive<u16>,
    passive_host: PassiveHost,
    collect_metrics: bool,
    idle_session_timeout: Duration,
    logger: slog::Logger,
    shutdown: Pin<Box<dyn Future<Output = options::Shutdown> + Send>>,
}

impl<Storage, User> ServerBuilder<Storage, User>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
{
    /// Construct a new [`ServerBuilder`] with the given [`StorageBackend`]
    /// generator and [`Authenticator`]. The other parameters are set to
    /// defaults.
    pub fn with_authenticator(sbe_generator: Box<dyn (Fn() -> Storage) + Send + Sync>, authenticator: Arc<dyn Authenticator<User>>) -> Self {
        ServerBuilder {
            storage: Arc::from(sbe_generator),
            authenticator,
            greeting: DEFAULT_GREETING.to_string(),
            passive_ports: DEFAULT_PASSIVE_PORTS,
            passive_host: DEFAULT_PASSIVE_HOST,
            collect_metrics: false,
            idle_session_timeout: Duration::from_secs(DEFAULT_IDLE_SESSION_TIMEOUT_SECS),
            logger: slog::Logger::root(slog_stdlog::StdLog {}.fuse(), slog::o!()),
            shutdown: Box::pin(futures_util::future::pending()),
        }
    }

    /// Set the greeting that will be sent to the client after connecting.
    pub fn greeting<S: Into<String>>(mut self, greeting: S) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Set the idle session timeout in seconds. The default is 600 seconds.
    pub fn idle_session_timeout(mut self, secs: u64) -> Self {
        self.idle_session_timeout = Duration::from_secs(secs);
        self
    }

    /// Sets the structured logger ([slog](https://crates.io/crates/slog)::Logger) to use.
    /// Defaults to a logger that forwards to the `log` crate.
    pub fn logger<L: Into<Option<slog::Logger>>>(mut self, logger: L) -> Self {
        self.logger = logger
            .into()
            .unwrap_or_else(|| slog::Logger::root(slog_stdlog::StdLog {}.fuse(), slog::o!()));
        self
    }

    /// Enables the collection of prometheus metrics.
    pub fn metrics(mut self) -> Self {
        self.collect_metrics = true;
        self
    }

    /// Sets the range of ports reserved for passive data connections. Each
    /// PASV/EPSV takes one port from this range for the duration of the
    /// transfer, so the range bounds the number of concurrent transfers.
    pub fn passive_ports(mut self, range: RangeInclusive<u16>) -> Self {
        self.passive_ports = range;
        self
    }

    /// Specifies how the IP address advertised in response to PASV is
    /// determined, e.g. a fixed public IP for NAT'ed deployments.
    pub fn passive_host<H: Into<PassiveHost>>(mut self, host_option: H) -> Self {
        self.passive_host = host_option.into();
        self
    }

    /// Allows telling the server when and how to shut down gracefully.
    ///
    /// The passed argument is a future that resolves when the server should
    /// shut down; it returns a [`Shutdown`](options::Shutdown) carrying the
    /// drain window for in-flight sessions.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::{sync::Arc, time::Duration};
    /// # use tenftp::{ServerBuilder, auth::AnonymousAuthenticator};
    /// # fn demo<S>(storage_generator: Box<dyn (Fn() -> S) + Send + Sync>)
    /// # where S: tenftp::storage::StorageBackend<tenftp::auth::DefaultUser> + 'static {
    /// let server = ServerBuilder::with_authenticator(storage_generator, Arc::new(AnonymousAuthenticator))
    ///     .shutdown_indicator(async {
    ///         // Shut the server down after 10 seconds.
    ///         tokio::time::sleep(Duration::from_secs(10)).await;
    ///         tenftp::options::Shutdown::new().grace_period(Duration::from_secs(5))
    ///     })
    ///     .build();
    /// # }
    /// ```
    pub fn shutdown_indicator<I>(mut self, indicator: I) -> Self
    where
        I: Future<Output = options::Shutdown> + Send + 'static,
    {
        self.shutdown = Box::pin(indicator);
        self
    }

    /// Finalize the options and build a [`Server`]. Fails when the passive
    /// port range is malformed.
    pub fn build(self) -> std::result::Result<Server<Storage, User>, ServerError> {
        if self.passive_ports.is_empty() {
            return Err(ServerError::InvalidPassivePorts(format!(
                "{}-{} is empty",
                self.passive_ports.start(),
                self.passive_ports.end()
            )));
        }
        if *self.passive_ports.start() == 0 {
            return Err(ServerError::InvalidPassivePorts("port 0 cannot be advertised".to_string()));
        }
        Ok(Server {
            storage: self.storage,
            authenticator: self.authenticator,
            greeting: self.greeting,
            passive_ports: self.passive_ports,
            passive_host: self.passive_host,
            collect_metrics: self.collect_metrics,
            idle_session_timeout: self.idle_session_timeout,
            logger: self.logger,
            shutdown: self.shutdown,
        })
    }
}

impl<Storage, User> Server<Storage, User>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
{
    /// Runs the main FTP process asynchronously. Should be started in a
    /// Tokio runtime context. Resolves with `Ok(())` after a clean shutdown
    /// or with a [`ServerError`] on invalid configuration or bind failure.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn listen<T: Into<String> + Debug>(self, bind_address: T) -> std::result::Result<(), ServerError> {
        let logger = self.logger.clone();
        let bind_address: SocketAddr = bind_address.into().parse()?;
        let shutdown_notifier = Arc::new(shutdown::Notifier::new());

        let listener = listen::Listener {
            bind_address,
            logger: self.logger.clone(),
            storage: self.storage.clone(),
            authenticator: self.authenticator.clone(),
            greeting: self.greeting.clone(),
            passive_ports: PassivePorts::new(self.passive_ports.clone()),
            passive_host: self.passive_host.clone(),
            collect_metrics: self.collect_metrics,
            idle_session_timeout: self.idle_session_timeout,
            bindings: Arc::new(SessionBindings::new()),
            shutdown_topic: shutdown_notifier.clone(),
        };

        tokio::select! {
            result = listener.listen() => result,
            opts = self.shutdown => {
                slog::debug!(logger, "Shutting down within {:?}", opts.grace_period);
                shutdown_notifier.notify().await;
                Self::shutdown_linger(logger, shutdown_notifier, opts.grace_period).await
            }
        }
    }

    // Waits for sessions to shut down gracefully, or errors when the grace
    // period expires first.
    async fn shutdown_linger(
        logger: slog::Logger,
        shutdown_notifier: Arc<shutdown::Notifier>,
        grace_period: Duration,
    ) -> std::result::Result<(), ServerError> {
        let timeout = Box::pin(tokio::time::sleep(grace_period));
        tokio::select! {
            _ = shutdown_notifier.linger() => {
                slog::debug!(logger, "Graceful shutdown complete");
                Ok(())
            },
            _ = timeout => {
                Err(ServerError::Shutdown {
                    msg: "shutdown grace period expired".to_string(),
                })
            }
        }
    }
}

impl<Storage, User> Debug for Server<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("authenticator", &self.authenticator)
            .field("greeting", &self.greeting)
            .field("passive_ports", &self.passive_ports)
            .field("passive_host", &self.passive_host)
            .field("collect_metrics", &self.collect_metrics)
            .field("idle_session_timeout", &self.idle_session_timeout)
            .finish()
    }
}

impl<Storage, User> Debug for ServerBuilder<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("authenticator", &self.authenticator)
            .field("greeting", &self.greeting)
            .field("passive_ports", &self.passive_ports)
            .field("passive_host", &self.passive_host)
            .field("collect_metrics", &self.collect_metrics)
            .field("idle_session_timeout", &self.idle_session_timeout)
            .finish()
    }
}
