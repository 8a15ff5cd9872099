//! Accepts inbound connections and spins up a [`ServerSession`] for each
//! (§4.7).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::codec::Dialect;
use crate::dispatcher::{Dispatcher, Executor, TokioExecutor};
use crate::options::SessionOptions;
use crate::session::ServerSession;
use crate::transport::Transport;

/// A source of inbound connections. Implemented for `tokio::net::TcpListener`
/// and (on unix) `tokio::net::UnixListener` below; test code can implement
/// it over anything that hands out `Transport`-bound streams.
#[async_trait]
pub trait Listener: Send + Sync {
    type Io: Transport;

    async fn accept(&self) -> std::io::Result<Self::Io>;
}

#[async_trait]
impl Listener for tokio::net::TcpListener {
    type Io = tokio::net::TcpStream;

    async fn accept(&self) -> std::io::Result<Self::Io> {
        let (stream, _addr) = tokio::net::TcpListener::accept(self).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(unix)]
#[async_trait]
impl Listener for tokio::net::UnixListener {
    type Io = tokio::net::UnixStream;

    async fn accept(&self) -> std::io::Result<Self::Io> {
        let (stream, _addr) = tokio::net::UnixListener::accept(self).await?;
        Ok(stream)
    }
}

/// Binds a dialect and a shared [`Dispatcher`] to a [`Listener`], spawning a
/// fresh [`ServerSession`] for every accepted connection.
pub struct ServerAcceptor<L: Listener> {
    listener: L,
    dialect: Arc<dyn Dialect>,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<dyn Executor>,
    options: SessionOptions,
}

impl<L: Listener> ServerAcceptor<L> {
    pub fn new(listener: L, dialect: Arc<dyn Dialect>, dispatcher: Arc<Dispatcher>, executor: Arc<dyn Executor>) -> Self {
        Self {
            listener,
            dialect,
            dispatcher,
            executor,
            options: SessionOptions::default(),
        }
    }

    /// Same as [`ServerAcceptor::new`], defaulting to a [`TokioExecutor`].
    pub fn with_tokio_executor(listener: L, dialect: Arc<dyn Dialect>, dispatcher: Arc<Dispatcher>) -> Self {
        Self::new(listener, dialect, dispatcher, Arc::new(TokioExecutor))
    }

    /// Overrides the [`SessionOptions`] every spawned session is
    /// constructed with.
    #[must_use]
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Accepts a single connection and spawns its session.
    pub async fn accept_one(&self) -> std::io::Result<ServerSession> {
        let io = self.listener.accept().await?;
        Ok(ServerSession::spawn_with_options(
            io,
            self.dialect.clone(),
            self.dispatcher.clone(),
            self.executor.clone(),
            self.options,
        ))
    }

    /// Accepts connections until the listener itself fails unrecoverably.
    /// A single failed `accept` is logged and treated as transient; each
    /// spawned session runs independently and this loop never waits on one.
    pub async fn serve(&self) -> std::io::Result<()> {
        loop {
            match self.accept_one().await {
                Ok(_session) => {
                    info!("accepted a new connection");
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::msgpack::MsgpackDialect;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OnceListener {
        io: std::sync::Mutex<Option<tokio::io::DuplexStream>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Listener for OnceListener {
        type Io = tokio::io::DuplexStream;

        async fn accept(&self) -> std::io::Result<Self::Io> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.io
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "exhausted"))
        }
    }

    #[tokio::test]
    async fn accept_one_spawns_a_session() {
        let (server_io, _peer) = rpcbus_testkit::duplex_pair();
        let listener = OnceListener {
            io: std::sync::Mutex::new(Some(server_io)),
            calls: AtomicUsize::new(0),
        };
        let acceptor = ServerAcceptor::with_tokio_executor(listener, Arc::new(MsgpackDialect), Arc::new(Dispatcher::new()));
        let session = acceptor.accept_one().await.unwrap();
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn serve_stops_on_listener_error() {
        let listener = OnceListener {
            io: std::sync::Mutex::new(None),
            calls: AtomicUsize::new(0),
        };
        let acceptor = ServerAcceptor::with_tokio_executor(listener, Arc::new(MsgpackDialect), Arc::new(Dispatcher::new()));
        assert!(acceptor.serve().await.is_err());
    }
}
