//! TCP Transport
//!
//! Owns the listening socket. Accepted connections are handed over through
//! a channel, so the server pulls them with [`TcpTransport::consume`] at its
//! own pace while the accept loop runs in the background.
//!
//! ```text
//!  listen_and_accept()          consume()
//!         │                         ▲
//!         ▼                         │
//!  ┌──────────────┐   mpsc   ┌──────┴──────┐
//!  │ accept loop  │ ───────> │  receiver   │
//!  │ (tokio task) │          └─────────────┘
//!  └──────▲───────┘
//!         │ watch: closed
//!    CloseHandle::close()
//! ```
//!
//! Transient accept failures (aborted handshakes, descriptor exhaustion)
//! are retried after a backoff that starts at 5ms and doubles up to 1s.
//! Any other accept failure stops the loop, which ends `consume`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, info_span, warn, Instrument};

const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Accepted connections waiting to be consumed.
const ACCEPT_QUEUE: usize = 128;

/// An accepted connection and its peer address.
pub type Accepted = (TcpStream, SocketAddr);

/// Listens for TCP connections and hands them out one by one.
#[derive(Debug)]
pub struct TcpTransport {
    listen_address: String,
    local_addr: Option<SocketAddr>,
    conn_tx: Option<mpsc::Sender<Accepted>>,
    conn_rx: mpsc::Receiver<Accepted>,
    closed_tx: Arc<watch::Sender<bool>>,
}

/// Closes a [`TcpTransport`] from anywhere, e.g. a signal handler.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    closed_tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn close(&self) {
        close(&self.closed_tx);
    }
}

impl TcpTransport {
    /// Creates a transport for `listen_address` (`host:port`). Nothing is
    /// bound until [`listen_and_accept`](Self::listen_and_accept).
    pub fn new(listen_address: impl Into<String>) -> Self {
        let (conn_tx, conn_rx) = mpsc::channel(ACCEPT_QUEUE);
        let (closed_tx, _) = watch::channel(false);

        Self {
            listen_address: listen_address.into(),
            local_addr: None,
            conn_tx: Some(conn_tx),
            conn_rx,
            closed_tx: Arc::new(closed_tx),
        }
    }

    /// Binds the listener and starts accepting in the background.
    ///
    /// Calling this again after a successful bind does nothing and returns
    /// the same address.
    pub async fn listen_and_accept(&mut self) -> io::Result<SocketAddr> {
        if let Some(addr) = self.local_addr {
            return Ok(addr);
        }

        let listener = TcpListener::bind(&self.listen_address).await?;
        let local_addr = listener.local_addr()?;

        let Some(conn_tx) = self.conn_tx.take() else {
            return Err(io::Error::other("transport accept loop already started"));
        };
        let closed_rx = self.closed_tx.subscribe();

        let span = info_span!("transport", addr = %local_addr);
        tokio::spawn(accept_loop(listener, conn_tx, closed_rx).instrument(span));

        info!(addr = %local_addr, "Listening for connections");
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Waits for the next accepted connection.
    ///
    /// Returns `None` once the transport is closed, when the accept loop
    /// has stopped after a fatal error, or if the transport never started
    /// listening.
    pub async fn consume(&mut self) -> Option<Accepted> {
        if self.local_addr.is_none() || self.is_closed() {
            return None;
        }

        let mut closed_rx = self.closed_tx.subscribe();
        tokio::select! {
            accepted = self.conn_rx.recv() => accepted,
            _ = wait_closed(&mut closed_rx) => None,
        }
    }

    /// Stops accepting new connections. Already accepted connections are
    /// not affected.
    pub fn close(&self) {
        close(&self.closed_tx);
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            closed_tx: Arc::clone(&self.closed_tx),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn close(closed_tx: &watch::Sender<bool>) {
    if !closed_tx.send_replace(true) {
        info!("Transport closed");
    }
}

async fn accept_loop(
    listener: TcpListener,
    conn_tx: mpsc::Sender<Accepted>,
    mut closed_rx: watch::Receiver<bool>,
) {
    let mut backoff: Option<Duration> = None;

    loop {
        tokio::select! {
            _ = wait_closed(&mut closed_rx) => {
                info!("Accept loop stopped");
                return;
            }
            result = listener.accept() => match result {
                Ok(accepted) => {
                    backoff = None;
                    if conn_tx.send(accepted).await.is_err() {
                        // Transport dropped
                        return;
                    }
                }
                Err(e) if is_transient(&e) => {
                    let delay = next_backoff(backoff);
                    backoff = Some(delay);
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Accept failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, "Accept failed, no longer accepting connections");
                    return;
                }
            }
        }
    }
}

/// Resolves once the closed flag is set (or its sender is gone).
async fn wait_closed(closed_rx: &mut watch::Receiver<bool>) {
    let _ = closed_rx.wait_for(|closed| *closed).await;
}

fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => INITIAL_ACCEPT_BACKOFF,
        Some(delay) => (delay * 2).min(MAX_ACCEPT_BACKOFF),
    }
}

fn is_transient(e: &io::Error) -> bool {
    // EMFILE / ENFILE: out of descriptors until some connection closes
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(e.raw_os_error(), Some(ENFILE | EMFILE))
}
