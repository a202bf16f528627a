//! Server Module
//!
//! Wires the pieces together: one [`StorageEngine`], its [`ExpirySweeper`],
//! the command table, and a task per accepted connection.
//!
//! ```text
//!             TcpTransport::consume()
//!                      │
//!                      ▼
//!   ┌──────────────────────────────────────┐
//!   │ Server                               │
//!   │  - next connection id                │
//!   │  - ConnectionRegistry                │──┐ spawn
//!   │  - CommandHandler (registry)         │  │
//!   │  - StorageEngine + ExpirySweeper     │  ▼
//!   └──────────────────────────────────────┘ ConnectionHandler task
//! ```

pub mod transport;

pub use transport::{Accepted, CloseHandle, TcpTransport};

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{ClientInfo, ConnectionHandler, ConnectionRegistry, ConnectionStats};
use crate::storage::{ExpirySweeper, StorageEngine};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

/// A running cache server.
///
/// Must be created inside a Tokio runtime: construction starts the expiry
/// sweeper.
#[derive(Debug)]
pub struct Server {
    config: Arc<ServerConfig>,
    storage: Arc<StorageEngine>,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    connections: Arc<ConnectionRegistry>,
    next_client_id: AtomicU64,
    sweeper: ExpirySweeper,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let storage = Arc::new(StorageEngine::new());
        let command_handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
        let sweeper = ExpirySweeper::start_in(
            Arc::clone(&storage),
            config.expiry_config(),
            info_span!("expiry_sweeper", chunk_size = config.sweep_chunk_size),
        );

        Self {
            config,
            storage,
            command_handler,
            stats: Arc::new(ConnectionStats::new()),
            connections: Arc::new(ConnectionRegistry::new()),
            next_client_id: AtomicU64::new(1),
            sweeper,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }

    /// Serves connections from `transport` until it is closed.
    ///
    /// Returning does not wait for connections that are still open.
    pub async fn serve(&self, transport: &mut TcpTransport) {
        while let Some((stream, peer)) = transport.consume().await {
            self.spawn_connection(stream, peer);
        }
        info!("No longer accepting connections");
    }

    /// Runs one connection on its own task.
    pub fn spawn_connection<S>(&self, stream: S, peer: SocketAddr) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let guard = self.connections.register(id, peer);

        let handler = ConnectionHandler::new(
            stream,
            peer,
            ClientInfo::new(id),
            self.command_handler.clone(),
            Arc::clone(&self.stats),
        )
        .with_max_buffer_size(self.config.max_buffer_size);

        let span = info_span!("connection", conn_id = id, client = %peer);
        tokio::spawn(
            async move {
                let _guard = guard;
                // The handler logs its own errors
                let _ = handler.run().await;
            }
            .instrument(span),
        )
    }

    /// Stops background work. Open connections keep running.
    pub fn shutdown(&self) {
        self.sweeper.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_message, RespValue};
    use bytes::{Buf, BytesMut};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn request(stream: &mut TcpStream, bytes: &[u8]) -> RespValue {
        stream.write_all(bytes).await.unwrap();
        let mut buffer = BytesMut::new();
        loop {
            if let Some((value, consumed)) = parse_message(&buffer).unwrap() {
                buffer.advance(consumed);
                return value;
            }
            assert!(stream.read_buf(&mut buffer).await.unwrap() > 0);
        }
    }

    async fn client_id(stream: &mut TcpStream) -> i64 {
        request(stream, b"*2\r\n$6\r\nCLIENT\r\n$2\r\nID\r\n")
            .await
            .as_integer()
            .unwrap()
    }

    #[tokio::test]
    async fn test_serve_assigns_distinct_ids() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        let mut transport = TcpTransport::new("127.0.0.1:0");
        let addr = transport.listen_and_accept().await.unwrap();
        let close = transport.close_handle();

        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(&mut transport).await })
        };

        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();
        let a = client_id(&mut first).await;
        let b = client_id(&mut second).await;
        assert_ne!(a, b);
        assert_eq!(server.connections().len(), 2);

        drop(first);
        for _ in 0..50 {
            if server.connections().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.connections().len(), 1);
        assert!(server.connections().contains(b as u64));

        close.close();
        serving.await.unwrap();

        // Already open connections outlive the transport
        assert_eq!(client_id(&mut second).await, b);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_connections_share_storage() {
        let server = Server::new(ServerConfig::default());
        let (mut writer, writer_end) = tokio::io::duplex(4096);
        let (mut reader, reader_end) = tokio::io::duplex(4096);
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        server.spawn_connection(writer_end, peer);
        server.spawn_connection(reader_end, peer);

        writer
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 5];
        writer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"+OK\r\n");

        reader
            .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 7];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"$1\r\nv\r\n");

        assert_eq!(server.storage().len(), 1);
        server.shutdown();
    }
}
