//! Connection Handler Module
//!
//! This module manages individual client connections. Each client
//! connection is handled by its own async task, so a slow or misbehaving
//! client never stalls the others.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TcpTransport                            │
//! │                   (server module)                           │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ consume()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │  id + ConnectionRegistry entry
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: any `AsyncRead + AsyncWrite` stream, normally a `TcpStream`
//! - **Buffer Management**: bounded BytesMut buffer for incoming data
//! - **Pipelining**: multiple commands in a single read, answered in order
//! - **Client metadata**: per-connection [`ClientInfo`] owned by the task
//! - **Statistics**: connection and command counters

pub mod client;
pub mod handler;
pub mod registry;

// Re-export commonly used types
pub use client::ClientInfo;
pub use handler::{ConnectionError, ConnectionHandler, ConnectionState, ConnectionStats};
pub use registry::{ConnectionGuard, ConnectionInfo, ConnectionRegistry};
