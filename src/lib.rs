//! # emberkv - A Small In-Memory Key-Value Store
//!
//! emberkv keeps byte-string values in memory and serves them over a
//! RESP-style protocol. It understands four commands:
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [XP milliseconds]`
//! - `GET key`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              emberkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │  Request    │    │        StorageEngine         │ │
//! │                     │  Decoder    │    │  64 shards, RwLock each      │ │
//! │                     └─────────────┘    └──────────────────────────────┘ │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberkv::storage::{StorageEngine, start_expiry_sweeper};
//! use emberkv::commands::CommandHandler;
//! use emberkv::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request decoding and reply encoding
//! - [`storage`]: Thread-safe store with deadlines and the expiry sweeper
//! - [`commands`]: Maps requests to store operations and replies
//! - [`connection`]: Per-client read/dispatch/write loop
//!
//! ## Expiry
//!
//! Entries carry an absolute deadline in epoch milliseconds. They expire
//! in two ways:
//! 1. **Lazy**: `GET` never returns an entry past its deadline
//! 2. **Active**: A background task periodically removes expired entries
//!
//! The sweeper only reclaims memory; what clients see never depends on
//! when it last ran.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, DispatchError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{decode_request, DecodeError, Reply, Request, RequestParser};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port emberkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host emberkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
