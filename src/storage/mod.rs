//! Storage Engine Module
//!
//! The in-memory store and the background task that reclaims expired
//! entries. Nothing in here knows about the wire protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{clock, StorageEngine};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("Alba"), clock::NO_EXPIRY);
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Alba")));
//!
//! // Expires one hour from now
//! engine.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     clock::deadline_after(3_600_000),
//! );
//! ```

pub mod clock;
pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use clock::{EpochMillis, NO_EXPIRY};
pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
