//! Node surface: wire messages, transport, key-value store, handlers, runtime.
//!
//! Everything here is plumbing around the replicas in [`crate::crdt`]; none of
//! it makes replication decisions.

pub mod handlers;
pub mod kv;
pub mod message;
pub mod runtime;
pub mod transport;

// Re-export main node functionality
pub use handlers::{CounterStore, Handlers};
pub use kv::{read_int_or_zero, KvStore, MemoryKv, ServiceKv};
pub use message::{Body, Message, Payload, RawMessage};
pub use transport::{write_loop, Outbox, PeerTransport};
