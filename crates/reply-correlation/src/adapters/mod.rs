//! # Adapters Layer
//!
//! Implementations of the outbound ports.
//!
//! - `memory_store.rs` - in-process reply store
//! - `file_store.rs` - reply store shared through a directory
//! - `scoped_store.rs` - per-engine namespace inside a shared store
//! - `bus_adapter.rs` - dispatcher and reply source over the shared event bus
//! - `direct_source.rs` - reply source for callback-style transports

pub mod bus_adapter;
pub mod direct_source;
pub mod file_store;
pub mod memory_store;
pub mod scoped_store;

pub use bus_adapter::{BusDispatcher, BusReplySource};
pub use direct_source::DirectReplySource;
pub use file_store::FileReplyStore;
pub use memory_store::InMemoryReplyStore;
pub use scoped_store::ScopedReplyStore;
