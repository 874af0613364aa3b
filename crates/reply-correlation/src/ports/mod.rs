//! # Ports Layer
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving ports (API exposed to callers)
//! - `outbound.rs` - Driven ports (collaborators the engine is wired to)

pub mod inbound;
pub mod outbound;

pub use inbound::RequestReplyApi;
pub use outbound::{
    accept_all, CorrelatePredicate, DispatchError, Dispatcher, ReplySource, ReplyStore,
    StoredReply,
};
