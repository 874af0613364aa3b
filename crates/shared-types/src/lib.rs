//! # Shared Types Crate
//!
//! The exchange model shared by the requester, the transports and the
//! responders on the far side of the bus.
//!
//! ## Design Principles
//!
//! - **Snapshot friendly**: every type is `Serialize + Deserialize` so a reply
//!   can be written by one process and read back by another.
//! - **Correlation fields only**: the exchange carries what correlation needs
//!   (id, sequence, reply route, session). The payload stays opaque JSON.

pub mod exchange;
pub mod session;

pub use exchange::{Exchange, ExchangeId, ReplyRoute};
pub use session::Session;
