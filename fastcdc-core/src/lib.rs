#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod attrs;
pub mod error;
pub mod session;
pub mod sweep;

pub mod chunking {
    pub mod engine;
}

pub mod proto {
    pub mod pkt;
}

pub mod store {
    pub mod chunks;
    pub mod gateway;
    pub mod git;
}

#[cfg(test)]
pub(crate) mod testutil;

pub use crate::error::Result;

pub use crate::proto::pkt::PacketChannel;

pub use crate::session::{FilterSession, SessionConfig};

pub use crate::store::gateway::ObjectStore;
pub use crate::store::git::GitStore;
