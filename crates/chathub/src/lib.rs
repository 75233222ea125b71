//! Top-level facade crate for chathub.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use chathub_core::*;
}

pub mod gateway {
    pub use chathub_gateway::*;
}
