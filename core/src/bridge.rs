//! Bridge actor and its public client
//!
//! The actor is the single writer of all routing and connection state.
//! [`Bridge`] is the cloneable front end the transport layer talks to.

mod actor;
pub mod client;

pub use actor::BridgeStats;
pub use client::Bridge;
pub(crate) use actor::BridgeController;
