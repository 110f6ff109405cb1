//! # AMQP Room Bridge Core
//!
//! Engine of a long-lived broker bridge: one resilient AMQP connection
//! consumes room events from an exchange and fans each one out to the
//! session that holds the target connection.
//!
//! ## Components
//!
//! - **Subscriber Registry**: connection id to room and session handle
//! - **Listener Set**: liveness listeners, reported as a count
//! - **Connection Manager**: connect, declare topology, consume, and
//!   reconnect after a fixed delay without blocking the actor loop
//! - **Dispatcher**: decodes each delivery and either hands it to the
//!   local session or removes the stale membership record from the
//!   shared membership store
//!
//! All state is owned by a single actor task; [`Bridge`] is its client.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use amqp_room_bridge_core::{
//!     Bridge, BridgeConfig, ChannelSession, InMemoryMembershipStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::from_env()?;
//!     let store = Arc::new(InMemoryMembershipStore::new());
//!     let (bridge, connection) = Bridge::connect(config, store).await?;
//!
//!     // A web-socket session joins room "lobby"; the registry holds it
//!     // weakly, so the caller keeps `session` alive
//!     let (session, mut outbound) = ChannelSession::new(64);
//!     bridge.add_subscriber("conn-1", "lobby", session.clone()).await?;
//!
//!     // Events published as {"uid":"conn-1","room":"lobby","host":..,"data":..}
//!     // arrive here as {"data":..}
//!     if let Some(payload) = outbound.recv().await {
//!         println!("deliver {payload}");
//!     }
//!
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

// Core modules
pub mod bridge;
pub mod broker;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod membership;
pub mod message;
pub mod routing;

#[cfg(test)]
mod dispatcher_tests;

// === Core Public API ===
pub use bridge::{Bridge, BridgeStats};
pub use config::{BridgeConfig, BridgeSettings, BrokerSettings, Topology};
pub use connection::BridgeConnection;
pub use error::{
	BridgeError, BrokerError, DecodeError, DeliveryError, StoreError,
};
// Broker seam
pub use broker::{
	AmqpConnector, BrokerConnector, BrokerLink, ConnectionState,
	DeliveryStream,
};
// Membership store
#[cfg(feature = "redis")]
pub use membership::RedisMembershipStore;
pub use membership::{InMemoryMembershipStore, MembershipStore};
// Session transport seam
pub use routing::{ChannelSession, ListenerId, SessionRef, SessionTransport};

/// Result type alias for bridge client operations
pub type Result<T> = std::result::Result<T, BridgeError>;
