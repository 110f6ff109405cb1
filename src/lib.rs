//! # AMQP Room Bridge
//!
//! Bridges an AMQP exchange to room-scoped session subscribers.
//!
//! ## Features
//!
//! - **Resilient Broker Connection**: one connection, topology re-declared
//!   on every (re)connect, fixed-delay reconnect that never blocks
//! - **Local Routing**: connection id to room/session registry with
//!   exactly-one-recipient delivery
//! - **Membership Reconciliation**: events for connections held elsewhere
//!   remove the stale record from the shared membership store
//! - **Single-Writer Actor**: all state owned by one tokio task, no locks
//! - **Graceful Shutdown**: consumer stopped, in-flight deliveries drained
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use amqp_room_bridge::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BridgeConfig::from_env()?;
//!     let (bridge, connection) =
//!         Bridge::connect(config, Arc::new(InMemoryMembershipStore::new()))
//!             .await?;
//!
//!     let (session, _outbound) = ChannelSession::new(64);
//!     bridge.add_subscriber("conn-1", "lobby", session.clone()).await?;
//!     println!("{:?}", bridge.stats().await?);
//!
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub use amqp_room_bridge_core::*;

/// Prelude module for convenient imports
///
/// Essential types for wiring a bridge into a session server.
///
/// ```rust
/// use amqp_room_bridge::prelude::*;
/// ```
pub mod prelude {
	pub use amqp_room_bridge_core::{
		Bridge, BridgeConfig, BridgeConnection, BridgeError, BridgeStats,
		ChannelSession, ConnectionState, InMemoryMembershipStore,
		MembershipStore, Result, SessionRef, SessionTransport,
	};
}

/// Advanced types for custom brokers, stores and transports
///
/// ```rust
/// use amqp_room_bridge::advanced::*;
/// ```
pub mod advanced {
	pub use amqp_room_bridge_core::broker::{
		AmqpConnector, BrokerConnector, BrokerLink, ConnectionManager,
		DeliveryStream, LinkEvent,
	};
	pub use amqp_room_bridge_core::dispatcher::{Dispatcher, Route};
	pub use amqp_room_bridge_core::message::{
		InboundEvent, MemberRecord, OutboundEnvelope,
	};
	pub use amqp_room_bridge_core::routing::{
		ListenerSet, SubscriberEntry, SubscriberRegistry,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use amqp_room_bridge::errors::*;
/// ```
pub mod errors {
	pub use amqp_room_bridge_core::{
		BridgeError, BrokerError, DecodeError, DeliveryError, StoreError,
	};
}
