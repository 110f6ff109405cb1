//! Broker connection management module
//!
//! The bridge actor owns a [`ConnectionManager`] that tracks the
//! connection state machine. Broker I/O for each connection attempt runs
//! in a separate consumer task which reports [`LinkEvent`]s back to the
//! actor, so the actor loop never waits on the network.

pub mod amqp;
pub mod consumer;
/// Connector and link seam over the broker client
pub mod link;
pub mod state;

pub use amqp::AmqpConnector;
pub use consumer::LinkEvent;
pub use link::{BrokerConnector, BrokerLink, DeliveryStream};
pub use state::{ConnectionManager, ConnectionState};
