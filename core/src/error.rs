//! Error types used throughout the bridge
//!
//! None of these escape the actor loop as control flow: broker errors
//! lead to a scheduled reconnect, everything else is logged and dropped.

use thiserror::Error;

/// Broker connectivity and topology failures
#[derive(Debug, Error)]
pub enum BrokerError {
	/// Opening the connection failed
	#[error("Connection failed: {0}")]
	Connect(String),
	/// Opening a channel failed
	#[error("Channel open failed: {0}")]
	Channel(String),
	/// `exchange.declare` failed
	#[error("Exchange declare failed for '{exchange}': {reason}")]
	ExchangeDeclare {
		/// Exchange being declared
		exchange: String,
		/// Broker error text
		reason: String,
	},
	/// `queue.declare` failed
	#[error("Queue declare failed for '{queue}': {reason}")]
	QueueDeclare {
		/// Queue being declared
		queue: String,
		/// Broker error text
		reason: String,
	},
	/// `queue.bind` failed
	#[error("Queue bind failed for '{queue}': {reason}")]
	QueueBind {
		/// Queue being bound
		queue: String,
		/// Broker error text
		reason: String,
	},
	/// `basic.consume` failed
	#[error("Consume failed on '{queue}': {reason}")]
	Consume {
		/// Queue the consumer was started on
		queue: String,
		/// Broker error text
		reason: String,
	},
	/// The delivery stream reported an error
	#[error("Delivery stream error: {0}")]
	Stream(String),
	/// The delivery stream ended, meaning the connection is gone
	#[error("Delivery stream ended")]
	StreamEnded,
}

/// Inbound payload could not be decoded
#[derive(Debug, Error)]
#[error("Malformed event payload: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Membership store failures
#[derive(Debug, Error)]
pub enum StoreError {
	/// Backend reported an error
	#[error("Membership store error: {0}")]
	Backend(String),
	/// Redis command failed
	#[cfg(feature = "redis")]
	#[error("Redis error: {0}")]
	Redis(#[from] redis::RedisError),
	/// Store call did not finish in time
	#[error("Membership store call timed out after {timeout_millis}ms")]
	Timeout {
		/// Configured limit in milliseconds
		timeout_millis: u64,
	},
}

/// Transport delivery failures
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// The session is gone
	#[error("Session closed")]
	SessionClosed,
	/// Delivery did not finish in time
	#[error("Delivery timed out after {timeout_millis}ms")]
	Timeout {
		/// Configured limit in milliseconds
		timeout_millis: u64,
	},
}

/// Errors surfaced through the public bridge handle
#[derive(Debug, Error)]
pub enum BridgeError {
	/// Actor command channel closed
	#[error("Bridge command channel closed")]
	ChannelClosed,
	/// Response from the actor was lost
	#[error("Response from bridge actor was lost")]
	ResponseLost,
	/// Invalid configuration value
	#[error("Invalid configuration value: {0}")]
	Configuration(String),
	/// Actor task failed during shutdown
	#[error("Bridge shutdown failed: {0}")]
	ShutdownFailed(#[from] tokio::task::JoinError),
}
