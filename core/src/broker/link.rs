use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::BrokerError;

/// Raw delivery bodies from a consumer; ends when the connection drops
pub type DeliveryStream = BoxStream<'static, Result<Vec<u8>, BrokerError>>;

/// Opens connections to the broker
///
/// Called once per connection attempt. Implementations must not retry
/// internally: the connection manager owns the retry schedule.
pub trait BrokerConnector: Send + Sync + 'static {
	/// Open a fresh connection.
	fn connect(
		&self,
	) -> BoxFuture<'static, Result<Box<dyn BrokerLink>, BrokerError>>;
}

/// One open broker connection, driven step by step
///
/// The consumer task calls these in order: channel, exchange, queue,
/// bind, consume. Any error abandons the connection.
pub trait BrokerLink: Send {
	/// Open the channel every later step runs on.
	fn open_channel(&mut self) -> BoxFuture<'_, Result<(), BrokerError>>;

	/// Declare the exchange; re-declaring an identical exchange is a no-op.
	fn declare_exchange<'a>(
		&'a mut self,
		name: &'a str,
		kind: &'a str,
	) -> BoxFuture<'a, Result<(), BrokerError>>;

	/// Declare a non-exclusive, auto-delete queue and return its name.
	fn declare_queue<'a>(
		&'a mut self,
		name: &'a str,
	) -> BoxFuture<'a, Result<String, BrokerError>>;

	/// Bind `queue` to `exchange`.
	fn bind_queue<'a>(
		&'a mut self,
		queue: &'a str,
		exchange: &'a str,
		routing_key: &'a str,
	) -> BoxFuture<'a, Result<(), BrokerError>>;

	/// Start an auto-ack consumer on `queue`.
	fn consume<'a>(
		&'a mut self,
		queue: &'a str,
		consumer_tag: &'a str,
	) -> BoxFuture<'a, Result<DeliveryStream, BrokerError>>;

	/// Close the connection.
	fn close(&mut self) -> BoxFuture<'_, Result<(), BrokerError>>;
}
