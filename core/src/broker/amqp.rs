//! AMQP 0-9-1 connector built on lapin

use futures::future::BoxFuture;
use futures::StreamExt;
use lapin::options::{
	BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions,
	QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::debug;

use super::link::{BrokerConnector, BrokerLink, DeliveryStream};
use crate::config::BrokerSettings;
use crate::error::BrokerError;

/// [`BrokerConnector`] talking to a real AMQP broker
#[derive(Debug, Clone)]
pub struct AmqpConnector {
	settings: BrokerSettings,
}

impl AmqpConnector {
	/// Connector for the broker described by `settings`
	pub fn new(settings: BrokerSettings) -> Self {
		Self { settings }
	}

	fn uri(&self) -> AMQPUri {
		let settings = &self.settings;
		AMQPUri {
			authority: AMQPAuthority {
				userinfo: AMQPUserInfo {
					username: settings.user.clone(),
					password: settings.password.clone(),
				},
				host: settings.host.clone(),
				port: settings.port,
			},
			vhost: settings.vhost.clone(),
			..AMQPUri::default()
		}
	}
}

impl BrokerConnector for AmqpConnector {
	fn connect(
		&self,
	) -> BoxFuture<'static, Result<Box<dyn BrokerLink>, BrokerError>> {
		let uri = self.uri();
		Box::pin(async move {
			debug!(
				host = %uri.authority.host,
				port = uri.authority.port,
				vhost = %uri.vhost,
				"Opening AMQP connection"
			);
			let connection =
				Connection::connect_uri(uri, ConnectionProperties::default())
					.await
					.map_err(|e| BrokerError::Connect(e.to_string()))?;
			let link: Box<dyn BrokerLink> = Box::new(AmqpLink {
				connection,
				channel: None,
			});
			Ok(link)
		})
	}
}

struct AmqpLink {
	connection: Connection,
	channel: Option<Channel>,
}

impl AmqpLink {
	fn channel(&self) -> Result<&Channel, BrokerError> {
		self.channel
			.as_ref()
			.ok_or_else(|| BrokerError::Channel("channel not open".to_string()))
	}
}

impl BrokerLink for AmqpLink {
	fn open_channel(&mut self) -> BoxFuture<'_, Result<(), BrokerError>> {
		Box::pin(async move {
			let channel = self
				.connection
				.create_channel()
				.await
				.map_err(|e| BrokerError::Channel(e.to_string()))?;
			self.channel = Some(channel);
			Ok(())
		})
	}

	fn declare_exchange<'a>(
		&'a mut self,
		name: &'a str,
		kind: &'a str,
	) -> BoxFuture<'a, Result<(), BrokerError>> {
		Box::pin(async move {
			self.channel()?
				.exchange_declare(
					name,
					exchange_kind(kind),
					ExchangeDeclareOptions::default(),
					FieldTable::default(),
				)
				.await
				.map_err(|e| BrokerError::ExchangeDeclare {
					exchange: name.to_string(),
					reason: e.to_string(),
				})
		})
	}

	fn declare_queue<'a>(
		&'a mut self,
		name: &'a str,
	) -> BoxFuture<'a, Result<String, BrokerError>> {
		Box::pin(async move {
			let options = QueueDeclareOptions {
				exclusive: false,
				auto_delete: true,
				..QueueDeclareOptions::default()
			};
			let queue = self
				.channel()?
				.queue_declare(name, options, FieldTable::default())
				.await
				.map_err(|e| BrokerError::QueueDeclare {
					queue: name.to_string(),
					reason: e.to_string(),
				})?;
			Ok(queue.name().as_str().to_string())
		})
	}

	fn bind_queue<'a>(
		&'a mut self,
		queue: &'a str,
		exchange: &'a str,
		routing_key: &'a str,
	) -> BoxFuture<'a, Result<(), BrokerError>> {
		Box::pin(async move {
			self.channel()?
				.queue_bind(
					queue,
					exchange,
					routing_key,
					QueueBindOptions::default(),
					FieldTable::default(),
				)
				.await
				.map_err(|e| BrokerError::QueueBind {
					queue: queue.to_string(),
					reason: e.to_string(),
				})
		})
	}

	fn consume<'a>(
		&'a mut self,
		queue: &'a str,
		consumer_tag: &'a str,
	) -> BoxFuture<'a, Result<DeliveryStream, BrokerError>> {
		Box::pin(async move {
			let options = BasicConsumeOptions {
				no_ack: true,
				..BasicConsumeOptions::default()
			};
			let consumer = self
				.channel()?
				.basic_consume(queue, consumer_tag, options, FieldTable::default())
				.await
				.map_err(|e| BrokerError::Consume {
					queue: queue.to_string(),
					reason: e.to_string(),
				})?;
			let deliveries = consumer
				.map(|delivery| {
					delivery
						.map(|delivery| delivery.data)
						.map_err(|e| BrokerError::Stream(e.to_string()))
				})
				.boxed();
			Ok(deliveries)
		})
	}

	fn close(&mut self) -> BoxFuture<'_, Result<(), BrokerError>> {
		Box::pin(async move {
			self.connection
				.close(200, "bridge shutdown")
				.await
				.map_err(|e| BrokerError::Connect(e.to_string()))
		})
	}
}

fn exchange_kind(kind: &str) -> ExchangeKind {
	match kind.to_ascii_lowercase().as_str() {
		| "direct" => ExchangeKind::Direct,
		| "fanout" => ExchangeKind::Fanout,
		| "topic" => ExchangeKind::Topic,
		| "headers" => ExchangeKind::Headers,
		| _ => ExchangeKind::Custom(kind.to_string()),
	}
}
