//! Configuration for bridge initialization

use std::time::Duration;

use crate::error::BridgeError;

/// Broker endpoint and credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
	/// Broker host name
	pub host: String,
	/// Broker port
	pub port: u16,
	/// AMQP virtual host
	pub vhost: String,
	/// Login user
	pub user: String,
	/// Login password
	pub password: String,
}

impl Default for BrokerSettings {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: 5672,
			vhost: "/".to_string(),
			user: "guest".to_string(),
			password: "guest".to_string(),
		}
	}
}

/// Exchange and queue declared on every successful connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
	/// Exchange to bind the queue to
	pub exchange_name: String,
	/// Exchange kind: `direct`, `fanout`, `topic`, `headers` or a custom kind
	pub exchange_type: String,
	/// Queue consumed by the bridge
	pub queue_name: String,
	/// Binding key; the queue name is used when unset
	pub routing_key: Option<String>,
}

impl Topology {
	/// Create topology with the queue name doubling as routing key
	pub fn new(
		exchange_name: impl Into<String>,
		exchange_type: impl Into<String>,
		queue_name: impl Into<String>,
	) -> Self {
		Self {
			exchange_name: exchange_name.into(),
			exchange_type: exchange_type.into(),
			queue_name: queue_name.into(),
			routing_key: None,
		}
	}

	/// Binding key used for `queue.bind`
	pub fn binding_key<'a>(&'a self, declared_queue: &'a str) -> &'a str {
		self.routing_key.as_deref().unwrap_or(declared_queue)
	}
}

impl Default for Topology {
	fn default() -> Self {
		Self::new("sockjs", "fanout", "sockjs")
	}
}

/// Bridge-level behavior settings
#[derive(Debug, Clone)]
pub struct BridgeSettings {
	/// Fixed delay before a reconnect attempt
	pub reconnect_delay: Duration,
	/// Capacity of the actor command channel
	pub command_channel_capacity: usize,
	/// Upper bound on a single transport delivery
	pub delivery_timeout: Duration,
	/// Upper bound on a single membership store call
	pub store_timeout: Duration,
	/// Deliveries and store calls allowed in flight at once
	pub max_pending_tasks: usize,
	/// Consumer tag announced to the broker
	pub consumer_tag: String,
}

impl Default for BridgeSettings {
	fn default() -> Self {
		Self {
			reconnect_delay: Duration::from_secs(5),
			command_channel_capacity: 256,
			delivery_timeout: Duration::from_secs(2),
			store_timeout: Duration::from_secs(2),
			max_pending_tasks: 100,
			consumer_tag: "amqp-room-bridge".to_string(),
		}
	}
}

/// Configuration for bridge creation
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
	/// Broker endpoint and credentials
	pub broker: BrokerSettings,
	/// Exchange/queue topology
	pub topology: Topology,
	/// Bridge-level behavior settings
	pub settings: BridgeSettings,
}

impl BridgeConfig {
	/// Create config with default topology and settings
	pub fn new(host: &str, port: u16) -> Self {
		Self {
			broker: BrokerSettings {
				host: host.to_string(),
				port,
				..BrokerSettings::default()
			},
			..Self::default()
		}
	}

	/// Create config for localhost:5672
	pub fn localhost() -> Self {
		Self::new("localhost", 5672)
	}

	/// Read configuration from `BRIDGE_*` environment variables
	///
	/// `.env` in the working directory is loaded first when present.
	/// Unset variables fall back to defaults.
	///
	/// # Errors
	/// Returns `BridgeError::Configuration` when a numeric variable
	/// does not parse.
	pub fn from_env() -> Result<Self, BridgeError> {
		dotenv::dotenv().ok();
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Build configuration from an arbitrary key lookup
	pub fn from_lookup(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, BridgeError> {
		let mut config = Self::default();
		let broker = &mut config.broker;
		if let Some(host) = lookup("BRIDGE_AMQP_HOST") {
			broker.host = host;
		}
		if let Some(port) = lookup("BRIDGE_AMQP_PORT") {
			broker.port = parse_value("BRIDGE_AMQP_PORT", &port)?;
		}
		if let Some(vhost) = lookup("BRIDGE_AMQP_VHOST") {
			broker.vhost = vhost;
		}
		if let Some(user) = lookup("BRIDGE_AMQP_USER") {
			broker.user = user;
		}
		if let Some(password) = lookup("BRIDGE_AMQP_PASSWORD") {
			broker.password = password;
		}

		let topology = &mut config.topology;
		if let Some(name) = lookup("BRIDGE_EXCHANGE_NAME") {
			topology.exchange_name = name;
		}
		if let Some(kind) = lookup("BRIDGE_EXCHANGE_TYPE") {
			topology.exchange_type = kind;
		}
		if let Some(queue) = lookup("BRIDGE_QUEUE_NAME") {
			topology.queue_name = queue;
		}
		topology.routing_key = lookup("BRIDGE_ROUTING_KEY");

		if let Some(secs) = lookup("BRIDGE_RECONNECT_DELAY_SECS") {
			let secs = parse_value("BRIDGE_RECONNECT_DELAY_SECS", &secs)?;
			config.settings.reconnect_delay = Duration::from_secs(secs);
		}
		Ok(config)
	}

	/// Check values the actor relies on
	pub fn validate(&self) -> Result<(), BridgeError> {
		if self.settings.command_channel_capacity == 0 {
			return Err(BridgeError::Configuration(
				"command_channel_capacity must be greater than 0".to_string(),
			));
		}
		if self.topology.exchange_name.is_empty() {
			return Err(BridgeError::Configuration(
				"exchange_name must not be empty".to_string(),
			));
		}
		Ok(())
	}
}

fn parse_value<T: std::str::FromStr>(
	key: &str,
	raw: &str,
) -> Result<T, BridgeError> {
	raw.trim().parse().map_err(|_| {
		BridgeError::Configuration(format!("{key}: invalid value '{raw}'"))
	})
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn lookup_from(
		pairs: &[(&str, &str)],
	) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn test_defaults_when_nothing_set() {
		let config = BridgeConfig::from_lookup(|_| None).unwrap();
		assert_eq!(config.broker, BrokerSettings::default());
		assert_eq!(config.topology, Topology::default());
		assert_eq!(config.settings.reconnect_delay, Duration::from_secs(5));
	}

	#[test]
	fn test_overrides_from_lookup() {
		let config = BridgeConfig::from_lookup(lookup_from(&[
			("BRIDGE_AMQP_HOST", "rabbit.internal"),
			("BRIDGE_AMQP_PORT", "5673"),
			("BRIDGE_AMQP_VHOST", "rooms"),
			("BRIDGE_EXCHANGE_TYPE", "direct"),
			("BRIDGE_QUEUE_NAME", "node-1"),
			("BRIDGE_RECONNECT_DELAY_SECS", "1"),
		]))
		.unwrap();

		assert_eq!(config.broker.host, "rabbit.internal");
		assert_eq!(config.broker.port, 5673);
		assert_eq!(config.broker.vhost, "rooms");
		assert_eq!(config.topology.exchange_type, "direct");
		assert_eq!(config.topology.queue_name, "node-1");
		assert_eq!(config.settings.reconnect_delay, Duration::from_secs(1));
	}

	#[test]
	fn test_invalid_port_is_configuration_error() {
		let err = BridgeConfig::from_lookup(lookup_from(&[(
			"BRIDGE_AMQP_PORT",
			"not-a-port",
		)]))
		.unwrap_err();
		assert!(matches!(err, BridgeError::Configuration(_)));
	}

	#[test]
	fn test_binding_key_falls_back_to_queue() {
		let mut topology = Topology::default();
		assert_eq!(topology.binding_key("amq.gen-1"), "amq.gen-1");
		topology.routing_key = Some("rooms.#".to_string());
		assert_eq!(topology.binding_key("amq.gen-1"), "rooms.#");
	}

	#[test]
	fn test_validate_rejects_zero_capacity() {
		let mut config = BridgeConfig::localhost();
		assert!(config.validate().is_ok());
		config.settings.command_channel_capacity = 0;
		assert!(config.validate().is_err());
	}
}
