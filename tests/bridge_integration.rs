//! Integration tests for the bridge actor against a scripted broker
//!
//! The scripted connector records every topology call and hands the test
//! the sending side of each consumer stream, so deliveries and dropped
//! connections can be injected at will. Time is paused, so reconnect
//! delays elapse as soon as every task is idle.

use std::result::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amqp_room_bridge::advanced::{BrokerConnector, BrokerLink, DeliveryStream};
use amqp_room_bridge::errors::BrokerError;
use amqp_room_bridge::prelude::*;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::BoxFuture;
use futures::StreamExt;

const HIT: &[u8] = br#"{"uid":"c1","room":"r1","host":"h1","data":{"x":1}}"#;

#[derive(Default)]
struct Script {
	log: Mutex<Vec<String>>,
	feeds: Mutex<Vec<UnboundedSender<Vec<u8>>>>,
	failures_left: Mutex<usize>,
	queue_failures_left: Mutex<usize>,
}

impl Script {
	fn record(&self, call: impl Into<String>) {
		self.log.lock().unwrap().push(call.into());
	}

	fn calls(&self, prefix: &str) -> usize {
		self.log
			.lock()
			.unwrap()
			.iter()
			.filter(|call| call.starts_with(prefix))
			.count()
	}

	fn log(&self) -> Vec<String> {
		self.log.lock().unwrap().clone()
	}

	/// Push a body into the newest consumer stream.
	fn deliver(&self, body: &[u8]) {
		let feeds = self.feeds.lock().unwrap();
		let feed = feeds.last().expect("no consumer stream opened");
		feed.unbounded_send(body.to_vec()).unwrap();
	}

	/// End every open consumer stream, as a dropped connection would.
	fn drop_connection(&self) {
		self.feeds.lock().unwrap().clear();
	}
}

#[derive(Clone, Default)]
struct ScriptedConnector {
	script: Arc<Script>,
}

impl ScriptedConnector {
	fn failing_first(attempts: usize) -> Self {
		let connector = Self::default();
		*connector.script.failures_left.lock().unwrap() = attempts;
		connector
	}

	fn failing_queue_declare(attempts: usize) -> Self {
		let connector = Self::default();
		*connector.script.queue_failures_left.lock().unwrap() = attempts;
		connector
	}
}

impl BrokerConnector for ScriptedConnector {
	fn connect(
		&self,
	) -> BoxFuture<'static, Result<Box<dyn BrokerLink>, BrokerError>> {
		let script = Arc::clone(&self.script);
		Box::pin(async move {
			script.record("connect");
			{
				let mut failures = script.failures_left.lock().unwrap();
				if *failures > 0 {
					*failures -= 1;
					return Err(BrokerError::Connect("refused".to_string()));
				}
			}
			Ok(Box::new(ScriptedLink { script }) as Box<dyn BrokerLink>)
		})
	}
}

struct ScriptedLink {
	script: Arc<Script>,
}

impl BrokerLink for ScriptedLink {
	fn open_channel(&mut self) -> BoxFuture<'_, Result<(), BrokerError>> {
		self.script.record("channel");
		Box::pin(async { Ok(()) })
	}

	fn declare_exchange<'a>(
		&'a mut self,
		name: &'a str,
		kind: &'a str,
	) -> BoxFuture<'a, Result<(), BrokerError>> {
		self.script.record(format!("exchange {name} {kind}"));
		Box::pin(async { Ok(()) })
	}

	fn declare_queue<'a>(
		&'a mut self,
		name: &'a str,
	) -> BoxFuture<'a, Result<String, BrokerError>> {
		self.script.record(format!("queue {name}"));
		let mut failures = self.script.queue_failures_left.lock().unwrap();
		let result = if *failures > 0 {
			*failures -= 1;
			Err(BrokerError::QueueDeclare {
				queue: name.to_string(),
				reason: "PRECONDITION_FAILED".to_string(),
			})
		} else {
			Ok(name.to_string())
		};
		Box::pin(async move { result })
	}

	fn bind_queue<'a>(
		&'a mut self,
		queue: &'a str,
		exchange: &'a str,
		routing_key: &'a str,
	) -> BoxFuture<'a, Result<(), BrokerError>> {
		self.script
			.record(format!("bind {queue} {exchange} {routing_key}"));
		Box::pin(async { Ok(()) })
	}

	fn consume<'a>(
		&'a mut self,
		queue: &'a str,
		consumer_tag: &'a str,
	) -> BoxFuture<'a, Result<DeliveryStream, BrokerError>> {
		self.script.record(format!("consume {queue} {consumer_tag}"));
		let (tx, rx) = mpsc::unbounded::<Vec<u8>>();
		self.script.feeds.lock().unwrap().push(tx);
		let deliveries: DeliveryStream = rx.map(Ok).boxed();
		Box::pin(async move { Ok(deliveries) })
	}

	fn close(&mut self) -> BoxFuture<'_, Result<(), BrokerError>> {
		self.script.record("close");
		Box::pin(async { Ok(()) })
	}
}

async fn start(
	connector: &ScriptedConnector,
	store: Arc<dyn MembershipStore>,
) -> (Bridge, BridgeConnection) {
	Bridge::start(
		BridgeConfig::localhost(),
		Arc::new(connector.clone()),
		store,
	)
	.await
	.unwrap()
}

async fn wait_until(
	bridge: &Bridge,
	predicate: impl FnMut(&ConnectionState) -> bool,
) {
	let mut rx = bridge.watch_state();
	tokio::time::timeout(Duration::from_secs(60), rx.wait_for(predicate))
		.await
		.expect("state not reached in time")
		.unwrap();
}

async fn wait_consuming(bridge: &Bridge) {
	wait_until(bridge, |s| *s == ConnectionState::Consuming).await;
}

#[tokio::test(start_paused = true)]
async fn test_declares_topology_then_consumes() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;

	wait_consuming(&bridge).await;

	assert_eq!(connector.script.log(), vec![
		"connect",
		"channel",
		"exchange sockjs fanout",
		"queue sockjs",
		"bind sockjs sockjs sockjs",
		"consume sockjs amqp-room-bridge",
	]);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_ignored_while_connected() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	wait_consuming(&bridge).await;

	bridge.connect_broker().await.unwrap();
	bridge.connect_broker().await.unwrap();
	// Commands are applied in order, so this round trip follows both.
	let stats = bridge.stats().await.unwrap();

	assert_eq!(stats.state, ConnectionState::Consuming);
	assert_eq!(connector.script.calls("connect"), 1);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_redeclares_topology() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	wait_consuming(&bridge).await;
	let first = bridge.stats().await.unwrap();

	connector.script.drop_connection();
	wait_until(&bridge, |s| *s != ConnectionState::Consuming).await;
	wait_consuming(&bridge).await;

	let second = bridge.stats().await.unwrap();
	assert_eq!(connector.script.calls("connect"), 2);
	assert_eq!(connector.script.calls("exchange"), 2);
	assert_eq!(connector.script.calls("bind"), 2);
	assert!(second.generation > first.generation);
	assert!(second.uptime >= first.uptime + Duration::from_secs(5));
	assert!(second.last_reconnect >= first.last_reconnect);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_is_retried() {
	let connector = ScriptedConnector::failing_first(2);
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;

	wait_consuming(&bridge).await;

	assert_eq!(connector.script.calls("connect"), 3);
	assert_eq!(connector.script.calls("consume"), 1);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_accessors_answer_while_reconnecting() {
	let connector = ScriptedConnector::failing_first(usize::MAX);
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	wait_until(&bridge, |s| *s == ConnectionState::ReconnectPending).await;

	let (session, _rx) = ChannelSession::new(4);
	assert!(!bridge.add_subscriber("c1", "r1", session.clone()).await.unwrap());
	assert!(bridge.add_listener("l1").await.unwrap());

	assert_eq!(bridge.subscriber_count().await.unwrap(), 1);
	assert_eq!(bridge.listener_count().await.unwrap(), 1);
	assert_eq!(
		bridge.lookup_subscriber("c1").await.unwrap().as_deref(),
		Some("r1")
	);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hit_is_delivered_to_session() {
	let connector = ScriptedConnector::default();
	let store = InMemoryMembershipStore::new();
	let (bridge, connection) = start(&connector, Arc::new(store.clone())).await;
	let (session, mut rx) = ChannelSession::new(4);
	bridge.add_subscriber("c1", "r1", session.clone()).await.unwrap();
	wait_consuming(&bridge).await;

	connector.script.deliver(HIT);

	let payload = rx.recv().await.unwrap();
	assert_eq!(payload.as_str(), r#"{"data":{"x":1}}"#);
	assert!(store.members("r1").unwrap().is_empty());
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_miss_removes_stale_membership() {
	let connector = ScriptedConnector::default();
	let store = InMemoryMembershipStore::new();
	store.push("r1", r#"{"id": "c1", "host": "h1"}"#).unwrap();
	store.push("r1", r#"{"id": "c2", "host": "h1"}"#).unwrap();
	let (bridge, connection) = start(&connector, Arc::new(store.clone())).await;
	let (other, mut other_rx) = ChannelSession::new(4);
	bridge.add_subscriber("c2", "r1", other.clone()).await.unwrap();
	wait_consuming(&bridge).await;

	connector.script.deliver(HIT);

	let expected = vec![r#"{"id": "c2", "host": "h1"}"#.to_string()];
	for _ in 0 .. 100 {
		if store.members("r1").unwrap() == expected {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(store.members("r1").unwrap(), expected);
	assert!(other_rx.try_recv().is_err());
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_is_pruned() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	let (session, _rx) = ChannelSession::new(4);
	bridge.add_subscriber("c1", "r1", session).await.unwrap();
	wait_consuming(&bridge).await;

	connector.script.deliver(HIT);

	for _ in 0 .. 100 {
		if bridge.subscriber_count().await.unwrap() == 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(bridge.subscriber_count().await.unwrap(), 0);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_event_does_not_stop_consuming() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	let (session, mut rx) = ChannelSession::new(4);
	bridge.add_subscriber("c1", "r1", session.clone()).await.unwrap();
	wait_consuming(&bridge).await;

	connector.script.deliver(b"not json");
	connector.script.deliver(br#"{"uid":"c1","room":"r1","host":"h1"}"#);
	connector.script.deliver(HIT);

	assert_eq!(rx.recv().await.unwrap().as_str(), r#"{"data":{"x":1}}"#);
	assert_eq!(bridge.connection_state(), ConnectionState::Consuming);
	assert_eq!(connector.script.calls("connect"), 1);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_and_listener_bookkeeping() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	let (first, _rx1) = ChannelSession::new(4);
	let (second, _rx2) = ChannelSession::new(4);

	assert!(!bridge.add_subscriber("c1", "r1", first.clone()).await.unwrap());
	assert!(bridge.add_subscriber("c1", "r2", second.clone()).await.unwrap());
	assert!(!bridge.add_subscriber("c2", "r1", first.clone()).await.unwrap());
	assert_eq!(bridge.subscriber_count().await.unwrap(), 2);
	assert_eq!(
		bridge.lookup_subscriber("c1").await.unwrap().as_deref(),
		Some("r2")
	);
	assert!(bridge.remove_subscriber("c1").await.unwrap());
	assert!(!bridge.remove_subscriber("c1").await.unwrap());
	assert_eq!(bridge.lookup_subscriber("c1").await.unwrap(), None);
	let ids = bridge.subscriber_ids().await.unwrap();
	assert_eq!(ids.len(), 1);
	assert_eq!(ids[0].as_str(), "c2");

	assert!(bridge.add_listener("l1").await.unwrap());
	assert!(!bridge.add_listener("l1").await.unwrap());
	assert!(bridge.add_listener("l2").await.unwrap());
	assert!(!bridge.remove_listener("l3").await.unwrap());
	assert!(bridge.remove_listener("l1").await.unwrap());
	assert_eq!(bridge.listener_count().await.unwrap(), 1);
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_uptime_survives_reconnects() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	wait_consuming(&bridge).await;
	let before = bridge.uptime().await.unwrap();

	tokio::time::sleep(Duration::from_secs(3)).await;
	connector.script.drop_connection();
	wait_until(&bridge, |s| *s != ConnectionState::Consuming).await;
	wait_consuming(&bridge).await;

	let after = bridge.uptime().await.unwrap();
	assert!(after >= before + Duration::from_secs(8));
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_broker_connection() {
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	wait_consuming(&bridge).await;

	connection.shutdown().await.unwrap();

	assert_eq!(connector.script.calls("close"), 1);
	assert!(bridge.stats().await.is_err());
	assert_eq!(bridge.connection_state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_queue_declare_restarts_from_scratch() {
	let connector = ScriptedConnector::failing_queue_declare(1);
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;

	wait_consuming(&bridge).await;

	assert_eq!(connector.script.log(), vec![
		"connect",
		"channel",
		"exchange sockjs fanout",
		"queue sockjs",
		"close",
		"connect",
		"channel",
		"exchange sockjs fanout",
		"queue sockjs",
		"bind sockjs sockjs sockjs",
		"consume sockjs amqp-room-bridge",
	]);
	connection.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_receives_events_in_broker_order() {
	const EVENTS: usize = 50;
	let connector = ScriptedConnector::default();
	let (bridge, connection) =
		start(&connector, Arc::new(InMemoryMembershipStore::new())).await;
	// Small capacity so later deliveries queue up behind earlier ones
	let (session, mut rx) = ChannelSession::new(2);
	bridge.add_subscriber("c1", "r1", session.clone()).await.unwrap();
	wait_consuming(&bridge).await;

	for round in 0 .. 5 {
		for i in 0 .. EVENTS {
			let body = format!(
				r#"{{"uid":"c1","room":"r1","host":"h1","data":{i}}}"#
			);
			connector.script.deliver(body.as_bytes());
		}

		let mut received = Vec::with_capacity(EVENTS);
		for _ in 0 .. EVENTS {
			let payload =
				tokio::time::timeout(Duration::from_secs(10), rx.recv())
					.await
					.expect("delivery not received in time")
					.unwrap();
			received.push(payload.to_string());
		}
		let expected = (0 .. EVENTS)
			.map(|i| format!(r#"{{"data":{i}}}"#))
			.collect::<Vec<_>>();
		assert_eq!(received, expected, "round {round} out of order");
	}
	connection.shutdown().await.unwrap();
}
