//! Tests for Dispatcher routing

use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};

use crate::dispatcher::{Dispatcher, Route};
use crate::error::StoreError;
use crate::membership::{InMemoryMembershipStore, MembershipStore};
use crate::routing::{ChannelSession, SessionRef, SubscriberRegistry};

const EVENT: &[u8] = br#"{"uid":"c1","room":"r1","host":"h1","data":{"x":1}}"#;

#[derive(Default)]
struct RecordingStore {
	calls: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
	fn calls(&self) -> Vec<(String, String)> {
		self.calls.lock().unwrap().clone()
	}
}

impl MembershipStore for RecordingStore {
	fn remove_member(
		&self,
		room: &str,
		member: &str,
	) -> BoxFuture<'static, Result<usize, StoreError>> {
		self.calls
			.lock()
			.unwrap()
			.push((room.to_string(), member.to_string()));
		Box::pin(future::ready(Ok(1)))
	}
}

#[tokio::test]
async fn test_hit_delivers_data_only() {
	let store = Arc::new(RecordingStore::default());
	let dispatcher = Dispatcher::new(store.clone());
	let (session, mut rx) = ChannelSession::new(4);
	let session: SessionRef = session;
	let mut registry = SubscriberRegistry::new();
	registry.add("c1", "r1", &session);

	let route = dispatcher.dispatch(&registry, EVENT).unwrap();
	let Route::Deliver { conn_id, delivery } = route else {
		panic!("expected delivery");
	};
	delivery.await.unwrap();

	assert_eq!(conn_id.as_str(), "c1");
	assert_eq!(rx.recv().await.unwrap().as_str(), r#"{"data":{"x":1}}"#);
	assert!(rx.try_recv().is_err());
	assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_miss_removes_membership_record() {
	let store = Arc::new(RecordingStore::default());
	let dispatcher = Dispatcher::new(store.clone());
	let registry = SubscriberRegistry::new();

	let route = dispatcher.dispatch(&registry, EVENT).unwrap();
	let Route::Reconcile {
		room,
		stale_local,
		removal,
		..
	} = route
	else {
		panic!("expected reconcile");
	};
	removal.await.unwrap();

	assert_eq!(room.as_str(), "r1");
	assert!(!stale_local);
	assert_eq!(store.calls(), vec![(
		"r1".to_string(),
		r#"{"id": "c1", "host": "h1"}"#.to_string()
	)]);
}

#[tokio::test]
async fn test_miss_does_not_touch_other_sessions() {
	let store = Arc::new(RecordingStore::default());
	let dispatcher = Dispatcher::new(store.clone());
	let (other, mut other_rx) = ChannelSession::new(4);
	let other: SessionRef = other;
	let mut registry = SubscriberRegistry::new();
	registry.add("c2", "r1", &other);

	let route = dispatcher.dispatch(&registry, EVENT).unwrap();
	assert!(matches!(route, Route::Reconcile { .. }));
	assert!(other_rx.try_recv().is_err());
	assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn test_dropped_session_is_treated_as_miss() {
	let store = Arc::new(RecordingStore::default());
	let dispatcher = Dispatcher::new(store.clone());
	let (session, _rx) = ChannelSession::new(4);
	let session: SessionRef = session;
	let mut registry = SubscriberRegistry::new();
	registry.add("c1", "r1", &session);
	drop(session);

	let route = dispatcher.dispatch(&registry, EVENT).unwrap();
	assert!(matches!(route, Route::Reconcile {
		stale_local: true,
		..
	}));
	assert_eq!(store.calls().len(), 1);
}

#[test]
fn test_malformed_payload_is_error() {
	let store = Arc::new(RecordingStore::default());
	let dispatcher = Dispatcher::new(store.clone());
	let registry = SubscriberRegistry::new();

	assert!(dispatcher.dispatch(&registry, b"{\"uid\":").is_err());
	assert!(dispatcher.dispatch(&registry, b"[1,2,3]").is_err());
	assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_reconcile_against_in_memory_store() {
	let store = InMemoryMembershipStore::new();
	store.push("r1", r#"{"id": "c1", "host": "h1"}"#).unwrap();
	store.push("r1", r#"{"id": "c9", "host": "h2"}"#).unwrap();
	let dispatcher = Dispatcher::new(Arc::new(store.clone()));

	let route = dispatcher
		.dispatch(&SubscriberRegistry::new(), EVENT)
		.unwrap();
	let Route::Reconcile { removal, .. } = route else {
		panic!("expected reconcile");
	};

	assert_eq!(removal.await.unwrap(), 1);
	assert_eq!(store.members("r1").unwrap(), vec![
		r#"{"id": "c9", "host": "h2"}"#.to_string()
	]);
}
