use std::sync::Arc;
use std::time::Duration;

use amqp_room_bridge::advanced::AmqpConnector;
use amqp_room_bridge::{Bridge, BridgeConfig, MembershipStore};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize tracing from the environment
///
/// `RUST_LOG_DISABLE` turns logging off entirely; otherwise `RUST_LOG`
/// is honoured and defaults to `info`.
fn setup_tracing() {
	if std::env::var("RUST_LOG_DISABLE").is_ok() {
		return;
	}
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());
	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(true)
				.with_thread_ids(false)
				.with_file(false)
				.with_line_number(false)
				.compact(),
		)
		.init();
}

#[cfg(feature = "redis")]
async fn membership_store(
) -> Result<Arc<dyn MembershipStore>, Box<dyn std::error::Error>> {
	let url = std::env::var("BRIDGE_REDIS_URL")
		.unwrap_or_else(|_| "redis://127.0.0.1/0".to_string());
	let store =
		amqp_room_bridge::RedisMembershipStore::connect(&url).await?;
	info!(url = %url, "Using redis membership store");
	Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn membership_store(
) -> Result<Arc<dyn MembershipStore>, Box<dyn std::error::Error>> {
	tracing::warn!(
		"Built without the `redis` feature, membership records are kept in \
		 process memory"
	);
	Ok(Arc::new(amqp_room_bridge::InMemoryMembershipStore::new()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Loaded before tracing so `.env` can set RUST_LOG
	dotenv::dotenv().ok();
	setup_tracing();

	let config = BridgeConfig::from_lookup(|key| std::env::var(key).ok())?;
	info!(
		host = %config.broker.host,
		port = config.broker.port,
		exchange = %config.topology.exchange_name,
		queue = %config.topology.queue_name,
		"Starting bridge"
	);

	let store = membership_store().await?;
	let connector = Arc::new(AmqpConnector::new(config.broker.clone()));
	let (bridge, connection) = Bridge::start(config, connector, store).await?;

	let mut ticker = tokio::time::interval(STATS_INTERVAL);
	ticker.tick().await;
	loop {
		tokio::select! {
			res = tokio::signal::ctrl_c() => {
				if let Err(err) = res {
					error!(error = %err, "Failed to listen for Ctrl-C");
				}
				info!("Shutdown requested");
				break;
			}
			_ = ticker.tick() => match bridge.stats().await {
				| Ok(stats) => info!(
					state = %stats.state,
					subscribers = stats.subscriber_count,
					listeners = stats.listener_count,
					pending = stats.pending_tasks,
					uptime_secs = stats.uptime.as_secs(),
					"Bridge stats"
				),
				| Err(err) => {
					error!(error = %err, "Bridge actor is gone");
					break;
				}
			},
		}
	}

	connection.shutdown().await?;
	info!("Bridge stopped");
	Ok(())
}
