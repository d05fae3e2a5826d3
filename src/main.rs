//! keyed-fanout demo entry point.
//!
//! Walks through the basic publish/subscribe flows and logs what each
//! subscriber and follower observes. Set `RUST_LOG=debug` to also see lazy
//! channel creation, and `FANOUT_FAULT_POLICY=fail_fast` to change how the
//! faulting subscriber at the end is handled.

use tracing_subscriber::EnvFilter;

use keyed_fanout::config::FanoutConfig;
use keyed_fanout::domain::{Client, EventBus, KeyedEvent, Network, Publisher};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = FanoutConfig::from_env()?;
    tracing::info!(
        policy = %config.fault_policy,
        bus_capacity = config.bus_capacity,
        "starting keyed-fanout demo"
    );

    // Keyed events
    let network: Network<String, i64> = Network::with_config(&config);
    network.follow(|key, value| tracing::info!(%key, value, "network follower"));
    network.subscribe("a".to_string(), |value| tracing::info!(value, "subscriber of a"));
    network.publish(&"a".to_string(), 5)?;
    network.publish(&"unknown".to_string(), 1)?;

    // Keyed cells, mirrored to a broadcast bus
    let client: Client<String, u64> = Client::with_config(&config);
    let bus: EventBus<KeyedEvent<String, u64>> = EventBus::from_config(&config);
    let mut rx = bus.subscribe();
    bus.follow_client(&client);

    client.set("likes".to_string(), 10)?;
    tracing::info!(likes = ?client.get(&"likes".to_string()), "after first set");
    client.subscribe("likes".to_string(), |value| tracing::info!(value, "subscriber of likes"));
    client.set("likes".to_string(), 11)?;

    while let Ok(event) = rx.try_recv() {
        let json = event.to_json()?;
        tracing::info!(%json, "bus event");
    }

    // Unsubscribe
    let publisher: Publisher<i32> = Publisher::with_policy(config.fault_policy);
    let unsubscribe = publisher.subscribe(|value| tracing::info!(value, "never printed"));
    unsubscribe.unsubscribe();
    publisher.publish(&1)?;

    // Fault handling
    publisher.try_subscribe(|value| anyhow::bail!("rejecting {value}"));
    publisher.subscribe(|value| tracing::info!(value, "runs after the faulting subscriber"));
    if let Err(err) = publisher.publish(&2) {
        for fault in err.faults() {
            tracing::warn!(label = err.as_label(), %fault, "delivery fault");
        }
    }

    Ok(())
}
