use std::sync::Arc;

use crate::{
    cache::SchemaCache,
    clock::{Clock, ManualClock},
    Client, Config,
};

/// Create a test client pointed at a mock server for both the API and the queue.
/// Uses a virtual clock, so polling never sleeps, and a private schema cache.
pub fn test_client(base_url: &str) -> Client {
    test_client_with_clock(base_url, base_url).0
}

/// Like [`test_client`] with separate API and queue bases, returning the
/// virtual clock so tests can advance time or inspect poll sleeps.
pub fn test_client_with_clock(api_base_url: &str, queue_base_url: &str) -> (Client, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let shared: Arc<dyn Clock> = clock.clone();
    let client = Client::new(Config {
        api_key: Some("fal_test_key".into()),
        api_base_url: Some(api_base_url.to_string()),
        queue_base_url: Some(queue_base_url.to_string()),
        clock: Some(shared.clone()),
        schema_cache: Some(Arc::new(SchemaCache::new(shared))),
        ..Default::default()
    })
    .expect("client");
    (client, clock)
}
