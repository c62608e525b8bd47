//! Redis Pub/Sub for cross-process L1 invalidation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::backend::MemoryBackend;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Cache invalidation listener that subscribes to Redis Pub/Sub.
///
/// ## How It Works
///
/// 1. Subscribe to the deployment's invalidation channel
/// 2. Each message is `{cache name}:{key}`; the key is removed from that
///    cache's L1 tier
/// 3. This keeps L1 tiers synchronized across processes
///
/// ## Example Flow
///
/// ```text
/// Process 1: access_keys_map.delete("demo")
///   ↓
/// Redis Pub/Sub: PUBLISH appauth:cache:invalidate "access_keys_map:demo"
///   ↓
/// Process 2: listener removes "demo" from the access_keys_map L1 tier
/// Process 3: listener removes "demo" from the access_keys_map L1 tier
/// ```
#[derive(Clone)]
pub struct InvalidationListener {
    redis_url: String,
    channel: String,
    locals: Arc<DashMap<String, MemoryBackend>>,
}

impl InvalidationListener {
    pub fn new(redis_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            channel: channel.into(),
            locals: Arc::new(DashMap::new()),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Route invalidations for `backend.name()` to `backend`.
    pub fn register(&self, backend: &MemoryBackend) {
        self.locals
            .insert(backend.name().to_string(), backend.clone());
    }

    /// Apply one invalidation message. Returns `true` if a registered cache
    /// matched the message.
    pub fn handle_message(&self, payload: &str) -> bool {
        let Some((name, key)) = payload.split_once(':') else {
            tracing::warn!(payload = %payload, "malformed cache invalidation message");
            return false;
        };

        match self.locals.get(name) {
            Some(local) => {
                tracing::debug!(cache = %name, key = %key, "received cache invalidation");
                local.delete(key);
                true
            }
            None => false,
        }
    }

    /// Start listening for cache invalidation events.
    ///
    /// This spawns a background task that:
    /// 1. Subscribes to the invalidation channel
    /// 2. Removes keys from L1 tiers when invalidation events are received
    /// 3. Automatically reconnects with exponential backoff if the connection is lost
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;

            loop {
                match self.run().await {
                    Ok(()) => {
                        backoff = INITIAL_BACKOFF;
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Cache invalidation listener error, reconnecting..."
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        })
    }

    async fn run(&self) -> Result<(), String> {
        use futures_util::StreamExt;

        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = %self.channel, "Subscribed to cache invalidation channel");

        let mut stream = pubsub.on_message();
        loop {
            match stream.next().await {
                Some(msg) => match msg.get_payload::<String>() {
                    Ok(payload) => {
                        self.handle_message(&payload);
                    }
                    Err(_) => {
                        tracing::warn!("failed to parse invalidation message payload");
                    }
                },
                None => {
                    return Err("pub/sub connection closed".to_string());
                }
            }
        }
    }
}
