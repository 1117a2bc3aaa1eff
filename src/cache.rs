//! Time-bounded cache of parsed model schemas.
//!
//! The host asks for a model's parameter list every time a picker is opened,
//! so descriptors are memoized per model id for [`SCHEMA_CACHE_TTL`]. Entries
//! are replaced wholesale on refresh and never mutated in place.
//!
//! The cache is keyed by caller-supplied model ids and has no size bound or
//! eviction beyond the TTL check on read.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, OnceLock, PoisonError, RwLock},
    time::{Duration, Instant},
};

use crate::{
    clock::{Clock, SystemClock},
    errors::Result,
    identifiers::ModelId,
    schema::ModelDescriptor,
};

/// Age at which a cached descriptor is considered stale.
pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

static GLOBAL: OnceLock<Arc<SchemaCache>> = OnceLock::new();

struct CacheEntry {
    descriptor: Arc<ModelDescriptor>,
    fetched_at: Instant,
}

/// Model id to descriptor cache with an injectable clock.
pub struct SchemaCache {
    entries: RwLock<HashMap<ModelId, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SchemaCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: SCHEMA_CACHE_TTL,
            clock,
        }
    }

    /// Override the default 10 minute TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Process-wide cache shared by every client that does not inject one.
    pub fn global() -> Arc<SchemaCache> {
        GLOBAL
            .get_or_init(|| Arc::new(SchemaCache::new(Arc::new(SystemClock))))
            .clone()
    }

    /// Fresh descriptor for `model_id`, or `None` on a miss or expiry.
    pub fn get(&self, model_id: &ModelId) -> Option<Arc<ModelDescriptor>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(model_id)?;
        let age = self.clock.now().saturating_duration_since(entry.fetched_at);
        if age < self.ttl {
            Some(entry.descriptor.clone())
        } else {
            None
        }
    }

    /// Store `descriptor` with a fresh timestamp, replacing any older entry.
    pub fn insert(&self, model_id: ModelId, descriptor: ModelDescriptor) -> Arc<ModelDescriptor> {
        let descriptor = Arc::new(descriptor);
        let entry = CacheEntry {
            descriptor: descriptor.clone(),
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model_id, entry);
        descriptor
    }

    /// Return the cached descriptor or run `fetch` and cache its result.
    ///
    /// Unknown schemas (`Ok(None)`) and errors are not cached.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        model_id: &ModelId,
        fetch: F,
    ) -> Result<Option<Arc<ModelDescriptor>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<ModelDescriptor>>>,
    {
        if let Some(hit) = self.get(model_id) {
            return Ok(Some(hit));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(model = %model_id, "schema cache miss");
        match fetch().await? {
            Some(descriptor) => Ok(Some(self.insert(model_id.clone(), descriptor))),
            None => Ok(None),
        }
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish()
    }
}
