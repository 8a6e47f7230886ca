//! Registry of resolved schemas keyed by endpoint

use crate::config::CacheConfig;
use crate::endpoint::EndpointId;
use crate::schema::ResolvedSchema;
use crate::source::MetadataProvider;
use crate::BoxError;
use dashmap::DashMap;
use odata_edm::{CsdlJsonParser, SchemaParser};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Per-endpoint slot; empty while its first schema is being built
type Slot = Arc<OnceLock<Arc<ResolvedSchema>>>;

/// Concurrent map from endpoint identity to its shared [`ResolvedSchema`].
///
/// Get-or-create is atomic per endpoint: the factory runs at most once for a
/// missing key and every caller receives the same instance. Factories run
/// outside the map's locks, so they may read the registry.
pub struct SchemaRegistry {
    schemas: DashMap<EndpointId, Slot>,
    config: CacheConfig,
    parser: Arc<dyn SchemaParser>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create an empty registry whose schemas use `config`
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            schemas: DashMap::new(),
            config,
            parser: Arc::new(CsdlJsonParser::new()),
        }
    }

    /// Builder method to set the parser handed to schemas the registry creates
    pub fn with_parser(mut self, parser: Arc<dyn SchemaParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the schema for `endpoint`, inserting `factory()` if absent.
    ///
    /// Callers racing on a missing endpoint wait for the first factory to
    /// finish. A factory must not call `get_or_create` or `put` for its own
    /// endpoint.
    pub fn get_or_create<F>(&self, endpoint: impl Into<EndpointId>, factory: F) -> Arc<ResolvedSchema>
    where
        F: FnOnce() -> ResolvedSchema,
    {
        let endpoint = endpoint.into();
        let slot = self.slot(&endpoint);
        if let Some(existing) = slot.get() {
            debug!(endpoint = %endpoint, "Cache hit for schema");
            return Arc::clone(existing);
        }

        let schema = slot.get_or_init(|| {
            let schema = factory();
            debug!(endpoint = %schema.endpoint(), "Registered new schema");
            Arc::new(schema)
        });
        Arc::clone(schema)
    }

    /// Associate `schema` with `endpoint` unless an entry already exists.
    /// Returns the instance that is canonical afterwards.
    pub fn put(&self, endpoint: impl Into<EndpointId>, schema: Arc<ResolvedSchema>) -> Arc<ResolvedSchema> {
        let slot = self.slot(&endpoint.into());
        Arc::clone(slot.get_or_init(|| schema))
    }

    pub fn get(&self, endpoint: &str) -> Option<Arc<ResolvedSchema>> {
        self.schemas
            .get(endpoint)
            .and_then(|entry| entry.value().get().cloned())
    }

    /// Slot for `endpoint`, created empty if missing. The map's shard lock is
    /// released before this returns.
    fn slot(&self, endpoint: &EndpointId) -> Slot {
        if let Some(slot) = self.schemas.get(endpoint) {
            return Arc::clone(slot.value());
        }
        let slot = self.schemas.entry(endpoint.clone()).or_default();
        Arc::clone(slot.value())
    }

    /// Get or create a schema backed by a pre-supplied document
    pub fn schema_from_document(
        &self,
        endpoint: impl Into<EndpointId>,
        document: impl Into<Arc<str>>,
    ) -> Arc<ResolvedSchema> {
        let endpoint = endpoint.into();
        self.get_or_create(&endpoint, || {
            self.configure(ResolvedSchema::from_document(&endpoint, document))
        })
    }

    /// Get or create a schema backed by an async fetch function
    pub fn schema_from_fn<F, Fut>(&self, endpoint: impl Into<EndpointId>, fetch: F) -> Arc<ResolvedSchema>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
    {
        let endpoint = endpoint.into();
        self.get_or_create(&endpoint, || self.configure(ResolvedSchema::from_fn(&endpoint, fetch)))
    }

    /// Get or create a schema backed by a live provider
    pub fn schema_from_provider(
        &self,
        endpoint: impl Into<EndpointId>,
        provider: Arc<dyn MetadataProvider>,
    ) -> Arc<ResolvedSchema> {
        let endpoint = endpoint.into();
        self.get_or_create(&endpoint, || {
            self.configure(ResolvedSchema::from_provider(&endpoint, provider))
        })
    }

    fn configure(&self, schema: ResolvedSchema) -> ResolvedSchema {
        schema
            .with_config(self.config.clone())
            .with_parser(Arc::clone(&self.parser))
    }

    /// Remove one endpoint's entry. Holders of the returned schema keep a
    /// usable instance; the next get-or-create builds a fresh one.
    pub fn invalidate(&self, endpoint: &str) -> Option<Arc<ResolvedSchema>> {
        let removed = self
            .schemas
            .remove(endpoint)
            .and_then(|(_, slot)| slot.get().cloned());
        if removed.is_some() {
            info!(endpoint = %endpoint, "Invalidated schema");
        }
        removed
    }

    /// Remove every entry
    pub fn clear_all(&self) {
        info!(cache_entries = self.len(), "Clearing all schemas");
        self.schemas.clear();
    }

    /// Check if a schema exists for the endpoint
    pub fn contains(&self, endpoint: &str) -> bool {
        self.get(endpoint).is_some()
    }

    /// Endpoints with a registered schema; slots still being built are skipped.
    pub fn identities(&self) -> Vec<EndpointId> {
        self.schemas
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schemas
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
