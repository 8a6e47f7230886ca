//! Resolved schema: one endpoint's metadata and its memoized views.
//!
//! Lifecycle: a schema starts unresolved. [`ResolvedSchema::resolve`] runs
//! its fetch strategy once and commits raw metadata plus the parsed schema.
//! Derived views are computed on first read and cached until
//! [`ResolvedSchema::reset_cache`] starts a new epoch, which also drops the
//! raw metadata. Reading any view while unresolved fails with
//! [`Error::Unresolved`]; reads never trigger a fetch.

use crate::config::CacheConfig;
use crate::endpoint::EndpointId;
use crate::entity_set::{EntitySet, EntitySetCollection};
use crate::epoch::{CacheEpoch, Resolution};
use crate::source::{FetchStrategy, MetadataProvider, ProviderMetadata};
use crate::{BoxError, Error, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use odata_edm::{ComplexTypeDef, CsdlJsonParser, EntityTypeDef, ParsedSchema, SchemaParser};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Metadata for one endpoint plus the views derived from it
pub struct ResolvedSchema {
    endpoint: EndpointId,
    strategy: FetchStrategy,
    parser: Arc<dyn SchemaParser>,
    config: CacheConfig,
    /// Serializes fetches so concurrent callers share one round trip
    resolve_lock: Mutex<()>,
    state: RwLock<Arc<CacheEpoch>>,
}

impl std::fmt::Debug for ResolvedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSchema")
            .field("endpoint", &self.endpoint)
            .field("strategy", &self.strategy)
            .field("resolved", &self.is_resolved())
            .field("epoch", &self.epoch())
            .finish()
    }
}

impl ResolvedSchema {
    /// Create an unresolved schema with the default CSDL JSON parser
    pub fn new(endpoint: impl Into<EndpointId>, strategy: FetchStrategy) -> Self {
        Self {
            endpoint: endpoint.into(),
            strategy,
            parser: Arc::new(CsdlJsonParser::new()),
            config: CacheConfig::default(),
            resolve_lock: Mutex::new(()),
            state: RwLock::new(Arc::new(CacheEpoch::unresolved(0))),
        }
    }

    /// Schema backed by a document supplied up front
    pub fn from_document(endpoint: impl Into<EndpointId>, document: impl Into<Arc<str>>) -> Self {
        Self::new(endpoint, FetchStrategy::Document(document.into()))
    }

    /// Schema backed by an async function returning the raw document
    pub fn from_fn<F, Fut>(endpoint: impl Into<EndpointId>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<String, BoxError>> + Send + 'static,
    {
        Self::new(endpoint, FetchStrategy::Function(Arc::new(move || fetch().boxed())))
    }

    /// Schema backed by a live metadata provider
    pub fn from_provider(endpoint: impl Into<EndpointId>, provider: Arc<dyn MetadataProvider>) -> Self {
        Self::new(endpoint, FetchStrategy::Provider(provider))
    }

    /// Builder method to replace the schema parser. Provider-backed schemas
    /// hand it to [`MetadataProvider::parsed_schema`].
    pub fn with_parser(mut self, parser: Arc<dyn SchemaParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Builder method to replace the cache configuration
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn strategy(&self) -> &FetchStrategy {
        &self.strategy
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current cache epoch; bumped by every reset
    pub fn epoch(&self) -> u64 {
        self.state.read().generation
    }

    pub fn is_resolved(&self) -> bool {
        self.state.read().is_resolved()
    }

    /// Raw metadata document, `None` while unresolved
    pub fn metadata_as_string(&self) -> Option<Arc<str>> {
        self.snapshot()
            .resolution
            .as_ref()
            .map(|r| Arc::clone(&r.raw))
    }

    /// When the current epoch's metadata was committed
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().resolution.as_ref().map(|r| r.resolved_at)
    }

    // ========== Resolution ==========

    /// Fetch and commit the metadata document if this epoch has none yet.
    ///
    /// Already-resolved schemas return immediately without touching the
    /// source or any cached view. Concurrent callers wait for the single
    /// in-flight fetch. Failure, timeout or cancellation commits nothing, so
    /// a later call retries the fetch. A fetch overtaken by
    /// [`reset_cache`](Self::reset_cache) is discarded and repeated in the
    /// new epoch.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<&Self> {
        if self.is_resolved() {
            trace!(endpoint = %self.endpoint, "Metadata already resolved");
            return Ok(self);
        }
        if cancel.is_cancelled() {
            return Err(self.canceled());
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.canceled()),
            guard = self.resolve_lock.lock() => guard,
        };

        // Another caller may have committed while we waited for the lock.
        if self.is_resolved() {
            debug!(endpoint = %self.endpoint, "Metadata resolved by concurrent caller");
            return Ok(self);
        }

        loop {
            let generation = self.epoch();
            info!(
                endpoint = %self.endpoint,
                strategy = self.strategy.kind(),
                epoch = generation,
                "Resolving metadata"
            );

            let resolution = match self.fetch_with_timeout(cancel).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Metadata resolution failed");
                    return Err(e);
                }
            };

            // A reset during the fetch means the result belongs to a dropped epoch.
            if self.commit(generation, resolution) {
                return Ok(self);
            }
            debug!(endpoint = %self.endpoint, epoch = generation, "Cache reset during fetch, fetching again");
        }
    }

    /// Drop the current epoch and resolve again: a full refresh.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<&Self> {
        self.reset_cache();
        self.resolve(cancel).await
    }

    async fn fetch_with_timeout(&self, cancel: &CancellationToken) -> Result<Resolution> {
        match self.config.fetch_timeout() {
            Some(after) => tokio::time::timeout(after, self.fetch(cancel))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout {
                        endpoint: self.endpoint.clone(),
                        after,
                    })
                }),
            None => self.fetch(cancel).await,
        }
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Resolution> {
        match &self.strategy {
            FetchStrategy::Document(document) => {
                let parsed = self.parse(document)?;
                Ok(Resolution::new(Arc::clone(document), parsed, None))
            }
            FetchStrategy::Function(fetch) => {
                let raw = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.canceled()),
                    raw = fetch() => raw.map_err(|e| Error::fetch(&self.endpoint, e))?,
                };
                let parsed = self.parse(&raw)?;
                Ok(Resolution::new(Arc::from(raw), parsed, None))
            }
            FetchStrategy::Provider(provider) => {
                let response = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.canceled()),
                    response = provider.send_schema_request(cancel.clone()) => {
                        response.map_err(|e| Error::fetch(&self.endpoint, e))?
                    }
                };
                let raw = provider
                    .schema_as_string(&response)
                    .map_err(|e| Error::fetch(&self.endpoint, e))?;
                let metadata = provider
                    .provider_metadata(&response)
                    .map_err(|e| Error::fetch(&self.endpoint, e))?;
                let parsed = provider
                    .parsed_schema(&metadata, &*self.parser)
                    .map_err(|e| Error::parse(&self.endpoint, e))?;
                Ok(Resolution::new(Arc::from(raw), parsed, Some(metadata)))
            }
        }
    }

    fn parse(&self, document: &str) -> Result<ParsedSchema> {
        self.parser
            .parse(document)
            .map_err(|e| Error::parse(&self.endpoint, e))
    }

    /// Install `resolution` if the epoch is still `generation`.
    fn commit(&self, generation: u64, resolution: Resolution) -> bool {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        *state = Arc::new(CacheEpoch::resolved(generation, resolution));
        info!(endpoint = %self.endpoint, epoch = generation, "Metadata resolved");
        true
    }

    fn canceled(&self) -> Error {
        warn!(endpoint = %self.endpoint, "Metadata resolution canceled");
        Error::Canceled {
            endpoint: self.endpoint.clone(),
        }
    }

    // ========== Cache Reset ==========

    /// Start a new cache epoch: raw metadata and every derived view are
    /// dropped together. The schema is unresolved afterwards.
    pub fn reset_cache(&self) {
        let mut state = self.state.write();
        let generation = state.generation + 1;
        *state = Arc::new(CacheEpoch::unresolved(generation));
        info!(endpoint = %self.endpoint, epoch = generation, "Schema cache reset");
    }

    // ========== Derived Views ==========

    fn snapshot(&self) -> Arc<CacheEpoch> {
        Arc::clone(&*self.state.read())
    }

    fn resolved_snapshot(&self) -> Result<(Arc<CacheEpoch>, Arc<ParsedSchema>)> {
        let epoch = self.snapshot();
        let parsed = epoch
            .resolution
            .as_ref()
            .map(|r| Arc::clone(&r.parsed))
            .ok_or_else(|| Error::Unresolved {
                endpoint: self.endpoint.clone(),
            })?;
        Ok((epoch, parsed))
    }

    /// Parsed metadata document
    pub fn metadata(&self) -> Result<Arc<ParsedSchema>> {
        self.resolved_snapshot().map(|(_, parsed)| parsed)
    }

    /// Provider metadata; only provider-backed schemas have any.
    pub fn provider_metadata(&self) -> Result<Arc<ProviderMetadata>> {
        if !matches!(self.strategy, FetchStrategy::Provider(_)) {
            return Err(Error::Unsupported {
                operation: "provider metadata",
                mode: self.strategy.kind(),
            });
        }
        let epoch = self.snapshot();
        epoch
            .resolution
            .as_ref()
            .and_then(|r| r.provider_metadata.clone())
            .ok_or_else(|| Error::Unresolved {
                endpoint: self.endpoint.clone(),
            })
    }

    /// Entity sets exposed by the service's entity container
    pub fn entity_sets(&self) -> Result<Arc<EntitySetCollection>> {
        let (epoch, parsed) = self.resolved_snapshot()?;
        memoize(&epoch.entity_sets, || {
            debug!(endpoint = %self.endpoint, epoch = epoch.generation, "Building entity set collection");
            EntitySetCollection::build(&self.endpoint, &parsed, self.config.name_matching).map(Arc::new)
        })
    }

    /// Every entity type in the metadata, in declaration order
    pub fn entity_types(&self) -> Result<Arc<[EntityTypeDef]>> {
        let (epoch, parsed) = self.resolved_snapshot()?;
        memoize(&epoch.entity_types, || {
            debug!(endpoint = %self.endpoint, epoch = epoch.generation, "Listing entity types");
            Ok(parsed.entity_types().cloned().collect())
        })
    }

    /// Every complex type in the metadata, in declaration order
    pub fn complex_types(&self) -> Result<Arc<[ComplexTypeDef]>> {
        let (epoch, parsed) = self.resolved_snapshot()?;
        memoize(&epoch.complex_types, || {
            debug!(endpoint = %self.endpoint, epoch = epoch.generation, "Listing complex types");
            Ok(parsed.complex_types().cloned().collect())
        })
    }

    // ========== Lookups ==========

    pub fn has_table(&self, name: &str) -> Result<bool> {
        match self.find_entity_set(name) {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. } | Error::InvalidArgument { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Find a top-level entity set by name
    pub fn find_entity_set(&self, name: &str) -> Result<EntitySet> {
        if name.is_empty() {
            return Err(Error::invalid_argument("entity set name", "name is empty"));
        }
        self.entity_sets()?
            .find(name)
            .cloned()
            .ok_or_else(|| Error::not_found("Entity set", name))
    }

    /// Look up the first `/`-delimited segment of `path`; the rest is ignored.
    pub fn find_base_entity_set(&self, path: &str) -> Result<EntitySet> {
        let base = path.split('/').next().unwrap_or_default();
        if base.is_empty() {
            return Err(Error::invalid_argument(
                format!("entity set path '{}'", path),
                "base segment is empty",
            ));
        }
        self.find_entity_set(base)
    }

    /// Resolve `Base`, `Base/` or `Base/Derived` to the addressed entity set.
    ///
    /// Only the first two segments are considered.
    pub fn find_concrete_entity_set(&self, path: &str) -> Result<EntitySet> {
        let mut segments = path.split('/');
        let base = segments.next().unwrap_or_default();
        let Some(derived) = segments.next() else {
            return self.find_entity_set(path);
        };

        let base_set = self.find_base_entity_set(base)?;
        if derived.is_empty() {
            return Ok(base_set);
        }
        base_set
            .find_derived(derived)
            .cloned()
            .ok_or_else(|| Error::not_found("Derived entity set", format!("{}/{}", base, derived)))
    }

    /// Find an entity type by simple or namespace-qualified name
    pub fn find_entity_type(&self, name: &str) -> Result<EntityTypeDef> {
        self.metadata()?
            .find_entity_type(name, self.config.name_matching)
            .cloned()
            .ok_or_else(|| Error::not_found("Entity type", name))
    }

    /// Find a complex type by simple or namespace-qualified name
    pub fn find_complex_type(&self, name: &str) -> Result<ComplexTypeDef> {
        self.metadata()?
            .find_complex_type(name, self.config.name_matching)
            .cloned()
            .ok_or_else(|| Error::not_found("Complex type", name))
    }
}

/// Return the slot's value, computing it first if the slot is empty.
/// Racing readers may compute redundantly; the first stored value wins.
fn memoize<T: Clone>(slot: &OnceLock<T>, compute: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(value) = slot.get() {
        return Ok(value.clone());
    }
    let value = compute()?;
    Ok(slot.get_or_init(|| value).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOCUMENT: &str = r#"
    {
        "$Version": "4.0",
        "Shop": {
            "Order": { "$Kind": "EntityType", "$Key": ["Id"], "Id": { "$Type": "Edm.Int32" } },
            "RushOrder": { "$Kind": "EntityType", "$BaseType": "Shop.Order", "Fee": { "$Type": "Edm.Decimal" } },
            "Product": { "$Kind": "EntityType", "$Key": ["Sku"], "Sku": {} },
            "Money": { "$Kind": "ComplexType", "Amount": { "$Type": "Edm.Decimal" }, "Currency": {} },
            "Container": {
                "$Kind": "EntityContainer",
                "Orders": { "$Collection": true, "$Type": "Shop.Order" },
                "Products": { "$Collection": true, "$Type": "Shop.Product" }
            }
        }
    }
    "#;

    async fn resolved() -> ResolvedSchema {
        let schema = ResolvedSchema::from_document("shop", DOCUMENT);
        schema.resolve(&CancellationToken::new()).await.unwrap();
        schema
    }

    #[tokio::test]
    async fn test_views_fail_before_resolution() {
        let schema = ResolvedSchema::from_document("shop", DOCUMENT);
        assert!(!schema.is_resolved());
        assert!(schema.metadata_as_string().is_none());
        assert!(matches!(schema.metadata(), Err(Error::Unresolved { .. })));
        assert!(matches!(schema.entity_sets(), Err(Error::Unresolved { .. })));
        assert!(matches!(schema.entity_types(), Err(Error::Unresolved { .. })));
        assert!(matches!(schema.complex_types(), Err(Error::Unresolved { .. })));
        assert!(matches!(schema.find_entity_set("Orders"), Err(Error::Unresolved { .. })));
    }

    #[tokio::test]
    async fn test_document_resolution() {
        let schema = resolved().await;
        assert!(schema.is_resolved());
        assert!(schema.resolved_at().is_some());
        assert_eq!(schema.metadata_as_string().as_deref(), Some(DOCUMENT));
        assert_eq!(schema.metadata().unwrap().version, "4.0");
    }

    #[tokio::test]
    async fn test_views_are_memoized() {
        let schema = resolved().await;
        let first = schema.entity_sets().unwrap();
        let second = schema.entity_sets().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let types = schema.entity_types().unwrap();
        assert!(Arc::ptr_eq(&types, &schema.entity_types().unwrap()));
        assert_eq!(types.len(), 3);

        let complex = schema.complex_types().unwrap();
        assert!(Arc::ptr_eq(&complex, &schema.complex_types().unwrap()));
        assert_eq!(complex.len(), 1);
    }

    #[tokio::test]
    async fn test_path_lookups() {
        let schema = resolved().await;
        let orders = schema.find_entity_set("Orders").unwrap();

        assert_eq!(schema.find_base_entity_set("Orders/RushOrder").unwrap(), orders);
        assert_eq!(schema.find_concrete_entity_set("Orders/").unwrap(), orders);
        assert_eq!(schema.find_concrete_entity_set("Orders").unwrap(), orders);

        let rush = schema.find_concrete_entity_set("Orders/RushOrder").unwrap();
        assert_eq!(rush.name(), "RushOrder");
        assert_eq!(rush.parent(), Some("Orders"));
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let schema = resolved().await;
        assert!(schema.find_entity_set("Missing").unwrap_err().is_not_found());
        assert!(schema
            .find_concrete_entity_set("Orders/Product")
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            schema.find_base_entity_set("/RushOrder"),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            schema.find_concrete_entity_set("/RushOrder"),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(!schema.has_table("Missing").unwrap());
        assert!(schema.has_table("products").unwrap());
    }

    #[tokio::test]
    async fn test_type_lookups() {
        let schema = resolved().await;
        assert_eq!(schema.find_entity_type("Shop.Product").unwrap().name, "Product");
        assert_eq!(schema.find_complex_type("money").unwrap().properties.len(), 2);
        assert!(schema.find_complex_type("Order").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_provider_metadata_unsupported_without_provider() {
        let schema = resolved().await;
        assert!(matches!(
            schema.provider_metadata(),
            Err(Error::Unsupported { mode: "document", .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_starts_new_epoch() {
        let schema = resolved().await;
        let before = schema.entity_sets().unwrap();
        assert_eq!(schema.epoch(), 0);

        schema.reset_cache();
        assert_eq!(schema.epoch(), 1);
        assert!(schema.metadata_as_string().is_none());
        assert!(matches!(schema.entity_sets(), Err(Error::Unresolved { .. })));

        schema.resolve(&CancellationToken::new()).await.unwrap();
        let after = schema.entity_sets().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*before, *after);
    }

    #[tokio::test]
    async fn test_function_fetch_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let schema = ResolvedSchema::from_fn("shop", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(DOCUMENT.to_string())
            }
        });

        let token = CancellationToken::new();
        schema.resolve(&token).await.unwrap();
        schema.resolve(&token).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        schema.refresh(&token).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            schema.provider_metadata(),
            Err(Error::Unsupported { mode: "function", .. })
        ));
    }

    #[tokio::test]
    async fn test_parse_failure_leaves_unresolved() {
        let schema = ResolvedSchema::from_document("broken", "not json");
        let err = schema.resolve(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(!schema.is_resolved());
    }

    #[tokio::test]
    async fn test_pre_canceled_token() {
        let schema = ResolvedSchema::from_document("shop", DOCUMENT);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(schema.resolve(&token).await, Err(Error::Canceled { .. })));
        assert!(!schema.is_resolved());
    }
}
