//! One cache epoch of a resolved schema.
//!
//! An epoch is immutable apart from its memo slots. Resolution and reset
//! replace the whole epoch behind the schema's lock, so readers holding an
//! older `Arc<CacheEpoch>` keep a consistent view of raw metadata and derived
//! collections.

use crate::entity_set::EntitySetCollection;
use crate::source::ProviderMetadata;
use chrono::{DateTime, Utc};
use odata_edm::{ComplexTypeDef, EntityTypeDef, ParsedSchema};
use std::sync::{Arc, OnceLock};

/// Everything a successful fetch commits
#[derive(Debug)]
pub(crate) struct Resolution {
    pub(crate) raw: Arc<str>,
    pub(crate) parsed: Arc<ParsedSchema>,
    pub(crate) provider_metadata: Option<Arc<ProviderMetadata>>,
    pub(crate) resolved_at: DateTime<Utc>,
}

impl Resolution {
    pub(crate) fn new(
        raw: Arc<str>,
        parsed: ParsedSchema,
        provider_metadata: Option<ProviderMetadata>,
    ) -> Self {
        Self {
            raw,
            parsed: Arc::new(parsed),
            provider_metadata: provider_metadata.map(Arc::new),
            resolved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheEpoch {
    pub(crate) generation: u64,
    pub(crate) resolution: Option<Resolution>,
    pub(crate) entity_sets: OnceLock<Arc<EntitySetCollection>>,
    pub(crate) entity_types: OnceLock<Arc<[EntityTypeDef]>>,
    pub(crate) complex_types: OnceLock<Arc<[ComplexTypeDef]>>,
}

impl CacheEpoch {
    /// Fresh, unresolved epoch
    pub(crate) fn unresolved(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Epoch holding a just-committed resolution with empty memo slots
    pub(crate) fn resolved(generation: u64, resolution: Resolution) -> Self {
        Self {
            generation,
            resolution: Some(resolution),
            ..Self::default()
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}
