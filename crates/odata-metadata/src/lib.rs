//! # odata-metadata
//!
//! Per-endpoint cache of OData service metadata.
//!
//! A [`SchemaRegistry`] maps an [`EndpointId`] to one shared
//! [`ResolvedSchema`]. Resolution fetches the metadata document at most once
//! per cache epoch, through a pre-supplied document, an async function or a
//! [`MetadataProvider`]. Derived views (entity sets, entity types, complex
//! types) are computed on first read and memoized until the next reset.

pub mod config;
pub mod endpoint;
pub mod entity_set;
mod epoch;
pub mod registry;
pub mod schema;
pub mod source;

pub use config::CacheConfig;
pub use endpoint::EndpointId;
pub use entity_set::{EntitySet, EntitySetCollection};
pub use odata_edm::{
    ComplexTypeDef, CsdlJsonParser, EntityTypeDef, NameMatching, ParsedSchema, SchemaParser,
};
pub use registry::SchemaRegistry;
pub use schema::ResolvedSchema;
pub use source::{FetchFn, FetchStrategy, MetadataProvider, ProviderMetadata, SchemaResponse};
pub use tokio_util::sync::CancellationToken;

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by metadata transports and fetch functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while resolving or reading cached metadata
#[derive(Error, Debug)]
pub enum Error {
    #[error("Metadata for '{endpoint}' has not been resolved")]
    Unresolved { endpoint: EndpointId },

    #[error("{operation} is not supported for {mode} metadata sources")]
    Unsupported {
        operation: &'static str,
        mode: &'static str,
    },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Invalid {argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("Failed to fetch metadata for '{endpoint}': {source}")]
    Fetch {
        endpoint: EndpointId,
        #[source]
        source: BoxError,
    },

    #[error("Failed to parse metadata for '{endpoint}': {source}")]
    Parse {
        endpoint: EndpointId,
        #[source]
        source: odata_edm::Error,
    },

    #[error("Metadata fetch for '{endpoint}' timed out after {after:?}")]
    Timeout { endpoint: EndpointId, after: Duration },

    #[error("Metadata resolution for '{endpoint}' was canceled")]
    Canceled { endpoint: EndpointId },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a lookup miss for the given kind of schema element.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Build an invalid-argument error with the offending input and reason.
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch(endpoint: &EndpointId, source: impl Into<BoxError>) -> Self {
        Self::Fetch {
            endpoint: endpoint.clone(),
            source: source.into(),
        }
    }

    pub fn parse(endpoint: &EndpointId, source: odata_edm::Error) -> Self {
        Self::Parse {
            endpoint: endpoint.clone(),
            source,
        }
    }

    /// Whether this is a lookup miss callers are expected to branch on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
