//! Metadata sources
//!
//! A [`ResolvedSchema`](crate::ResolvedSchema) obtains its document through
//! exactly one [`FetchStrategy`], chosen when the schema is constructed.

use crate::BoxError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use odata_edm::{ParsedSchema, SchemaParser};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Async function producing a raw metadata document
pub type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<String, BoxError>> + Send + Sync>;

/// Where a schema's metadata document comes from
#[derive(Clone)]
pub enum FetchStrategy {
    /// Document supplied up front; resolution commits it without I/O
    Document(Arc<str>),
    /// Caller-supplied async function returning the raw document
    Function(FetchFn),
    /// Live provider yielding the document and provider metadata from one request
    Provider(Arc<dyn MetadataProvider>),
}

impl FetchStrategy {
    /// Short label used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FetchStrategy::Document(_) => "document",
            FetchStrategy::Function(_) => "function",
            FetchStrategy::Provider(_) => "provider",
        }
    }
}

impl fmt::Debug for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStrategy::Document(doc) => f
                .debug_struct("Document")
                .field("len", &doc.len())
                .finish(),
            FetchStrategy::Function(_) => f.write_str("Function"),
            FetchStrategy::Provider(_) => f.write_str("Provider"),
        }
    }
}

/// Raw response to a `$metadata` request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SchemaResponse {
    /// Successful response with the given body
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder method to add a response header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Provider-specific metadata extracted from a schema response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Protocol version reported by the service, if any
    pub protocol_version: Option<String>,
    /// Structured form of the metadata document
    pub document: serde_json::Value,
}

/// A live metadata provider.
///
/// One [`send_schema_request`](Self::send_schema_request) round trip feeds all
/// three extraction steps. The default extractors treat the response body as
/// JSON and hand it to the schema's configured [`SchemaParser`].
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Issue the metadata request. Implementations should stop early when
    /// `cancel` fires; the caller also abandons the request at that point.
    async fn send_schema_request(&self, cancel: CancellationToken) -> Result<SchemaResponse, BoxError>;

    /// Raw textual form of the metadata document
    fn schema_as_string(&self, response: &SchemaResponse) -> Result<String, BoxError> {
        Ok(response.body.clone())
    }

    /// Structured provider metadata for the response
    fn provider_metadata(&self, response: &SchemaResponse) -> Result<ProviderMetadata, BoxError> {
        let document: serde_json::Value = serde_json::from_str(&response.body)?;
        let protocol_version = response
            .header("OData-Version")
            .or_else(|| document.get("$Version").and_then(serde_json::Value::as_str))
            .map(str::to_string);
        Ok(ProviderMetadata {
            protocol_version,
            document,
        })
    }

    /// Parsed schema built from the provider metadata using `parser`
    fn parsed_schema(
        &self,
        metadata: &ProviderMetadata,
        parser: &dyn SchemaParser,
    ) -> odata_edm::Result<ParsedSchema> {
        parser.parse_json(&metadata.document)
    }
}
