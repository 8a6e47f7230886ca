//! # odata-edm
//!
//! Entity data model for OData service metadata.
//!
//! This crate turns a raw metadata document into a [`ParsedSchema`]: the
//! namespaces, entity types, complex types and entity container a service
//! publishes. Parsing sits behind the [`SchemaParser`] trait so callers can
//! plug in other document formats; [`CsdlJsonParser`] handles the CSDL JSON
//! representation.

pub mod csdl;
pub mod inheritance;
pub mod model;
pub mod naming;

pub use csdl::{CsdlJsonParser, SchemaParser};
pub use model::{
    ComplexTypeDef, EntityContainerDef, EntitySetDef, EntityTypeDef, NavigationPropertyDef,
    ParsedSchema, PropertyDef, SchemaNamespace,
};
pub use naming::NameMatching;

use thiserror::Error;

/// Errors that can occur when parsing or walking a schema
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid metadata format: {0}")]
    InvalidFormat(String),

    #[error("Missing {element} in {context}")]
    MissingElement { element: String, context: String },

    #[error("Unknown type '{name}' referenced by {referenced_by}")]
    UnknownType { name: String, referenced_by: String },

    #[error("Inheritance error: {0}")]
    Inheritance(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a missing-element error with the enclosing element as context.
    pub fn missing(element: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingElement {
            element: element.into(),
            context: context.into(),
        }
    }

    /// Build an unknown-type error naming the referencing element.
    pub fn unknown_type(name: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Self::UnknownType {
            name: name.into(),
            referenced_by: referenced_by.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
