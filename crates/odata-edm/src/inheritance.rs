//! Entity type inheritance walks

use crate::model::{EntityTypeDef, ParsedSchema};
use crate::{Error, Result};
use std::collections::HashSet;

/// Tracks base-type edges to detect cycles
pub struct InheritanceGraph {
    edges: Vec<(String, String)>, // (derived, base)
}

impl InheritanceGraph {
    pub fn new() -> Self {
        Self { edges: Vec::new() }
    }

    /// Build the graph from every entity and complex type in a schema
    pub fn from_schema(schema: &ParsedSchema) -> Self {
        let mut graph = Self::new();
        for ty in schema.entity_types() {
            if let Some(base) = &ty.base_type {
                graph.add_edge(ty.qualified_name(), schema.normalize_type_name(base));
            }
        }
        for ty in schema.complex_types() {
            if let Some(base) = &ty.base_type {
                graph.add_edge(ty.qualified_name(), schema.normalize_type_name(base));
            }
        }
        graph
    }

    pub fn add_edge(&mut self, derived: impl Into<String>, base: impl Into<String>) {
        self.edges.push((derived.into(), base.into()));
    }

    /// Detect if adding this edge would create a cycle
    pub fn would_create_cycle(&self, derived: &str, base: &str) -> bool {
        if derived == base {
            return true;
        }

        let mut to_visit = vec![base.to_string()];
        let mut visited = HashSet::new();

        while let Some(current) = to_visit.pop() {
            if current == derived {
                return true;
            }
            if visited.insert(current.clone()) {
                for (d, b) in &self.edges {
                    if d == &current {
                        to_visit.push(b.clone());
                    }
                }
            }
        }

        false
    }

    /// Return the first type found on a cycle, if any
    pub fn find_cycle(&self) -> Option<String> {
        self.edges.iter().find_map(|(derived, base)| {
            let others = Self {
                edges: self
                    .edges
                    .iter()
                    .filter(|(d, _)| d != derived)
                    .cloned()
                    .collect(),
            };
            others
                .would_create_cycle(derived, base)
                .then(|| derived.clone())
        })
    }
}

impl Default for InheritanceGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Entity types deriving from `base`, directly or transitively, in
/// declaration order. `base` itself is not included.
pub fn derived_types<'a>(schema: &'a ParsedSchema, base: &EntityTypeDef) -> Vec<&'a EntityTypeDef> {
    let mut ancestors: HashSet<String> = HashSet::new();
    ancestors.insert(base.qualified_name());

    // Types may be declared before their base, so iterate to a fixed point.
    let mut result: Vec<&EntityTypeDef> = Vec::new();
    loop {
        let before = result.len();
        for ty in schema.entity_types() {
            let qualified = ty.qualified_name();
            if ancestors.contains(&qualified) {
                continue;
            }
            if let Some(parent) = &ty.base_type {
                if ancestors.contains(&schema.normalize_type_name(parent)) {
                    ancestors.insert(qualified);
                    result.push(ty);
                }
            }
        }
        if result.len() == before {
            break;
        }
    }

    let order: Vec<String> = schema.entity_types().map(EntityTypeDef::qualified_name).collect();
    result.sort_by_key(|ty| {
        let qualified = ty.qualified_name();
        order.iter().position(|q| *q == qualified)
    });
    result
}

/// Walk from `ty` up to its root base type, `ty` first.
pub(crate) fn base_chain<'a>(schema: &'a ParsedSchema, ty: &'a EntityTypeDef) -> Result<Vec<&'a EntityTypeDef>> {
    let mut chain = vec![ty];
    let mut visited = HashSet::new();
    visited.insert(ty.qualified_name());

    let mut current = ty;
    while let Some(base_name) = &current.base_type {
        let base = schema
            .entity_type(base_name)
            .ok_or_else(|| Error::unknown_type(base_name, current.qualified_name()))?;
        if !visited.insert(base.qualified_name()) {
            return Err(Error::Inheritance(format!(
                "Circular base type chain detected at {}",
                base.qualified_name()
            )));
        }
        chain.push(base);
        current = base;
    }

    Ok(chain)
}

/// Key properties of `ty`, taken from the nearest type in its base chain
/// that declares any.
pub fn effective_keys<'a>(schema: &'a ParsedSchema, ty: &'a EntityTypeDef) -> Result<&'a [String]> {
    Ok(base_chain(schema, ty)?
        .into_iter()
        .find(|t| !t.keys.is_empty())
        .map(|t| t.keys.as_slice())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaNamespace;

    fn hierarchy() -> ParsedSchema {
        // Declared out of order on purpose: Express before its base Shipment.
        ParsedSchema::new("4.0").with_namespace(
            SchemaNamespace::new("Ns")
                .with_entity_type(EntityTypeDef::new("Ns", "Express").with_base_type("Ns.Shipment"))
                .with_entity_type(EntityTypeDef::new("Ns", "Order").with_key("Id"))
                .with_entity_type(EntityTypeDef::new("Ns", "Shipment").with_base_type("Ns.Order"))
                .with_entity_type(EntityTypeDef::new("Ns", "Invoice").with_key("Number")),
        )
    }

    #[test]
    fn test_derived_types_transitive() {
        let schema = hierarchy();
        let order = schema.entity_type("Ns.Order").unwrap();
        let derived: Vec<&str> = derived_types(&schema, order)
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(derived, vec!["Express", "Shipment"]);
    }

    #[test]
    fn test_derived_types_leaf() {
        let schema = hierarchy();
        let invoice = schema.entity_type("Ns.Invoice").unwrap();
        assert!(derived_types(&schema, invoice).is_empty());
    }

    #[test]
    fn test_base_chain_and_keys() {
        let schema = hierarchy();
        let express = schema.entity_type("Ns.Express").unwrap();
        let chain: Vec<&str> = base_chain(&schema, express)
            .unwrap()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(chain, vec!["Express", "Shipment", "Order"]);
        assert_eq!(effective_keys(&schema, express).unwrap().to_vec(), vec!["Id".to_string()]);
    }

    #[test]
    fn test_base_chain_unknown_base() {
        let schema = ParsedSchema::new("4.0").with_namespace(
            SchemaNamespace::new("Ns")
                .with_entity_type(EntityTypeDef::new("Ns", "Orphan").with_base_type("Ns.Missing")),
        );
        let orphan = schema.entity_type("Ns.Orphan").unwrap();
        let err = base_chain(&schema, orphan).unwrap_err();
        assert!(matches!(err, Error::UnknownType { .. }));
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = InheritanceGraph::new();
        graph.add_edge("Ns.A", "Ns.B");
        assert!(graph.would_create_cycle("Ns.B", "Ns.A"));
        assert!(!graph.would_create_cycle("Ns.C", "Ns.A"));
        assert!(graph.find_cycle().is_none());

        graph.add_edge("Ns.B", "Ns.A");
        assert!(graph.find_cycle().is_some());
    }
}
