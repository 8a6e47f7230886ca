//! Entity sets bound to a resolved schema

use crate::endpoint::EndpointId;
use crate::{Error, Result};
use odata_edm::inheritance::{derived_types, effective_keys};
use odata_edm::{EntityTypeDef, NameMatching, ParsedSchema};
use std::sync::Arc;
use tracing::trace;

/// A named, queryable collection of entities.
///
/// Top-level sets come from the entity container. Each carries its derived
/// sets: one per entity type inheriting (directly or transitively) from the
/// set's element type, addressed as `Base/Derived`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    endpoint: EndpointId,
    name: String,
    entity_type: Arc<EntityTypeDef>,
    keys: Arc<[String]>,
    parent: Option<String>,
    derived: Arc<[EntitySet]>,
    matching: NameMatching,
}

impl EntitySet {
    /// Endpoint of the schema this set belongs to
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &EntityTypeDef {
        &self.entity_type
    }

    /// Key properties, inherited from the nearest base type declaring any
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Name of the base set for a derived set
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_derived(&self) -> bool {
        self.parent.is_some()
    }

    /// Path form: `Name` for top-level sets, `Parent/Name` for derived ones
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}/{}", parent, self.name),
            None => self.name.clone(),
        }
    }

    pub fn derived_sets(&self) -> &[EntitySet] {
        &self.derived
    }

    /// Find a derived set by type name, simple or namespace-qualified.
    pub fn find_derived(&self, name: &str) -> Option<&EntitySet> {
        self.matching
            .find(&self.derived[..], name, |set| set.name.as_str())
            .or_else(|| {
                self.derived
                    .iter()
                    .find(|set| self.matching.matches(&set.entity_type.qualified_name(), name))
            })
    }
}

/// The entity sets a schema exposes
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySetCollection {
    sets: Vec<EntitySet>,
    matching: NameMatching,
}

impl EntitySetCollection {
    /// Build the collection from the container of a parsed schema
    pub fn build(endpoint: &EndpointId, schema: &ParsedSchema, matching: NameMatching) -> Result<Self> {
        let mut sets = Vec::with_capacity(schema.entity_sets().len());

        for def in schema.entity_sets() {
            let element = schema.entity_type(&def.entity_type).ok_or_else(|| {
                Error::parse(
                    endpoint,
                    odata_edm::Error::unknown_type(&def.entity_type, format!("entity set '{}'", def.name)),
                )
            })?;

            let keys = |ty: &EntityTypeDef| -> Result<Arc<[String]>> {
                effective_keys(schema, ty)
                    .map(Arc::<[String]>::from)
                    .map_err(|e| Error::parse(endpoint, e))
            };

            let derived = derived_types(schema, element)
                .into_iter()
                .map(|ty| {
                    Ok(EntitySet {
                        endpoint: endpoint.clone(),
                        name: ty.name.clone(),
                        entity_type: Arc::new(ty.clone()),
                        keys: keys(ty)?,
                        parent: Some(def.name.clone()),
                        derived: Arc::from(Vec::new()),
                        matching,
                    })
                })
                .collect::<Result<Vec<EntitySet>>>()?;

            sets.push(EntitySet {
                endpoint: endpoint.clone(),
                name: def.name.clone(),
                entity_type: Arc::new(element.clone()),
                keys: keys(element)?,
                parent: None,
                derived: Arc::from(derived),
                matching,
            });
        }

        Ok(Self { sets, matching })
    }

    /// Find a top-level entity set by name
    pub fn find(&self, name: &str) -> Option<&EntitySet> {
        trace!("Looking up entity set: {}", name);
        self.matching.find(&self.sets, name, |set| set.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySet> {
        self.sets.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|set| set.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl<'a> IntoIterator for &'a EntitySetCollection {
    type Item = &'a EntitySet;
    type IntoIter = std::slice::Iter<'a, EntitySet>;

    fn into_iter(self) -> Self::IntoIter {
        self.sets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_edm::{EntityContainerDef, SchemaNamespace};

    fn schema() -> ParsedSchema {
        ParsedSchema::new("4.0")
            .with_namespace(
                SchemaNamespace::new("Ns")
                    .with_entity_type(EntityTypeDef::new("Ns", "Order").with_key("Id"))
                    .with_entity_type(EntityTypeDef::new("Ns", "RushOrder").with_base_type("Ns.Order"))
                    .with_entity_type(EntityTypeDef::new("Ns", "Customer").with_key("Id")),
            )
            .with_container(
                EntityContainerDef::new("Ns.Container")
                    .with_entity_set("Orders", "Ns.Order")
                    .with_entity_set("Customers", "Ns.Customer"),
            )
    }

    #[test]
    fn test_build_collection() {
        let endpoint = EndpointId::from("svc");
        let sets = EntitySetCollection::build(&endpoint, &schema(), NameMatching::Exact).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets.names().collect::<Vec<_>>(), vec!["Orders", "Customers"]);

        let orders = sets.find("Orders").unwrap();
        assert_eq!(orders.endpoint(), &endpoint);
        assert_eq!(orders.entity_type().name, "Order");
        assert!(!orders.is_derived());
        assert_eq!(orders.derived_sets().len(), 1);
    }

    #[test]
    fn test_derived_set() {
        let sets =
            EntitySetCollection::build(&EndpointId::from("svc"), &schema(), NameMatching::CaseInsensitive)
                .unwrap();
        let orders = sets.find("orders").unwrap();

        let rush = orders.find_derived("RushOrder").unwrap();
        assert_eq!(rush.parent(), Some("Orders"));
        assert_eq!(rush.qualified_name(), "Orders/RushOrder");
        assert_eq!(rush.keys().to_vec(), vec!["Id".to_string()]);
        assert_eq!(orders.keys().to_vec(), vec!["Id".to_string()]);
        assert_eq!(orders.find_derived("Ns.RushOrder"), Some(rush));
        assert!(orders.find_derived("Customer").is_none());
    }

    #[test]
    fn test_unknown_element_type() {
        let schema = ParsedSchema::new("4.0")
            .with_container(EntityContainerDef::new("Ns.Container").with_entity_set("Ghosts", "Ns.Ghost"));
        let result = EntitySetCollection::build(&EndpointId::from("svc"), &schema, NameMatching::Exact);
        assert!(matches!(result, Err(Error::Parse { .. })));
    }
}
