//! Entity data model definitions

use crate::naming::NameMatching;

/// A parsed metadata document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSchema {
    /// Protocol version declared by the document (e.g. `4.0`)
    pub version: String,
    pub namespaces: Vec<SchemaNamespace>,
    /// The service's entity container, if the document declares one
    pub container: Option<EntityContainerDef>,
}

/// One schema namespace and the types declared in it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNamespace {
    pub namespace: String,
    pub alias: Option<String>,
    pub entity_types: Vec<EntityTypeDef>,
    pub complex_types: Vec<ComplexTypeDef>,
}

/// Definition of an entity type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTypeDef {
    pub namespace: String,
    pub name: String,
    /// Qualified name of the base type
    pub base_type: Option<String>,
    pub is_abstract: bool,
    /// Key property names declared on this type (not inherited ones)
    pub keys: Vec<String>,
    pub properties: Vec<PropertyDef>,
    pub navigation_properties: Vec<NavigationPropertyDef>,
}

/// Definition of a complex (keyless, structural) type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexTypeDef {
    pub namespace: String,
    pub name: String,
    pub base_type: Option<String>,
    pub is_abstract: bool,
    pub properties: Vec<PropertyDef>,
}

/// A structural property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    /// Qualified type name, e.g. `Edm.String`
    pub type_name: String,
    pub nullable: bool,
    pub is_collection: bool,
}

/// A navigation property pointing at another entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPropertyDef {
    pub name: String,
    pub target_type: String,
    pub is_collection: bool,
    pub nullable: bool,
}

/// The entity container exposed by a service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityContainerDef {
    /// Qualified container name
    pub name: String,
    pub entity_sets: Vec<EntitySetDef>,
}

/// A top-level entity set declared in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySetDef {
    pub name: String,
    /// Qualified name of the element entity type
    pub entity_type: String,
}

impl ParsedSchema {
    /// Create an empty schema for the given protocol version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            namespaces: Vec::new(),
            container: None,
        }
    }

    /// Builder method to add a namespace
    pub fn with_namespace(mut self, namespace: SchemaNamespace) -> Self {
        self.namespaces.push(namespace);
        self
    }

    /// Builder method to set the entity container
    pub fn with_container(mut self, container: EntityContainerDef) -> Self {
        self.container = Some(container);
        self
    }

    /// Iterate over every entity type in declaration order
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeDef> {
        self.namespaces.iter().flat_map(|ns| ns.entity_types.iter())
    }

    /// Iterate over every complex type in declaration order
    pub fn complex_types(&self) -> impl Iterator<Item = &ComplexTypeDef> {
        self.namespaces.iter().flat_map(|ns| ns.complex_types.iter())
    }

    /// Entity sets declared by the container, empty when there is none
    pub fn entity_sets(&self) -> &[EntitySetDef] {
        self.container
            .as_ref()
            .map(|c| c.entity_sets.as_slice())
            .unwrap_or_default()
    }

    /// Expand an alias-qualified name (`Alias.Type`) into its namespace form.
    /// Names that don't use a known alias are returned unchanged.
    pub fn normalize_type_name(&self, name: &str) -> String {
        if let Some((prefix, local)) = name.rsplit_once('.') {
            for ns in &self.namespaces {
                if ns.alias.as_deref() == Some(prefix) {
                    return format!("{}.{}", ns.namespace, local);
                }
            }
        }
        name.to_string()
    }

    /// Look up an entity type by qualified name (namespace or alias form).
    pub fn entity_type(&self, qualified_name: &str) -> Option<&EntityTypeDef> {
        let qualified = self.normalize_type_name(qualified_name);
        self.entity_types().find(|t| t.qualified_name() == qualified)
    }

    /// Look up a complex type by qualified name (namespace or alias form).
    pub fn complex_type(&self, qualified_name: &str) -> Option<&ComplexTypeDef> {
        let qualified = self.normalize_type_name(qualified_name);
        self.complex_types().find(|t| t.qualified_name() == qualified)
    }

    /// Find an entity type by simple or qualified name.
    ///
    /// A name containing a dot is tried as a qualified name first.
    pub fn find_entity_type(&self, name: &str, matching: NameMatching) -> Option<&EntityTypeDef> {
        if let Some(found) = self.entity_type(name) {
            return Some(found);
        }
        let types: Vec<&EntityTypeDef> = self.entity_types().collect();
        matching
            .find(&types, name, |t| t.name.as_str())
            .or_else(|| {
                let qualified = self.normalize_type_name(name);
                types
                    .iter()
                    .find(|t| matching.matches(&t.qualified_name(), &qualified))
            })
            .copied()
    }

    /// Find a complex type by simple or qualified name.
    pub fn find_complex_type(&self, name: &str, matching: NameMatching) -> Option<&ComplexTypeDef> {
        if let Some(found) = self.complex_type(name) {
            return Some(found);
        }
        let types: Vec<&ComplexTypeDef> = self.complex_types().collect();
        matching
            .find(&types, name, |t| t.name.as_str())
            .or_else(|| {
                let qualified = self.normalize_type_name(name);
                types
                    .iter()
                    .find(|t| matching.matches(&t.qualified_name(), &qualified))
            })
            .copied()
    }
}

impl SchemaNamespace {
    /// Create an empty namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the namespace alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Builder method to add an entity type
    pub fn with_entity_type(mut self, entity_type: EntityTypeDef) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    /// Builder method to add a complex type
    pub fn with_complex_type(mut self, complex_type: ComplexTypeDef) -> Self {
        self.complex_types.push(complex_type);
        self
    }
}

impl EntityTypeDef {
    /// Create a new entity type definition
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Namespace-qualified name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Builder method to set the base type
    pub fn with_base_type(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = Some(base_type.into());
        self
    }

    /// Builder method to add a key property name
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Builder method to add a structural property
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Builder method to add a navigation property
    pub fn with_navigation(mut self, navigation: NavigationPropertyDef) -> Self {
        self.navigation_properties.push(navigation);
        self
    }

    /// Builder method to mark the type abstract
    pub fn abstract_type(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Find a structural property by name
    pub fn find_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

impl ComplexTypeDef {
    /// Create a new complex type definition
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Namespace-qualified name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Builder method to add a structural property
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }
}

impl PropertyDef {
    /// Create a new non-nullable, single-valued property
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: false,
            is_collection: false,
        }
    }

    /// Builder method to set nullability
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Builder method to mark the property collection-valued
    pub fn collection(mut self, is_collection: bool) -> Self {
        self.is_collection = is_collection;
        self
    }
}

impl NavigationPropertyDef {
    /// Create a new single-valued navigation property
    pub fn new(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            is_collection: false,
            nullable: true,
        }
    }

    /// Builder method to mark the navigation collection-valued
    pub fn collection(mut self, is_collection: bool) -> Self {
        self.is_collection = is_collection;
        self
    }
}

impl EntityContainerDef {
    /// Create an empty container
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_sets: Vec::new(),
        }
    }

    /// Builder method to add an entity set
    pub fn with_entity_set(mut self, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        self.entity_sets.push(EntitySetDef {
            name: name.into(),
            entity_type: entity_type.into(),
        });
        self
    }
}
