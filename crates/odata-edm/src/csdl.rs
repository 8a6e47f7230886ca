//! CSDL JSON metadata parser
//!
//! A CSDL JSON document is a single object. Members starting with `$` are
//! document keywords (`$Version`, `$EntityContainer`), members starting with
//! `@` are annotations, and every other member is a schema namespace whose
//! own members are the schema elements, discriminated by `$Kind`.

use crate::inheritance::InheritanceGraph;
use crate::model::{
    ComplexTypeDef, EntityContainerDef, EntitySetDef, EntityTypeDef, NavigationPropertyDef,
    ParsedSchema, PropertyDef, SchemaNamespace,
};
use crate::{Error, Result};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Turns a raw metadata document into a [`ParsedSchema`].
pub trait SchemaParser: Send + Sync {
    fn parse(&self, document: &str) -> Result<ParsedSchema>;

    /// Parse a document that has already been deserialized to JSON
    fn parse_json(&self, document: &Value) -> Result<ParsedSchema> {
        self.parse(&document.to_string())
    }
}

const DEFAULT_PROPERTY_TYPE: &str = "Edm.String";

/// Parser for the OData CSDL JSON format
#[derive(Debug, Clone, Copy, Default)]
pub struct CsdlJsonParser;

impl CsdlJsonParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an already-deserialized CSDL JSON document
    pub fn parse_value(&self, document: &Value) -> Result<ParsedSchema> {
        let root = document
            .as_object()
            .ok_or_else(|| Error::InvalidFormat("metadata document is not a JSON object".to_string()))?;

        let version = root
            .get("$Version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::missing("$Version", "metadata document"))?;

        let mut schema = ParsedSchema::new(version);
        let mut container: Option<(String, Map<String, Value>)> = None;

        for (namespace, members) in root.iter().filter(|(k, _)| is_element_name(k)) {
            let members = members.as_object().ok_or_else(|| {
                Error::InvalidFormat(format!("schema '{}' is not a JSON object", namespace))
            })?;
            let (parsed, found) = self.parse_namespace(namespace, members)?;
            if let Some(found) = found {
                container = Some(found);
            }
            schema.namespaces.push(parsed);
        }

        // `$EntityContainer` names the container when several namespaces declare one.
        if let Some(declared) = root.get("$EntityContainer").and_then(Value::as_str) {
            let declared = schema.normalize_type_name(declared);
            let found_declared = container
                .as_ref()
                .is_some_and(|(name, _)| schema.normalize_type_name(name) == declared);
            if !found_declared {
                container = self.find_container(root, &declared);
            }
            if container.is_none() {
                return Err(Error::missing(format!("entity container '{}'", declared), "metadata document"));
            }
        }

        if let Some((name, members)) = container {
            schema.container = Some(self.parse_container(&schema, &name, &members)?);
        }

        if let Some(cyclic) = InheritanceGraph::from_schema(&schema).find_cycle() {
            return Err(Error::Inheritance(format!(
                "Circular base type chain involving {}",
                cyclic
            )));
        }

        debug!(
            version = %schema.version,
            namespaces = schema.namespaces.len(),
            entity_sets = schema.entity_sets().len(),
            "Parsed CSDL JSON metadata"
        );

        Ok(schema)
    }

    fn parse_namespace(
        &self,
        namespace: &str,
        members: &Map<String, Value>,
    ) -> Result<(SchemaNamespace, Option<(String, Map<String, Value>)>)> {
        let mut parsed = SchemaNamespace::new(namespace);
        parsed.alias = members.get("$Alias").and_then(Value::as_str).map(str::to_string);
        let mut container = None;

        for (name, element) in members.iter().filter(|(k, _)| is_element_name(k)) {
            let Some(element) = element.as_object() else {
                // Arrays hold overloaded actions and functions.
                continue;
            };
            match element.get("$Kind").and_then(Value::as_str) {
                Some("EntityType") => {
                    trace!("Parsing entity type {}.{}", namespace, name);
                    parsed.entity_types.push(self.parse_entity_type(namespace, name, element)?);
                }
                Some("ComplexType") => {
                    trace!("Parsing complex type {}.{}", namespace, name);
                    parsed.complex_types.push(self.parse_complex_type(namespace, name, element));
                }
                Some("EntityContainer") => {
                    container = Some((format!("{}.{}", namespace, name), element.clone()));
                }
                _ => {}
            }
        }

        Ok((parsed, container))
    }

    fn find_container(
        &self,
        root: &Map<String, Value>,
        qualified: &str,
    ) -> Option<(String, Map<String, Value>)> {
        let (namespace, name) = qualified.rsplit_once('.')?;
        let element = root.get(namespace)?.get(name)?.as_object()?;
        (element.get("$Kind").and_then(Value::as_str) == Some("EntityContainer"))
            .then(|| (qualified.to_string(), element.clone()))
    }

    fn parse_entity_type(
        &self,
        namespace: &str,
        name: &str,
        element: &Map<String, Value>,
    ) -> Result<EntityTypeDef> {
        let mut ty = EntityTypeDef::new(namespace, name);
        ty.base_type = element.get("$BaseType").and_then(Value::as_str).map(str::to_string);
        ty.is_abstract = flag(element, "$Abstract", false);

        if let Some(keys) = element.get("$Key") {
            let keys = keys.as_array().ok_or_else(|| {
                Error::InvalidFormat(format!("$Key of {}.{} is not an array", namespace, name))
            })?;
            for key in keys {
                ty.keys.push(parse_key_ref(key).ok_or_else(|| {
                    Error::InvalidFormat(format!("Invalid key reference in {}.{}", namespace, name))
                })?);
            }
        }

        for (member, value) in element.iter().filter(|(k, _)| is_element_name(k)) {
            let Some(value) = value.as_object() else {
                continue;
            };
            match value.get("$Kind").and_then(Value::as_str) {
                None | Some("Property") => ty.properties.push(parse_property(member, value)),
                Some("NavigationProperty") => {
                    let target = value
                        .get("$Type")
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::missing("$Type", format!("{}.{}/{}", namespace, name, member)))?;
                    let mut nav = NavigationPropertyDef::new(member.as_str(), target)
                        .collection(flag(value, "$Collection", false));
                    nav.nullable = flag(value, "$Nullable", !nav.is_collection);
                    ty.navigation_properties.push(nav);
                }
                _ => {}
            }
        }

        Ok(ty)
    }

    fn parse_complex_type(
        &self,
        namespace: &str,
        name: &str,
        element: &Map<String, Value>,
    ) -> ComplexTypeDef {
        let mut ty = ComplexTypeDef::new(namespace, name);
        ty.base_type = element.get("$BaseType").and_then(Value::as_str).map(str::to_string);
        ty.is_abstract = flag(element, "$Abstract", false);
        ty.properties = element
            .iter()
            .filter(|(k, _)| is_element_name(k))
            .filter_map(|(member, value)| {
                let value = value.as_object()?;
                matches!(value.get("$Kind").and_then(Value::as_str), None | Some("Property"))
                    .then(|| parse_property(member, value))
            })
            .collect();
        ty
    }

    fn parse_container(
        &self,
        schema: &ParsedSchema,
        name: &str,
        members: &Map<String, Value>,
    ) -> Result<EntityContainerDef> {
        let mut container = EntityContainerDef::new(name);

        for (member, value) in members.iter().filter(|(k, _)| is_element_name(k)) {
            let Some(value) = value.as_object() else {
                continue;
            };
            // Entity sets are the container members with `$Collection: true`;
            // singletons and imports are skipped.
            if !flag(value, "$Collection", false) {
                continue;
            }
            let entity_type = value
                .get("$Type")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::missing("$Type", format!("entity set '{}'", member)))?;
            let entity_type = schema.normalize_type_name(entity_type);
            if schema.entity_type(&entity_type).is_none() {
                return Err(Error::unknown_type(entity_type, format!("entity set '{}'", member)));
            }
            container.entity_sets.push(EntitySetDef {
                name: member.clone(),
                entity_type,
            });
        }

        Ok(container)
    }
}

impl SchemaParser for CsdlJsonParser {
    fn parse(&self, document: &str) -> Result<ParsedSchema> {
        let value: Value = serde_json::from_str(document)?;
        self.parse_value(&value)
    }

    fn parse_json(&self, document: &Value) -> Result<ParsedSchema> {
        self.parse_value(document)
    }
}

fn is_element_name(name: &str) -> bool {
    !name.starts_with('$') && !name.starts_with('@')
}

fn flag(element: &Map<String, Value>, keyword: &str, default: bool) -> bool {
    element.get(keyword).and_then(Value::as_bool).unwrap_or(default)
}

// Keys are either property names or single-member `{ "alias": "path" }` objects.
fn parse_key_ref(key: &Value) -> Option<String> {
    match key {
        Value::String(name) => Some(name.clone()),
        Value::Object(aliased) if aliased.len() == 1 => {
            aliased.values().next().and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    }
}

fn parse_property(name: &str, value: &Map<String, Value>) -> PropertyDef {
    let type_name = value
        .get("$Type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROPERTY_TYPE);
    PropertyDef::new(name, type_name)
        .nullable(flag(value, "$Nullable", false))
        .collection(flag(value, "$Collection", false))
}
