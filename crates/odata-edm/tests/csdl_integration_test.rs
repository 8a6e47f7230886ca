use odata_edm::inheritance::{derived_types, effective_keys};
use odata_edm::{CsdlJsonParser, NameMatching, SchemaParser};

const TRIPPIN: &str = include_str!("data/trippin.json");

#[test]
fn test_parse_trippin_document() {
    let schema = CsdlJsonParser::new().parse(TRIPPIN).unwrap();

    assert_eq!(schema.version, "4.0");
    assert_eq!(schema.entity_types().count(), 5);
    assert_eq!(schema.complex_types().count(), 2);

    let container = schema.container.as_ref().unwrap();
    assert_eq!(container.name, "Trippin.Container");

    let mut sets: Vec<&str> = schema.entity_sets().iter().map(|s| s.name.as_str()).collect();
    sets.sort_unstable();
    assert_eq!(sets, vec!["Airlines", "People", "Trips"]);
}

#[test]
fn test_polymorphic_people_hierarchy() {
    let schema = CsdlJsonParser::new().parse(TRIPPIN).unwrap();
    let person = schema.entity_type("tp.Person").unwrap();

    let mut derived: Vec<&str> = derived_types(&schema, person)
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    derived.sort_unstable();
    assert_eq!(derived, vec!["Employee", "Manager"]);

    let manager = schema.entity_type("Trippin.Manager").unwrap();
    let keys = effective_keys(&schema, manager).unwrap();
    assert_eq!(keys.to_vec(), vec!["UserName".to_string()]);
}

#[test]
fn test_lookup_by_simple_name() {
    let schema = CsdlJsonParser::new().parse(TRIPPIN).unwrap();

    let trip = schema
        .find_entity_type("trip", NameMatching::CaseInsensitive)
        .unwrap();
    assert_eq!(trip.qualified_name(), "Trippin.Trip");

    let city = schema
        .find_complex_type("tp.City", NameMatching::Exact)
        .unwrap();
    assert_eq!(city.properties.len(), 3);
}

#[test]
fn test_parse_value_matches_parse() -> anyhow::Result<()> {
    let parser = CsdlJsonParser::new();
    let value: serde_json::Value = serde_json::from_str(TRIPPIN)?;
    assert_eq!(parser.parse_value(&value)?, parser.parse(TRIPPIN)?);
    Ok(())
}
