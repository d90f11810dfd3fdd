use super::*;
use crate::config::Materialization;
use std::path::Path;

fn parsed_for(registry: &ModelRegistry, name: &str) -> ParsedModel {
    let model = registry.get(name).unwrap();
    ParsedModel {
        name: model.name.clone(),
        fingerprint: model.fingerprint.clone(),
        expanded_sql: model.raw_sql.clone(),
        depends_on: Default::default(),
        sources: Default::default(),
        variables: Default::default(),
        config: model.config.clone(),
        lineage: Default::default(),
        warnings: vec![],
    }
}

#[test]
fn test_name_from_path() {
    assert_eq!(
        ModelRegistry::model_name_from_path(Path::new("silver/cleaned_orders.sql")).unwrap(),
        "silver.cleaned_orders"
    );
    assert_eq!(
        ModelRegistry::model_name_from_path(Path::new("orders.sql")).unwrap(),
        "orders"
    );
    assert_eq!(
        ModelRegistry::model_name_from_path(Path::new("gold/sales/daily.sql")).unwrap(),
        "gold.sales.daily"
    );
}

#[test]
fn test_register_and_get() {
    let mut registry = ModelRegistry::new();
    let name = registry
        .register(Path::new("silver/a.sql"), "-- config: materialized=table\nSELECT 1")
        .unwrap();
    assert_eq!(name, "silver.a");

    let model = registry.get("silver.a").unwrap();
    assert_eq!(model.config.materialized, Materialization::Table);
    assert!(!model.fingerprint.is_empty());
}

#[test]
fn test_register_empty_sql_rejected() {
    let mut registry = ModelRegistry::new();
    let err = registry.register(Path::new("a.sql"), "   \n").unwrap_err();
    assert!(matches!(err, CoreError::ModelRegistration { .. }));
}

#[test]
fn test_register_invalid_config_leaves_registry_unchanged() {
    let mut registry = ModelRegistry::new();
    registry.register(Path::new("a.sql"), "SELECT 1").unwrap();
    let before = registry.get("a").unwrap().fingerprint.clone();

    let err = registry
        .register(Path::new("a.sql"), "-- config: materialized=bogus\nSELECT 2")
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));

    // Prior version intact
    assert_eq!(registry.get("a").unwrap().fingerprint, before);
}

#[test]
fn test_reregistration_replaces_and_invalidates_parse() {
    let mut registry = ModelRegistry::new();
    registry.register(Path::new("a.sql"), "SELECT 1").unwrap();
    let parsed = parsed_for(&registry, "a");
    registry.insert_parsed(parsed);
    assert!(registry.parsed("a").is_some());
    assert!(registry.stale().is_empty());

    registry.register(Path::new("a.sql"), "SELECT 2").unwrap();
    assert!(registry.parsed("a").is_none());
    assert_eq!(registry.stale(), vec![ModelName::new("a")]);
}

#[test]
fn test_stale_parsed_insert_ignored() {
    let mut registry = ModelRegistry::new();
    registry.register(Path::new("a.sql"), "SELECT 1").unwrap();
    let mut parsed = parsed_for(&registry, "a");
    parsed.fingerprint = "deadbeef".to_string();
    registry.insert_parsed(parsed);
    assert!(registry.parsed("a").is_none());
}

#[test]
fn test_remove() {
    let mut registry = ModelRegistry::new();
    registry.register(Path::new("a.sql"), "SELECT 1").unwrap();
    assert!(registry.remove("a").is_ok());
    assert!(matches!(
        registry.remove("a"),
        Err(CoreError::ModelNotFound { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_extra_deps_from_header() {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            Path::new("gold/b.sql"),
            "-- depends_on: silver.a, silver.c\nSELECT 1",
        )
        .unwrap();
    let model = registry.get("gold.b").unwrap();
    assert!(model.extra_deps.contains("silver.a"));
    assert!(model.extra_deps.contains("silver.c"));
}

#[test]
fn test_list_sorted() {
    let mut registry = ModelRegistry::new();
    registry.register(Path::new("b.sql"), "SELECT 1").unwrap();
    registry.register(Path::new("a.sql"), "SELECT 1").unwrap();
    let names: Vec<&str> = registry.list().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_load_dir_with_schema() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir_all(models.join("silver")).unwrap();
    std::fs::write(models.join("silver/orders.sql"), "SELECT 1 AS id").unwrap();
    std::fs::write(
        models.join("silver/schema.yml"),
        "models:\n  - name: silver.orders\n    description: orders\n    config:\n      materialized: table\n",
    )
    .unwrap();

    let registry = ModelRegistry::load_dir(&models).unwrap();
    assert_eq!(registry.len(), 1);
    let model = registry.get("silver.orders").unwrap();
    assert_eq!(model.config.materialized, Materialization::Table);
    assert!(model.schema.is_some());
}

#[test]
fn test_load_dir_leaf_schema_match() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir_all(models.join("silver")).unwrap();
    std::fs::write(models.join("silver/orders.sql"), "SELECT 1").unwrap();
    std::fs::write(
        models.join("silver/schema.yml"),
        "models:\n  - name: orders\n    description: by leaf\n",
    )
    .unwrap();

    let registry = ModelRegistry::load_dir(&models).unwrap();
    assert!(registry.get("silver.orders").unwrap().schema.is_some());
}

#[test]
fn test_load_dir_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelRegistry::load_dir(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, CoreError::ProjectNotFound { .. }));
}

#[test]
fn test_comment_config_wins_over_schema_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir_all(&models).unwrap();
    std::fs::write(
        models.join("a.sql"),
        "-- config: materialized=view\nSELECT 1",
    )
    .unwrap();
    std::fs::write(
        models.join("schema.yml"),
        "models:\n  - name: a\n    config:\n      materialized: table\n      unique_key: id\n",
    )
    .unwrap();

    let registry = ModelRegistry::load_dir(&models).unwrap();
    let model = registry.get("a").unwrap();
    // Comment wins on conflict, YAML fills the gaps
    assert_eq!(model.config.materialized, Materialization::View);
    assert_eq!(model.config.unique_key.as_deref(), Some("id"));
}
