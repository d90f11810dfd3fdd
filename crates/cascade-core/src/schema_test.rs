use super::*;

const SCHEMA_YML: &str = r#"
models:
  - name: silver.orders
    description: Cleaned order facts
    config:
      materialized: table
    columns:
      - name: order_id
        description: Primary key
        tests:
          - not_null
          - unique
      - name: status
        tests:
          - accepted_values:
              values: [open, shipped, cancelled]
    tests:
      - not_null
"#;

fn load() -> SchemaFile {
    serde_yaml::from_str(SCHEMA_YML).unwrap()
}

#[test]
fn test_parse_schema_file() {
    let file = load();
    assert_eq!(file.models.len(), 1);
    let model = &file.models[0];
    assert_eq!(model.name, "silver.orders");
    assert_eq!(model.config.get("materialized").unwrap(), "table");
    assert_eq!(model.columns.len(), 2);
}

#[test]
fn test_extract_tests() {
    let file = load();
    let name = ModelName::new("silver.orders");
    let tests = file.models[0].extract_tests(&name);

    // model-level not_null + two column tests on order_id + accepted_values
    assert_eq!(tests.len(), 4);

    let unique = tests
        .iter()
        .find(|t| t.kind == TestKind::Unique)
        .expect("unique test present");
    assert_eq!(unique.column.as_deref(), Some("order_id"));

    let accepted = tests
        .iter()
        .find(|t| t.kind == TestKind::AcceptedValues)
        .expect("accepted_values test present");
    assert_eq!(accepted.values, vec!["open", "shipped", "cancelled"]);
}

#[test]
fn test_unknown_tests_skipped() {
    let yaml = r#"
models:
  - name: a
    columns:
      - name: c
        tests:
          - relationships
          - not_null
"#;
    let file: SchemaFile = serde_yaml::from_str(yaml).unwrap();
    let tests = file.models[0].extract_tests(&ModelName::new("a"));
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].kind, TestKind::NotNull);
}

#[test]
fn test_not_null_sql() {
    let test = SchemaTest {
        kind: TestKind::NotNull,
        model: ModelName::new("silver.orders"),
        column: Some("order_id".to_string()),
        values: vec![],
    };
    let sql = test.to_sql("DB.SILVER.orders");
    assert_eq!(
        sql,
        "SELECT COUNT(*) AS failures FROM DB.SILVER.orders WHERE order_id IS NULL"
    );
}

#[test]
fn test_unique_sql() {
    let test = SchemaTest {
        kind: TestKind::Unique,
        model: ModelName::new("silver.orders"),
        column: Some("order_id".to_string()),
        values: vec![],
    };
    let sql = test.to_sql("DB.SILVER.orders");
    assert!(sql.contains("GROUP BY order_id"));
    assert!(sql.contains("HAVING COUNT(*) > 1"));
}

#[test]
fn test_accepted_values_sql_escapes_quotes() {
    let test = SchemaTest {
        kind: TestKind::AcceptedValues,
        model: ModelName::new("silver.orders"),
        column: Some("status".to_string()),
        values: vec!["it's".to_string()],
    };
    let sql = test.to_sql("T");
    assert!(sql.contains("'it''s'"));
}

#[test]
fn test_display_name() {
    let test = SchemaTest {
        kind: TestKind::NotNull,
        model: ModelName::new("silver.orders"),
        column: Some("order_id".to_string()),
        values: vec![],
    };
    assert_eq!(test.display_name(), "not_null(silver.orders.order_id)");
}
