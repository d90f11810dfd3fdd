use super::*;
use serde_json::json;

fn bindings(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_string_substitution_quotes() {
    let sql = substitute_variables(
        "SELECT * FROM t WHERE d >= $start_date",
        &bindings(&[("start_date", json!("2024-01-01"))]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE d >= '2024-01-01'");
}

#[test]
fn test_numeric_and_bool_substitution() {
    let sql = substitute_variables(
        "SELECT $n, $f, $yes, $no",
        &bindings(&[
            ("n", json!(42)),
            ("f", json!(2.5)),
            ("yes", json!(true)),
            ("no", json!(false)),
        ]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT 42, 2.5, TRUE, FALSE");
}

#[test]
fn test_null_substitution() {
    let sql = substitute_variables(
        "SELECT $maybe",
        &bindings(&[("maybe", Value::Null)]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT NULL");
}

#[test]
fn test_quote_escaping() {
    let sql = substitute_variables(
        "SELECT $s",
        &bindings(&[("s", json!("o'clock"))]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT 'o''clock'");
}

#[test]
fn test_repeated_variable_single_pass() {
    let sql = substitute_variables(
        "SELECT $x WHERE a = $x OR b = $x",
        &bindings(&[("x", json!(1))]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT 1 WHERE a = 1 OR b = 1");
}

#[test]
fn test_substituted_value_not_rescanned() {
    // A value containing a $token must not trigger a second substitution
    let sql = substitute_variables(
        "SELECT $a",
        &bindings(&[("a", json!("$b")), ("b", json!("nope"))]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT '$b'");
}

#[test]
fn test_missing_variable_is_error() {
    let err = substitute_variables("SELECT $ghost", &BTreeMap::new(), "silver.m").unwrap_err();
    match err {
        ExecError::MissingVariable { name, model } => {
            assert_eq!(name, "ghost");
            assert_eq!(model, "silver.m");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_variable_name_boundaries() {
    let sql = substitute_variables(
        "SELECT $var, $var2",
        &bindings(&[("var", json!(1)), ("var2", json!(2))]),
        "m",
    )
    .unwrap();
    assert_eq!(sql, "SELECT 1, 2");
}

#[test]
fn test_no_variables_passthrough() {
    let sql = substitute_variables("SELECT 1", &BTreeMap::new(), "m").unwrap();
    assert_eq!(sql, "SELECT 1");
}

#[test]
fn test_validate_declared() {
    let declared = vec!["start".to_string(), "end".to_string()];
    let err = validate_declared(&declared, &bindings(&[("start", json!(1))]), "m").unwrap_err();
    assert!(matches!(err, ExecError::MissingVariable { name, .. } if name == "end"));

    validate_declared(
        &declared,
        &bindings(&[("start", json!(1)), ("end", json!(2))]),
        "m",
    )
    .unwrap();
}

#[test]
fn test_format_value_variants() {
    assert_eq!(format_value(&json!("a")), "'a'");
    assert_eq!(format_value(&json!(3)), "3");
    assert_eq!(format_value(&Value::Null), "NULL");
    assert_eq!(format_value(&json!(["x"])), "'[\"x\"]'");
}
