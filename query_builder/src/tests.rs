use crate::{
    CompiledQuery, Dialect, FilterExpression, FilterOp, OrderSpec, Pagination, QueryBuilder,
    QueryError, SortOrder, SqlGenerator,
};
use serde_json::{json, Map, Value};

fn compile_where(dialect: Dialect, filter: Value) -> (String, Vec<Value>) {
    let filter = FilterExpression::from_json(&filter).unwrap();
    let compiled = SqlGenerator::compile(
        dialect,
        &filter,
        &OrderSpec::new(),
        &Pagination::unbounded(),
    )
    .unwrap();
    (compiled.where_clause, compiled.params)
}

fn placeholders(sql: &str) -> usize {
    sql.matches('?').count()
}

// ========================================
// Filter DSL
// ========================================

#[test]
fn test_range_with_both_bounds() {
    let (sql, params) = compile_where(Dialect::Sqlite, json!({"age": {"$min": 18, "$max": 30}}));
    assert_eq!(sql, "age BETWEEN ? AND ?");
    assert_eq!(params, vec![json!(18), json!(30)]);
}

#[test]
fn test_range_with_one_bound() {
    let (sql, params) = compile_where(Dialect::MySql, json!({"age": {"$min": 18}}));
    assert_eq!(sql, "age >= ?");
    assert_eq!(params, vec![json!(18)]);

    let (sql, params) = compile_where(Dialect::MySql, json!({"age": {"$max": 30}}));
    assert_eq!(sql, "age <= ?");
    assert_eq!(params, vec![json!(30)]);
}

#[test]
fn test_like_patterns() {
    let (sql, params) = compile_where(Dialect::Sqlite, json!({"name": {"$contains": "ann"}}));
    assert_eq!(sql, "name LIKE ?");
    assert_eq!(params, vec![json!("%ann%")]);

    let (_, params) = compile_where(Dialect::Sqlite, json!({"name": {"$starts_with": "ann"}}));
    assert_eq!(params, vec![json!("ann%")]);

    let (_, params) = compile_where(Dialect::Sqlite, json!({"name": {"$ends_with": "ann"}}));
    assert_eq!(params, vec![json!("%ann")]);
}

#[test]
fn test_scalar_comparisons() {
    let cases = [
        (json!({"a": 5}), "a = ?"),
        (json!({"a": "x"}), "a = ?"),
        (json!({"a": {"$not": 5}}), "a != ?"),
        (json!({"a": {"$gt": 5}}), "a > ?"),
        (json!({"a": {"$gte": 5}}), "a >= ?"),
        (json!({"a": {"$lt": 5}}), "a < ?"),
        (json!({"a": {"$lte": 5}}), "a <= ?"),
    ];

    for (filter, expected) in cases {
        let (sql, params) = compile_where(Dialect::Sqlite, filter);
        assert_eq!(sql, expected);
        assert_eq!(params.len(), 1);
    }
}

#[test]
fn test_one_placeholder_per_single_operand() {
    let filters = [
        json!({"a": 1}),
        json!({"a": {"$contains": "x"}}),
        json!({"a": {"$starts_with": "x"}}),
        json!({"a": {"$ends_with": "x"}}),
        json!({"a": {"$min": 1}}),
        json!({"a": {"$max": 1}}),
        json!({"a": {"$not": 1}}),
        json!({"a": {"$gt": 1}}),
        json!({"a": {"$gte": 1}}),
        json!({"a": {"$lt": 1}}),
        json!({"a": {"$lte": 1}}),
    ];

    for filter in filters {
        let (sql, params) = compile_where(Dialect::MySql, filter.clone());
        assert_eq!(placeholders(&sql), 1, "filter {}", filter);
        assert_eq!(params.len(), 1, "filter {}", filter);
    }

    let (sql, params) = compile_where(Dialect::MySql, json!({"a": {"$min": 1, "$max": 2}}));
    assert_eq!(placeholders(&sql), 2);
    assert_eq!(params.len(), 2);
}

#[test]
fn test_in_lists_bind_every_element() {
    let (sql, params) = compile_where(Dialect::Sqlite, json!({"id": {"$in": [1, 2, 3]}}));
    assert_eq!(sql, "id IN (?,?,?)");
    assert_eq!(params, vec![json!(1), json!(2), json!(3)]);

    let (sql, params) = compile_where(Dialect::Sqlite, json!({"id": {"$not_in": ["a", "b"]}}));
    assert_eq!(sql, "id NOT IN (?,?)");
    assert_eq!(params.len(), 2);

    let (sql, _) = compile_where(Dialect::Postgres, json!({"id": {"$in": [1, 2]}}));
    assert_eq!(sql, "id IN ($1,$2)");
}

#[test]
fn test_empty_in_lists() {
    let (sql, params) = compile_where(Dialect::Sqlite, json!({"id": {"$in": []}}));
    assert_eq!(sql, "1=0");
    assert!(params.is_empty());

    let (sql, params) = compile_where(Dialect::Sqlite, json!({"id": {"$not_in": []}}));
    assert_eq!(sql, "1=1");
    assert!(params.is_empty());
}

#[test]
fn test_null_checks_bind_nothing() {
    let (sql, params) = compile_where(Dialect::Postgres, json!({"deleted_at": {"$is_null": true}}));
    assert_eq!(sql, "deleted_at IS NULL");
    assert!(params.is_empty());

    let (sql, _) = compile_where(Dialect::Postgres, json!({"deleted_at": {"$is_not_null": 1}}));
    assert_eq!(sql, "deleted_at IS NOT NULL");
}

#[test]
fn test_boolean_scalars_render_literals() {
    let (sql, params) = compile_where(Dialect::Postgres, json!({"active": true}));
    assert_eq!(sql, "active = TRUE");
    assert!(params.is_empty());

    let (sql, _) = compile_where(Dialect::Sqlite, json!({"active": false}));
    assert_eq!(sql, "active = FALSE");

    let (sql, _) = compile_where(Dialect::MsSql, json!({"active": true}));
    assert_eq!(sql, "active = 1");
}

#[test]
fn test_entries_combine_with_and_in_order() {
    let (sql, params) = compile_where(
        Dialect::Postgres,
        json!({"name": {"$contains": "ann"}, "age": {"$min": 18, "$max": 30}, "active": true}),
    );
    assert_eq!(sql, "name LIKE $1 AND age BETWEEN $2 AND $3 AND active = TRUE");
    assert_eq!(params, vec![json!("%ann%"), json!(18), json!(30)]);
}

#[test]
fn test_mssql_placeholders_are_numbered() {
    let (sql, _) = compile_where(Dialect::MsSql, json!({"a": 1, "b": {"$in": [1, 2]}}));
    assert_eq!(sql, "a = @P1 AND b IN (@P2,@P3)");
}

#[test]
fn test_unsupported_operator_is_an_error() {
    let err = FilterExpression::from_json(&json!({"name": {"$regex": "a.*"}})).unwrap_err();
    assert_eq!(
        err,
        QueryError::UnsupportedOperator {
            column: "name".to_string(),
            operator: "$regex".to_string(),
        }
    );
}

#[test]
fn test_malformed_operands() {
    assert!(matches!(
        FilterExpression::from_json(&json!({"a": null})),
        Err(QueryError::InvalidOperand { .. })
    ));
    assert!(matches!(
        FilterExpression::from_json(&json!({"a": [1, 2]})),
        Err(QueryError::InvalidOperand { .. })
    ));
    assert!(matches!(
        FilterExpression::from_json(&json!({"a": {"$in": 5}})),
        Err(QueryError::InvalidOperand { .. })
    ));
    assert!(matches!(
        FilterExpression::from_json(&json!({"a": {"$gt": [1]}})),
        Err(QueryError::InvalidOperand { .. })
    ));
    assert!(matches!(
        FilterExpression::from_json(&json!({"a": {}})),
        Err(QueryError::InvalidOperand { .. })
    ));
    assert!(matches!(
        FilterExpression::from_json(&json!([1, 2])),
        Err(QueryError::InvalidFilter(_))
    ));
}

#[test]
fn test_conflicting_operators() {
    let err = FilterExpression::from_json(&json!({"a": {"$gt": 1, "$contains": "x"}})).unwrap_err();
    assert_eq!(err, QueryError::ConflictingOperators("a".to_string()));
}

#[test]
fn test_empty_range_from_code() {
    let filter = FilterExpression::new().range("age", None, None);
    let err = SqlGenerator::compile(
        Dialect::Sqlite,
        &filter,
        &OrderSpec::new(),
        &Pagination::unbounded(),
    )
    .unwrap_err();
    assert_eq!(err, QueryError::EmptyRange("age".to_string()));
}

#[test]
fn test_param_count_matches_compiled_placeholders() {
    let ops = [
        FilterOp::Equals(json!(1)),
        FilterOp::Bool(true),
        FilterOp::Contains("x".into()),
        FilterOp::Range {
            min: Some(json!(1)),
            max: Some(json!(2)),
        },
        FilterOp::In(vec![json!(1), json!(2), json!(3), json!(4)]),
        FilterOp::IsNull,
    ];

    for op in ops {
        let expected = op.param_count();
        let filter = FilterExpression::new().with("a", op);
        let compiled = SqlGenerator::compile(
            Dialect::Sqlite,
            &filter,
            &OrderSpec::new(),
            &Pagination::unbounded(),
        )
        .unwrap();
        assert_eq!(placeholders(&compiled.where_clause), expected);
        assert_eq!(compiled.params.len(), expected);
    }
}

// ========================================
// Identifiers
// ========================================

#[test]
fn test_column_names_are_quoted_not_concatenated() {
    let (sql, params) = compile_where(
        Dialect::Postgres,
        json!({"name\" = '' OR 1=1 --": "x"}),
    );
    assert_eq!(sql, "\"name\"\" = '' OR 1=1 --\" = $1");
    assert_eq!(params, vec![json!("x")]);

    let (sql, _) = compile_where(Dialect::MySql, json!({"Order": 1}));
    assert_eq!(sql, "`Order` = ?");

    let (sql, _) = compile_where(Dialect::MsSql, json!({"u.Name": 1}));
    assert_eq!(sql, "u.[Name] = @P1");
}

#[test]
fn test_values_never_reach_the_sql_text() {
    let (sql, params) = compile_where(
        Dialect::Sqlite,
        json!({"name": "'; DROP TABLE users; --"}),
    );
    assert_eq!(sql, "name = ?");
    assert_eq!(params, vec![json!("'; DROP TABLE users; --")]);
}

#[test]
fn test_empty_column_name_is_rejected() {
    let filter = FilterExpression::new().eq("", json!(1));
    let err = SqlGenerator::compile(
        Dialect::Sqlite,
        &filter,
        &OrderSpec::new(),
        &Pagination::unbounded(),
    )
    .unwrap_err();
    assert_eq!(err, QueryError::EmptyIdentifier);
}

// ========================================
// Order and pagination
// ========================================

#[test]
fn test_order_clause() {
    let order = OrderSpec::from_json(&json!([["name", "DESC"], ["age", null]])).unwrap();
    assert_eq!(
        SqlGenerator::build_order_clause(Dialect::Sqlite, &order).unwrap(),
        "ORDER BY name DESC, age ASC"
    );
    assert_eq!(
        SqlGenerator::build_order_clause(Dialect::Sqlite, &OrderSpec::new()).unwrap(),
        ""
    );
}

#[test]
fn test_zero_limit_means_no_clause() {
    let compiled = SqlGenerator::compile(
        Dialect::Postgres,
        &FilterExpression::new(),
        &OrderSpec::new(),
        &Pagination::new().with_offset(10).with_limit(0),
    )
    .unwrap();
    assert_eq!(compiled.limit_clause, "");
    assert_eq!(compiled.order_clause, "");

    let query = QueryBuilder::new(Dialect::Postgres, "users")
        .limit(0)
        .build()
        .unwrap();
    assert!(!query.sql.contains("LIMIT"));
    assert!(!query.sql.contains("OFFSET"));
}

#[test]
fn test_mssql_pagination_gets_an_order() {
    let compiled = SqlGenerator::compile(
        Dialect::MsSql,
        &FilterExpression::new(),
        &OrderSpec::new(),
        &Pagination::new().with_offset(20).with_limit(10),
    )
    .unwrap();
    assert_eq!(compiled.order_clause, "ORDER BY (SELECT NULL)");
    assert_eq!(compiled.limit_clause, "OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY");

    let compiled = SqlGenerator::compile(
        Dialect::MsSql,
        &FilterExpression::new(),
        &OrderSpec::new().desc("id"),
        &Pagination::new().with_limit(10),
    )
    .unwrap();
    assert_eq!(compiled.order_clause, "ORDER BY id DESC");
}

// ========================================
// Statements
// ========================================

#[test]
fn test_select_statement() {
    let query = QueryBuilder::new(Dialect::Postgres, "users")
        .schema(Some("public"))
        .filter(FilterExpression::from_json(&json!({"age": {"$gte": 18}})).unwrap())
        .order_by("name", SortOrder::Asc)
        .limit(10)
        .offset(20)
        .build()
        .unwrap();

    assert_eq!(
        query,
        CompiledQuery::new(
            "SELECT * FROM public.users WHERE age >= $1 ORDER BY name ASC LIMIT 10 OFFSET 20"
                .to_string(),
            vec![json!(18)]
        )
    );
}

#[test]
fn test_select_with_alias_and_base_query() {
    let query = QueryBuilder::new(Dialect::Sqlite, "users")
        .alias(Some("u"))
        .where_eq("u.id", json!(7))
        .build()
        .unwrap();
    assert_eq!(query.sql, "SELECT * FROM users AS u WHERE u.id = ?");

    let query = QueryBuilder::new(Dialect::Sqlite, "users")
        .base_query(Some("SELECT u.id, u.name FROM users u "))
        .where_eq("u.id", json!(7))
        .build()
        .unwrap();
    assert_eq!(query.sql, "SELECT u.id, u.name FROM users u WHERE u.id = ?");
}

fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_insert_per_dialect() {
    let data = row(&[("name", json!("ann")), ("age", json!(30))]);

    let pg = SqlGenerator::build_insert(Dialect::Postgres, "users", "id", &data).unwrap();
    assert_eq!(pg.sql, "INSERT INTO users (name, age) VALUES ($1, $2) RETURNING id");
    assert_eq!(pg.params, vec![json!("ann"), json!(30)]);

    let ms = SqlGenerator::build_insert(Dialect::MsSql, "users", "id", &data).unwrap();
    assert_eq!(
        ms.sql,
        "INSERT INTO users (name, age) OUTPUT INSERTED.id VALUES (@P1, @P2)"
    );

    let my = SqlGenerator::build_insert(Dialect::MySql, "users", "id", &data).unwrap();
    assert_eq!(my.sql, "INSERT INTO users (name, age) VALUES (?, ?)");

    assert_eq!(
        SqlGenerator::build_insert(Dialect::MySql, "users", "id", &Map::new()).unwrap_err(),
        QueryError::NoColumns("INSERT")
    );
}

#[test]
fn test_update_and_delete() {
    let data = row(&[("name", json!("bob"))]);
    let update =
        SqlGenerator::build_update(Dialect::Postgres, "users", &data, "id", &json!(3)).unwrap();
    assert_eq!(update.sql, "UPDATE users SET name = $1 WHERE id = $2");
    assert_eq!(update.params, vec![json!("bob"), json!(3)]);

    let delete = SqlGenerator::build_delete(Dialect::MsSql, "[Users]", "id", &json!(3)).unwrap();
    assert_eq!(delete.sql, "DELETE FROM [Users] WHERE id = @P1");
    assert_eq!(delete.params, vec![json!(3)]);
}
