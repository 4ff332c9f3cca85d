//! CRUD through the data wrapper against a SQLite file database

use backend::drivers::sql::SqlManager;
use backend::{ConnectionPool, PoolOptions};
use config::BackendConfig;
use data_wrapper::blocking::Database;
use data_wrapper::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tempfile::TempDir;

const CREATE_ITEMS: &str = "CREATE TABLE items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    qty INTEGER NOT NULL,
    note TEXT CHECK (note IS NULL OR note <> 'rejected')
)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Item {
    id: Option<i64>,
    name: String,
    qty: i64,
    note: Option<String>,
    #[serde(skip)]
    keyless: bool,
}

impl Item {
    fn new(name: &str, qty: i64) -> Self {
        Self {
            name: name.to_string(),
            qty,
            ..Default::default()
        }
    }
}

impl Record for Item {
    fn table_name(&self) -> &str {
        "items"
    }

    fn id_key(&self) -> Option<&str> {
        if self.keyless {
            None
        } else {
            Some("id")
        }
    }
}

/// Same table, read through an alias
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AliasedItem {
    id: Option<i64>,
    name: String,
}

impl Record for AliasedItem {
    fn table_name(&self) -> &str {
        "items"
    }

    fn table_alias(&self) -> Option<&str> {
        Some("i")
    }

    fn query_base(&self) -> Option<String> {
        Some("SELECT i.id, i.name FROM items AS i".to_string())
    }
}

const CREATE_GADGETS: &str = "CREATE TABLE gadgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    active BOOLEAN NOT NULL,
    weight REAL NOT NULL,
    made_at DATETIME NOT NULL
)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Gadget {
    id: Option<i64>,
    name: String,
    active: bool,
    weight: f64,
    made_at: String,
}

impl Gadget {
    fn new(name: &str, active: bool, weight: f64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            active,
            weight,
            made_at: "2024-05-01T13:45:00".to_string(),
        }
    }
}

impl Record for Gadget {
    fn table_name(&self) -> &str {
        "gadgets"
    }
}

fn sqlite_config(dir: &TempDir) -> BackendConfig {
    let path = dir.path().join("items.db");
    BackendConfig::sqlite(path.to_str().unwrap())
}

async fn setup() -> (TempDir, ConnectionPool<SqlManager>) {
    let dir = tempfile::tempdir().unwrap();
    let config = sqlite_config(&dir);
    let options = PoolOptions::from_config(&config)
        .with_min_connections(0)
        .with_max_connections(2)
        .with_retry_backoff(Duration::ZERO);
    let pool = ConnectionPool::new("items", SqlManager::new(config).unwrap(), options).unwrap();

    DataAccessWrapper::new(&pool)
        .execute_raw(CREATE_ITEMS, &[])
        .await
        .unwrap();
    (dir, pool)
}

async fn seed(db: &DataAccessWrapper<'_, ConnectionPool<SqlManager>>) -> Vec<Item> {
    let mut items = vec![
        Item::new("lamp", 3),
        Item::new("desk", 1),
        Item::new("chair", 4),
        Item::new("lantern", 7),
    ];
    let statuses = db.store_many(&mut items).await.unwrap();
    assert!(statuses.iter().all(|s| s.success));
    items
}

#[tokio::test]
async fn test_store_then_get_by_key() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let mut item = Item::new("lamp", 3);
    item.note = Some("blue".into());
    let stored = db.store(&mut item).await.unwrap();
    assert!(stored.success);
    let stored = stored.result.unwrap();
    assert_eq!(stored.id, json!(1));
    assert_eq!(stored.rows_affected, 1);
    assert_eq!(item.id, Some(1));

    let found = db
        .get_by_key(&Item::default(), "id", json!(1))
        .await
        .unwrap();
    assert!(found.success);
    assert_eq!(found.result.unwrap(), item);

    let again = db.get_one(&item).await.unwrap();
    assert_eq!(again.result.unwrap(), item);
}

#[tokio::test]
async fn test_get_one_requires_identity() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let no_value = db.get_one(&Item::new("lamp", 1)).await.unwrap();
    assert!(!no_value.success);
    assert_eq!(no_value.code, Some(ResultCode::MissingIdentity));
    assert_eq!(no_value.code.map(i32::from), Some(10000));

    let keyless = Item {
        id: Some(1),
        keyless: true,
        ..Item::new("lamp", 1)
    };
    let no_key = db.get_one(&keyless).await.unwrap();
    assert_eq!(no_key.code, Some(ResultCode::MissingIdentity));
    assert_eq!(no_key.message.as_deref(), Some("Id key is not provided"));
}

#[tokio::test]
async fn test_not_found_is_soft() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let missing = Item {
        id: Some(404),
        ..Item::default()
    };
    let envelope = db.get_one(&missing).await.unwrap();
    assert!(!envelope.success);
    assert!(envelope.is_not_found());
    assert!(envelope.result.is_none());

    let all = db
        .get_all(&Item::default(), None, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.code, Some(ResultCode::NotFound));
}

#[tokio::test]
async fn test_batch_store_skips_records_without_identity_key() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let mut records = vec![
        Item::new("lamp", 3),
        Item {
            keyless: true,
            ..Item::new("ghost", 1)
        },
    ];
    let statuses = db.store_many(&mut records).await.unwrap();

    assert_eq!(statuses.len(), records.len() - 1);
    assert!(statuses[0].success);
    assert_eq!(records[0].id, Some(1));
    assert_eq!(records[1].id, None);
}

#[tokio::test]
async fn test_batch_store_continues_past_failures() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let mut records = vec![
        Item::new("lamp", 3),
        Item {
            note: Some("rejected".into()),
            ..Item::new("broken", 1)
        },
        Item::new("desk", 2),
    ];
    let statuses = db.store_many(&mut records).await.unwrap();

    assert_eq!(statuses.len(), 3);
    assert!(statuses[0].success);
    assert!(!statuses[1].success);
    assert_eq!(statuses[1].code, Some(ResultCode::RecordFailed));
    assert!(statuses[2].success);
    assert_eq!(records[2].id, Some(2));
    assert_eq!(pool.status().in_use, 0);
}

#[tokio::test]
async fn test_single_store_without_data() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let mut keyless = Item {
        keyless: true,
        ..Item::new("ghost", 1)
    };
    let envelope = db.store(&mut keyless).await.unwrap();
    assert_eq!(envelope.code, Some(ResultCode::NothingToWrite));
    assert!(db.store_many::<Item>(&mut []).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_limit_zero_returns_everything() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    seed(&db).await;

    let all = db
        .get_all(&Item::default(), None, None, Pagination::unbounded())
        .await
        .unwrap();
    assert_eq!(all.result.unwrap().len(), 4);

    let page = db
        .get_all(
            &Item::default(),
            None,
            Some(&OrderSpec::new().desc("id")),
            Pagination::new().with_offset(1).with_limit(2),
        )
        .await
        .unwrap()
        .result
        .unwrap();
    let ids: Vec<_> = page.iter().map(|i| i.id.unwrap()).collect();
    assert_eq!(ids, vec![3, 2]);
}

#[tokio::test]
async fn test_get_all_with_equality_filter() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    seed(&db).await;

    let desks = db
        .get_all(
            &Item::default(),
            Some(("name", json!("desk"))),
            None,
            Pagination::default(),
        )
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(desks.len(), 1);
    assert_eq!(desks[0].qty, 1);

    // A blank filter value means no filter
    let all = db
        .get_all(&Item::default(), Some(("name", Value::Null)), None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.result.unwrap().len(), 4);
}

#[tokio::test]
async fn test_get_filtered() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    seed(&db).await;

    let filter = FilterExpression::from_json(&json!({
        "name": {"$starts_with": "la"},
        "qty": {"$min": 2, "$max": 10}
    }))
    .unwrap();
    let order = OrderSpec::from_json(&json!([["qty", "DESC"]])).unwrap();
    let found = db
        .get_filtered(&Item::default(), &filter, Some(&order), Pagination::unbounded())
        .await
        .unwrap()
        .result
        .unwrap();
    let names: Vec<_> = found.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["lantern", "lamp"]);

    let filter = FilterExpression::new()
        .in_values("qty", vec![json!(1), json!(4)])
        .is_null("note");
    let found = db
        .get_filtered(&Item::default(), &filter, Some(&OrderSpec::new().asc("qty")), Pagination::default())
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].name, "desk");

    let none = db
        .get_filtered(
            &Item::default(),
            &FilterExpression::new().contains("name", "sofa"),
            None,
            Pagination::default(),
        )
        .await
        .unwrap();
    assert!(none.is_not_found());
}

#[tokio::test]
async fn test_bool_real_and_datetime_round_trip() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    db.execute_raw(CREATE_GADGETS, &[]).await.unwrap();

    let mut drill = Gadget::new("drill", true, 1.75);
    assert!(db.store(&mut drill).await.unwrap().success);
    let found = db.get_one(&drill).await.unwrap().result.unwrap();
    assert_eq!(found, drill);

    // Written by another client with a plain integer flag
    db.execute_raw(
        "INSERT INTO gadgets (name, active, weight, made_at) VALUES ('saw', 0, 2.5, '2024-06-01 08:00:00')",
        &[],
    )
    .await
    .unwrap();
    let saw = db
        .get_by_key(&Gadget::default(), "name", json!("saw"))
        .await
        .unwrap()
        .result
        .unwrap();
    assert!(!saw.active);
    assert_eq!(saw.weight, 2.5);
    assert_eq!(saw.made_at, "2024-06-01 08:00:00");

    let rows = db
        .fetch_raw("SELECT active, weight FROM gadgets WHERE name = ?", &[json!("drill")])
        .await
        .unwrap();
    assert_eq!(rows[0].get("active"), Some(&json!(true)));
    assert_eq!(rows[0].get("weight"), Some(&json!(1.75)));
}

#[tokio::test]
async fn test_filter_on_boolean_column() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    db.execute_raw(CREATE_GADGETS, &[]).await.unwrap();

    let mut gadgets = vec![
        Gadget::new("drill", true, 1.75),
        Gadget::new("saw", false, 2.5),
        Gadget::new("sander", true, 1.2),
    ];
    let statuses = db.store_many(&mut gadgets).await.unwrap();
    assert!(statuses.iter().all(|s| s.success));

    let active = db
        .get_filtered(
            &Gadget::default(),
            &FilterExpression::new().eq("active", json!(true)),
            Some(&OrderSpec::new().asc("name")),
            Pagination::default(),
        )
        .await
        .unwrap()
        .result
        .unwrap();
    let names: Vec<_> = active.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["drill", "sander"]);
    assert!(active.iter().all(|g| g.active));

    let idle = db
        .get_filtered(
            &Gadget::default(),
            &FilterExpression::from_json(&json!({"active": false})).unwrap(),
            None,
            Pagination::default(),
        )
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0], gadgets[1]);
}

#[test]
fn test_malformed_filter_is_query_error() {
    let err = FilterExpression::from_json(&json!({"qty": {"$between": [1, 2]}})).unwrap_err();
    let err = WrapperError::from(err);
    assert!(matches!(err, WrapperError::Query(_)));
}

#[tokio::test]
async fn test_failed_statement_releases_connection() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);

    let err = db
        .get_filtered(
            &Item::default(),
            &FilterExpression::new().eq("no_such_column", json!(1)),
            None,
            Pagination::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WrapperError::Execution(_)));

    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 1);
    assert_eq!(status.broken, 0);
}

#[tokio::test]
async fn test_update_and_update_fields() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    let mut items = seed(&db).await;

    items[0].qty = 30;
    let updated = db.update(&items[0]).await.unwrap();
    assert_eq!(updated.result, Some(1));
    let reloaded = db.get_one(&items[0]).await.unwrap().result.unwrap();
    assert_eq!(reloaded.qty, 30);

    let unsaved = db.update(&Item::new("sofa", 1)).await.unwrap();
    assert_eq!(unsaved.code, Some(ResultCode::NothingToWrite));

    let mut data = Map::new();
    data.insert("note".to_string(), json!("restocked"));
    let touched = db
        .update_fields(&Item::default(), &data, Some(("name", json!("desk"))))
        .await
        .unwrap();
    assert_eq!(touched.result, Some(1));
    let desk = db.get_one(&items[1]).await.unwrap().result.unwrap();
    assert_eq!(desk.note.as_deref(), Some("restocked"));

    let by_identity = db.update_fields(&items[2], &data, None).await.unwrap();
    assert_eq!(by_identity.result, Some(1));

    let nowhere = db.update_fields(&Item::default(), &data, None).await.unwrap();
    assert_eq!(nowhere.code, Some(ResultCode::MissingIdentity));

    let statuses = db
        .update_many(&[items[3].clone(), Item::new("unsaved", 1)])
        .await
        .unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].result, Some(1));
}

#[tokio::test]
async fn test_delete() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    let items = seed(&db).await;

    let deleted = db.delete(&items[0]).await.unwrap();
    assert_eq!(deleted.result, Some(1));
    assert!(db.get_one(&items[0]).await.unwrap().is_not_found());

    let again = db.delete(&items[0]).await.unwrap();
    assert_eq!(again.result, Some(0));

    let unsaved = db.delete(&Item::new("sofa", 1)).await.unwrap();
    assert_eq!(unsaved.code, Some(ResultCode::NothingToDelete));
    assert_eq!(unsaved.code.map(i32::from), Some(10003));

    let statuses = db
        .delete_many(&[items[1].clone(), Item::new("unsaved", 1), items[2].clone()])
        .await
        .unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.result == Some(1)));
}

#[tokio::test]
async fn test_alias_and_base_query() {
    let (_dir, pool) = setup().await;
    let db = DataAccessWrapper::new(&pool);
    seed(&db).await;

    let view = AliasedItem {
        id: Some(2),
        ..AliasedItem::default()
    };
    let found = db.get_one(&view).await.unwrap().result.unwrap();
    assert_eq!(found.name, "desk");

    let listed = db
        .get_all(
            &AliasedItem::default(),
            None,
            Some(&OrderSpec::new().asc("i.name")),
            Pagination::default(),
        )
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(listed[0].name, "chair");
}

#[test]
fn test_blocking_database() {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::connect(sqlite_config(&dir)).unwrap();
    database.execute_raw(CREATE_ITEMS, &[]).unwrap();

    let mut item = Item::new("lamp", 3);
    let stored = database.store(&mut item).unwrap();
    assert!(stored.success);
    assert_eq!(item.id, Some(1));

    let found = database.get_one(&item).unwrap().result.unwrap();
    assert_eq!(found, item);

    item.qty = 5;
    assert_eq!(database.update(&item).unwrap().result, Some(1));
    assert_eq!(database.delete(&item).unwrap().result, Some(1));

    database.close();
    database.close();
    assert_eq!(database.state(), backend::LifecycleState::Closed);
    assert!(database.get_one(&item).unwrap_err().is_connection_error());
}
