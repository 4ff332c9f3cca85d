//! Tests against real database servers
//!
//! Skipped unless `TEST_CONNECTIONS=1`. Backends come from the file named by
//! `DBWRAP_CONFIG` (or `./dbwrap.toml`); each SQL backend needs a `dbwrap_sample`
//! table with an auto-generated integer `id`, a text `label` and a boolean
//! `active` column.

use dbwrap::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Sample {
    id: Option<i64>,
    label: String,
    active: bool,
}

impl Record for Sample {
    fn table_name(&self) -> &str {
        "dbwrap_sample"
    }
}

fn enabled() -> bool {
    std::env::var("TEST_CONNECTIONS").is_ok_and(|v| v == "1")
}

async fn round_trip<S>(db: DataAccessWrapper<'_, S>)
where
    S: ConnectionSource,
    <S::Manager as ManageConnection>::Connection: Session,
{
    let mut sample = Sample {
        label: "live".to_string(),
        active: true,
        ..Default::default()
    };
    let stored = db.store(&mut sample).await.unwrap();
    assert!(stored.success, "{}", stored);
    assert!(sample.id.is_some());

    let found = db.get_one(&sample).await.unwrap().result.unwrap();
    assert_eq!(found, sample);

    let page = db
        .get_filtered(
            &Sample::default(),
            &FilterExpression::new()
                .eq("label", json!("live"))
                .eq("active", json!(true)),
            Some(&OrderSpec::new().desc("id")),
            Pagination::new().with_limit(1),
        )
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(page.len(), 1);
    assert!(page[0].active);

    assert_eq!(db.delete(&sample).await.unwrap().result, Some(1));
}

#[tokio::test]
async fn test_live_backends() {
    if !enabled() {
        return;
    }

    let dbwrap = DbWrap::from_env().unwrap();
    dbwrap.open_all().await.unwrap();

    let names: Vec<String> = dbwrap.backend_names().into_iter().map(String::from).collect();
    for name in &names {
        dbwrap.health_check(name).await.unwrap();
        match dbwrap.kind(name).unwrap() {
            BackendKind::Postgres | BackendKind::MySql | BackendKind::Sqlite => {
                round_trip(dbwrap.wrapper(name).unwrap()).await
            }
            BackendKind::MsSql => round_trip(dbwrap.mssql_wrapper(name).unwrap()).await,
            BackendKind::Redis => {
                let kv = dbwrap.kv(name, "dbwrap-test").unwrap();
                let mut sample = Sample {
                    label: "live".to_string(),
                    ..Default::default()
                };
                assert!(kv.store(&mut sample).await.unwrap().success);
                let found = kv.get_one(&sample).await.unwrap().result.unwrap();
                assert_eq!(found, sample);
                assert_eq!(kv.delete(&sample).await.unwrap().result, Some(1));
            }
        }
        assert_eq!(dbwrap.status()[name.as_str()].in_use, 0);
    }

    dbwrap.close_all().await;
}
