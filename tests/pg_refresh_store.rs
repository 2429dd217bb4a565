//! Postgres-backed refresh store. Needs a reachable database described by
//! `configuration.*` / `APP_DATABASE__*`; run with `cargo test -- --ignored`.

use cart_auth::configuration::{get_configuration, DatabaseSettings};
use cart_auth::store::{PgRefreshStore, RefreshStore};
use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};

async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn spawn_store() -> PgRefreshStore {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    PgRefreshStore::new(configure_database(&configuration.database).await)
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn latest_record_is_newest_by_created_at() {
    let store = spawn_store().await;
    let now = Utc::now();

    store.insert(1, "old", now - Duration::hours(1), now).await.unwrap();
    store.insert(1, "new", now, now + Duration::days(1)).await.unwrap();

    let latest = store.get_latest(1).await.unwrap().expect("record expected");
    assert_eq!(latest.token, "new");
    assert_eq!(latest.subject_id, 1);
    assert_eq!(store.get_latest(2).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn update_latest_only_touches_newest_row() {
    let store = spawn_store().await;
    let now = Utc::now();
    let created = now - Duration::minutes(5);

    store.insert(1, "old", now - Duration::hours(1), now).await.unwrap();
    store.insert(1, "new", created, now).await.unwrap();
    store.update_latest(1, "newer", now + Duration::days(1)).await.unwrap();

    let latest = store.get_latest(1).await.unwrap().unwrap();
    assert_eq!(latest.token, "newer");
    assert_eq!(latest.created_at.timestamp(), created.timestamp());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE token = 'old'")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn replace_latest_if_requires_expected_token() {
    let store = spawn_store().await;
    let now = Utc::now();
    store.insert(1, "seen", now, now).await.unwrap();

    assert!(!store.replace_latest_if(1, "stale", "x", now).await.unwrap());
    assert!(store.replace_latest_if(1, "seen", "y", now).await.unwrap());
    assert_eq!(store.get_latest(1).await.unwrap().unwrap().token, "y");
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn prune_expired_removes_only_expired_rows() {
    let store = spawn_store().await;
    let now = Utc::now();

    store.insert(1, "dead", now - Duration::days(2), now - Duration::days(1)).await.unwrap();
    store.insert(2, "alive", now, now + Duration::days(1)).await.unwrap();

    assert_eq!(store.prune_expired(now).await.unwrap(), 1);
    assert_eq!(store.get_latest(1).await.unwrap(), None);
    assert!(store.get_latest(2).await.unwrap().is_some());
}
