//! In-memory SQLite store and seed helpers for unit tests.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, NotSet, Set};

use crate::entity::{environment, release, test_set};

use super::DbPool;
use super::test_runs::NewTestRun;

/// SQLite rendition of the migrated schema.
const SCHEMA: &str = r#"
CREATE TABLE releases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_number TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE test_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER NOT NULL REFERENCES releases(id),
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE environments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER REFERENCES releases(id),
    name TEXT NOT NULL,
    base_url TEXT NOT NULL
);

CREATE TABLE test_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT,
    release_id INTEGER NOT NULL REFERENCES releases(id),
    test_set_id INTEGER NOT NULL,
    test_set_name TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('running', 'passed', 'failed')),
    environment TEXT NOT NULL,
    base_url TEXT NOT NULL,
    executed_by TEXT NOT NULL,
    executed_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    total_scenarios INTEGER NOT NULL DEFAULT 0,
    total_steps INTEGER NOT NULL DEFAULT 0,
    passed_steps INTEGER NOT NULL DEFAULT 0,
    failed_steps INTEGER NOT NULL DEFAULT 0,
    failed_details TEXT,
    video_path TEXT,
    CHECK (passed_steps + failed_steps <= total_steps)
);

CREATE TABLE test_run_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_run_id INTEGER NOT NULL REFERENCES test_runs(id),
    step_id INTEGER NOT NULL,
    scenario_name TEXT NOT NULL,
    case_name TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    sequence INTEGER NOT NULL
);
"#;

/// Fresh in-memory store with the schema applied.
///
/// A single pooled connection keeps every query on the same in-memory database.
pub async fn memory_pool() -> DbPool {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(options).await.expect("open sqlite memory db");
    conn.execute_unprepared(SCHEMA).await.expect("create schema");

    DbPool::from_connection(conn)
}

pub async fn seed_release(pool: &DbPool, release_number: &str) -> i32 {
    release::ActiveModel {
        id: NotSet,
        release_number: Set(release_number.to_string()),
        description: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(pool.connection())
    .await
    .expect("seed release")
    .id
}

pub async fn seed_test_set(pool: &DbPool, release_id: i32, name: &str) -> i32 {
    test_set::ActiveModel {
        id: NotSet,
        release_id: Set(release_id),
        name: Set(name.to_string()),
        description: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(pool.connection())
    .await
    .expect("seed test set")
    .id
}

pub async fn seed_environment(pool: &DbPool, release_id: Option<i32>, name: &str, base_url: &str) {
    environment::ActiveModel {
        id: NotSet,
        release_id: Set(release_id),
        name: Set(name.to_string()),
        base_url: Set(base_url.to_string()),
    }
    .insert(pool.connection())
    .await
    .expect("seed environment");
}

pub fn new_run(release_id: i32, test_set_id: i32, name: &str) -> NewTestRun {
    NewTestRun {
        release_id,
        test_set_id,
        test_set_name: name.to_string(),
        environment: "staging".to_string(),
        base_url: "https://staging.example.com".to_string(),
        executed_by: "tester".to_string(),
    }
}
