//! Migration: Create catalog tables (releases, test sets, environments).
//!
//! The test-plan CRUD surface owns these rows; the orchestrator reads them.
//! `IF NOT EXISTS` lets this migration run against a database where the
//! catalog schema is already in place.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE IF NOT EXISTS releases (
                    id SERIAL PRIMARY KEY,
                    release_number VARCHAR(100) NOT NULL UNIQUE,
                    description TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE TABLE IF NOT EXISTS test_sets (
                    id SERIAL PRIMARY KEY,
                    release_id INTEGER NOT NULL REFERENCES releases(id) ON DELETE CASCADE,
                    name VARCHAR(255) NOT NULL,
                    description TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX IF NOT EXISTS idx_test_sets_release_id ON test_sets(release_id);

                -- release_id NULL = global default URL for the environment name
                CREATE TABLE IF NOT EXISTS environments (
                    id SERIAL PRIMARY KEY,
                    release_id INTEGER REFERENCES releases(id) ON DELETE CASCADE,
                    name VARCHAR(100) NOT NULL,
                    base_url VARCHAR(1000) NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_environments_release_name
                    ON environments(release_id, name) WHERE release_id IS NOT NULL;
                CREATE UNIQUE INDEX IF NOT EXISTS idx_environments_global_name
                    ON environments(name) WHERE release_id IS NULL;
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TABLE IF EXISTS environments CASCADE;
                DROP TABLE IF EXISTS test_sets CASCADE;
                DROP TABLE IF EXISTS releases CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
