//! Migration: Create test_runs table.
//!
//! One row per execution of one test set. Rows sharing a batch_id form a batch.

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
                CREATE TABLE test_runs (
                    id SERIAL PRIMARY KEY,
                    batch_id VARCHAR(64),
                    release_id INTEGER NOT NULL REFERENCES releases(id),
                    test_set_id INTEGER NOT NULL,
                    test_set_name VARCHAR(255) NOT NULL,

                    status VARCHAR(20) NOT NULL DEFAULT 'running'
                        CHECK (status IN ('running', 'passed', 'failed')),

                    environment VARCHAR(100) NOT NULL,
                    base_url VARCHAR(1000) NOT NULL,
                    executed_by VARCHAR(255) NOT NULL,
                    executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                    -- Aggregates written once when the run reaches a terminal status
                    duration_ms BIGINT NOT NULL DEFAULT 0,
                    total_scenarios INTEGER NOT NULL DEFAULT 0,
                    total_steps INTEGER NOT NULL DEFAULT 0,
                    passed_steps INTEGER NOT NULL DEFAULT 0,
                    failed_steps INTEGER NOT NULL DEFAULT 0,
                    failed_details JSONB,
                    video_path VARCHAR(1000),

                    CHECK (passed_steps + failed_steps <= total_steps)
                );

                CREATE INDEX idx_test_runs_batch_id ON test_runs(batch_id)
                    WHERE batch_id IS NOT NULL;

                CREATE INDEX idx_test_runs_executed_at ON test_runs(executed_at DESC);

                CREATE INDEX idx_test_runs_status ON test_runs(status);

                CREATE INDEX idx_test_runs_release_id ON test_runs(release_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS test_runs CASCADE;")
            .await?;

        Ok(())
    }
}
