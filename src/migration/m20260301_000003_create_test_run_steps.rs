//! Migration: Create test_run_steps table.

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
                CREATE TABLE test_run_steps (
                    id SERIAL PRIMARY KEY,
                    test_run_id INTEGER NOT NULL REFERENCES test_runs(id) ON DELETE CASCADE,
                    step_id INTEGER NOT NULL,
                    -- Denormalized so reports survive catalog edits
                    scenario_name VARCHAR(500) NOT NULL,
                    case_name VARCHAR(500) NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status VARCHAR(20) NOT NULL
                        CHECK (status IN ('passed', 'failed', 'skipped')),
                    duration_ms BIGINT NOT NULL DEFAULT 0,
                    error_message TEXT,
                    sequence INTEGER NOT NULL
                );

                CREATE INDEX idx_test_run_steps_run ON test_run_steps(test_run_id, sequence);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS test_run_steps CASCADE;")
            .await?;

        Ok(())
    }
}
