//! Run Store: durable test runs and their step results.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};

use crate::entity::test_run::{self as run, ActiveModel, Entity as TestRun};
use crate::entity::test_run_step::{self as step, Entity as TestRunStep};
use crate::error::{AppError, AppResult};
use crate::models::{FailedDetail, RunCompletion, RunStatus};

use super::DbPool;

/// A run row to be created in `running` status.
#[derive(Debug, Clone)]
pub struct NewTestRun {
    pub release_id: i32,
    pub test_set_id: i32,
    pub test_set_name: String,
    pub environment: String,
    pub base_url: String,
    pub executed_by: String,
}

impl NewTestRun {
    fn into_active_model(self, batch_id: Option<String>) -> ActiveModel {
        ActiveModel {
            id: NotSet,
            batch_id: Set(batch_id),
            release_id: Set(self.release_id),
            test_set_id: Set(self.test_set_id),
            test_set_name: Set(self.test_set_name),
            status: Set(RunStatus::Running.as_str().to_string()),
            environment: Set(self.environment),
            base_url: Set(self.base_url),
            executed_by: Set(self.executed_by),
            executed_at: Set(Utc::now()),
            duration_ms: Set(0),
            total_scenarios: Set(0),
            total_steps: Set(0),
            passed_steps: Set(0),
            failed_steps: Set(0),
            failed_details: Set(None),
            video_path: Set(None),
        }
    }
}

impl DbPool {
    /// Create a standalone run (no batch).
    pub async fn insert_test_run(&self, new_run: NewTestRun) -> AppResult<run::Model> {
        let result = new_run
            .into_active_model(None)
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert test run: {}", e)))?;

        Ok(result)
    }

    /// Create all members of a batch in one transaction.
    pub async fn insert_batch_runs(
        &self,
        batch_id: &str,
        new_runs: Vec<NewTestRun>,
    ) -> AppResult<Vec<run::Model>> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let mut created = Vec::with_capacity(new_runs.len());
        for new_run in new_runs {
            let model = new_run
                .into_active_model(Some(batch_id.to_string()))
                .insert(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to insert batch run: {}", e)))?;
            created.push(model);
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit batch runs: {}", e)))?;

        Ok(created)
    }

    /// Get a run by ID.
    pub async fn get_test_run(&self, id: i32) -> AppResult<Option<run::Model>> {
        let result = TestRun::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test run: {}", e)))?;

        Ok(result)
    }

    /// Get the step results of a run in execution order.
    pub async fn get_test_run_steps(&self, test_run_id: i32) -> AppResult<Vec<step::Model>> {
        let result = TestRunStep::find()
            .filter(step::Column::TestRunId.eq(test_run_id))
            .order_by_asc(step::Column::Sequence)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test run steps: {}", e)))?;

        Ok(result)
    }

    /// Get all runs of a batch.
    pub async fn get_batch_runs(&self, batch_id: &str) -> AppResult<Vec<run::Model>> {
        let result = TestRun::find()
            .filter(run::Column::BatchId.eq(batch_id))
            .order_by_asc(run::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get batch runs: {}", e)))?;

        Ok(result)
    }

    /// Count runs still marked running.
    pub async fn count_running_runs(&self) -> AppResult<u64> {
        let count = TestRun::find()
            .filter(run::Column::Status.eq(RunStatus::Running.as_str()))
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count running runs: {}", e)))?;

        Ok(count)
    }

    /// Write the terminal status, aggregates and step results of a run.
    ///
    /// The status update is a single conditional UPDATE (`status = 'running'`),
    /// so concurrent writers never race and terminal rows are never rewritten.
    /// Returns false if the run was already terminal or does not exist.
    pub async fn complete_test_run(
        &self,
        test_run_id: i32,
        completion: RunCompletion,
    ) -> AppResult<bool> {
        let RunCompletion { status, outcome } = completion;
        if !status.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "Cannot complete test run {} with status {}",
                test_run_id, status
            )));
        }

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = TestRun::update_many()
            .col_expr(run::Column::Status, Expr::value(status.as_str()))
            .col_expr(run::Column::DurationMs, Expr::value(outcome.duration_ms))
            .col_expr(run::Column::TotalScenarios, Expr::value(outcome.total_scenarios))
            .col_expr(run::Column::TotalSteps, Expr::value(outcome.total_steps))
            .col_expr(run::Column::PassedSteps, Expr::value(outcome.passed_steps))
            .col_expr(run::Column::FailedSteps, Expr::value(outcome.failed_steps))
            .col_expr(
                run::Column::FailedDetails,
                Expr::value(FailedDetail::list_to_json(&outcome.failed_details)),
            )
            .col_expr(run::Column::VideoPath, Expr::value(outcome.video_path.clone()))
            .filter(run::Column::Id.eq(test_run_id))
            .filter(run::Column::Status.eq(RunStatus::Running.as_str()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to complete test run: {}", e)))?;

        if updated.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(format!("Failed to roll back: {}", e)))?;
            return Ok(false);
        }

        if !outcome.steps.is_empty() {
            let steps = outcome
                .steps
                .into_iter()
                .enumerate()
                .map(|(sequence, result)| step::ActiveModel {
                    id: NotSet,
                    test_run_id: Set(test_run_id),
                    step_id: Set(result.step_id),
                    scenario_name: Set(result.scenario_name),
                    case_name: Set(result.case_name),
                    description: Set(result.description),
                    status: Set(result.status.as_str().to_string()),
                    duration_ms: Set(result.duration_ms.max(0)),
                    error_message: Set(result.error_message),
                    sequence: Set(sequence as i32),
                });

            TestRunStep::insert_many(steps)
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to insert step results: {}", e)))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit test run: {}", e)))?;

        Ok(true)
    }
}
