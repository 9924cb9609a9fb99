//! Read-only lookups into the test-plan catalog (releases, test sets, environments).

use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::environment::{self, Entity as Environment};
use crate::entity::release::{self, Entity as Release};
use crate::entity::test_set::{self, Entity as TestSet};
use crate::error::{AppError, AppResult};

use super::DbPool;

/// Pick the base URL for a release: a release-specific row overrides the
/// global default (`release_id = NULL`). Blank URLs count as unconfigured.
pub fn pick_environment_url(rows: &[environment::Model], release_id: i32) -> Option<String> {
    let configured = |row: &&environment::Model| !row.base_url.trim().is_empty();

    rows.iter()
        .filter(configured)
        .find(|row| row.release_id == Some(release_id))
        .or_else(|| {
            rows.iter()
                .filter(configured)
                .find(|row| row.release_id.is_none())
        })
        .map(|row| row.base_url.trim().to_string())
}

impl DbPool {
    /// Get a release by ID.
    pub async fn get_release(&self, id: i32) -> AppResult<Option<release::Model>> {
        let result = Release::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get release: {}", e)))?;

        Ok(result)
    }

    /// Get a test set, only if it belongs to the given release.
    pub async fn get_test_set_for_release(
        &self,
        release_id: i32,
        test_set_id: i32,
    ) -> AppResult<Option<test_set::Model>> {
        let result = TestSet::find_by_id(test_set_id)
            .filter(test_set::Column::ReleaseId.eq(release_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test set: {}", e)))?;

        Ok(result)
    }

    /// List all test sets of a release in creation order.
    pub async fn list_test_sets(&self, release_id: i32) -> AppResult<Vec<test_set::Model>> {
        let result = TestSet::find()
            .filter(test_set::Column::ReleaseId.eq(release_id))
            .order_by_asc(test_set::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list test sets: {}", e)))?;

        Ok(result)
    }

    /// Resolve the base URL of an environment for a release.
    pub async fn resolve_environment_url(
        &self,
        release_id: i32,
        name: &str,
    ) -> AppResult<Option<String>> {
        let rows = Environment::find()
            .filter(environment::Column::Name.eq(name))
            .filter(
                Condition::any()
                    .add(environment::Column::ReleaseId.eq(release_id))
                    .add(environment::Column::ReleaseId.is_null()),
            )
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to resolve environment: {}", e)))?;

        Ok(pick_environment_url(&rows, release_id))
    }
}
