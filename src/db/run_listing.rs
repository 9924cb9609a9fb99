//! Combined listing of standalone runs and batches.
//!
//! Standalone runs (`batch_id IS NULL`) are returned row by row; runs sharing
//! a `batch_id` collapse into one row with precedence status, earliest
//! timestamp and summed counters. Filters on batch-level values go into
//! HAVING so the page and the count agree.
//!
//! The SQL sticks to constructs shared by PostgreSQL and SQLite (CAST, CASE,
//! LOWER/LIKE) so the same statements run against the test database.

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseBackend, FromQueryResult, Statement, Value};

use crate::error::{AppError, AppResult};
use crate::models::{
    RunListItem, RunListKind, RunListQuery, RunStatus, batch_display_name,
};

use super::DbPool;

/// Batch status with precedence running > failed > passed.
const BATCH_STATUS_EXPR: &str = "CASE \
    WHEN MAX(CASE WHEN tr.status = 'running' THEN 1 ELSE 0 END) = 1 THEN 'running' \
    WHEN MAX(CASE WHEN tr.status = 'failed' THEN 1 ELSE 0 END) = 1 THEN 'failed' \
    ELSE 'passed' END";

/// Accumulates bind values and emits backend-specific placeholders in order.
struct SqlBuilder {
    backend: DatabaseBackend,
    values: Vec<Value>,
}

impl SqlBuilder {
    fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        match self.backend {
            DatabaseBackend::Postgres => format!("${}", self.values.len()),
            _ => "?".to_string(),
        }
    }

    fn into_statement(self, sql: String) -> Statement {
        Statement::from_sql_and_values(self.backend, sql, self.values)
    }
}

/// Build the `standalone` and `batches` CTEs for the given filters.
fn listing_ctes(builder: &mut SqlBuilder, query: &RunListQuery) -> String {
    let search = query.search_pattern();

    // Standalone runs: every filter is row-level.
    let mut standalone_where = vec!["tr.batch_id IS NULL".to_string()];
    if let Some(release_id) = query.release_id {
        standalone_where.push(format!("tr.release_id = {}", builder.bind(release_id)));
    }
    if let Some(status) = query.status {
        standalone_where.push(format!(
            "tr.status = {}",
            builder.bind(status.as_str().to_string())
        ));
    }
    if let Some(from_date) = query.from_date {
        standalone_where.push(format!("tr.executed_at >= {}", builder.bind(from_date)));
    }
    if let Some(to_date) = query.to_date {
        standalone_where.push(format!("tr.executed_at <= {}", builder.bind(to_date)));
    }
    if let Some(ref pattern) = search {
        standalone_where.push(format!(
            "(LOWER(tr.test_set_name) LIKE {} ESCAPE '\\' OR LOWER(r.release_number) LIKE {} ESCAPE '\\')",
            builder.bind(pattern.clone()),
            builder.bind(pattern.clone())
        ));
    }

    // Batches: only the release filter is row-level (members share a release);
    // status, dates and search apply to the group.
    let mut batch_where = vec!["tr.batch_id IS NOT NULL".to_string()];
    if let Some(release_id) = query.release_id {
        batch_where.push(format!("tr.release_id = {}", builder.bind(release_id)));
    }
    let mut batch_having = Vec::new();
    if let Some(status) = query.status {
        batch_having.push(format!(
            "{} = {}",
            BATCH_STATUS_EXPR,
            builder.bind(status.as_str().to_string())
        ));
    }
    if let Some(from_date) = query.from_date {
        batch_having.push(format!("MIN(tr.executed_at) >= {}", builder.bind(from_date)));
    }
    if let Some(to_date) = query.to_date {
        batch_having.push(format!("MIN(tr.executed_at) <= {}", builder.bind(to_date)));
    }
    if let Some(ref pattern) = search {
        batch_having.push(format!(
            "MAX(CASE WHEN LOWER(tr.test_set_name) LIKE {} ESCAPE '\\' OR LOWER(r.release_number) LIKE {} ESCAPE '\\' THEN 1 ELSE 0 END) = 1",
            builder.bind(pattern.clone()),
            builder.bind(pattern.clone())
        ));
    }
    let having = if batch_having.is_empty() {
        String::new()
    } else {
        format!("HAVING {}", batch_having.join(" AND "))
    };

    format!(
        r#"
        WITH standalone AS (
            SELECT
                'run' AS kind,
                tr.id AS test_run_id,
                CAST(NULL AS TEXT) AS batch_id,
                tr.release_id AS release_id,
                r.release_number AS release_number,
                tr.test_set_name AS name,
                tr.status AS status,
                tr.environment AS environment,
                tr.executed_by AS executed_by,
                tr.executed_at AS executed_at,
                CAST(tr.duration_ms AS BIGINT) AS duration_ms,
                CAST(tr.total_scenarios AS BIGINT) AS total_scenarios,
                CAST(tr.total_steps AS BIGINT) AS total_steps,
                CAST(tr.passed_steps AS BIGINT) AS passed_steps,
                CAST(tr.failed_steps AS BIGINT) AS failed_steps,
                CAST(1 AS BIGINT) AS run_count
            FROM test_runs tr
            INNER JOIN releases r ON r.id = tr.release_id
            WHERE {standalone_where}
        ),
        batches AS (
            SELECT
                'batch' AS kind,
                CAST(NULL AS INTEGER) AS test_run_id,
                tr.batch_id AS batch_id,
                MIN(tr.release_id) AS release_id,
                MIN(r.release_number) AS release_number,
                CAST(NULL AS TEXT) AS name,
                {status_expr} AS status,
                MIN(tr.environment) AS environment,
                MIN(tr.executed_by) AS executed_by,
                MIN(tr.executed_at) AS executed_at,
                CAST(SUM(tr.duration_ms) AS BIGINT) AS duration_ms,
                CAST(SUM(tr.total_scenarios) AS BIGINT) AS total_scenarios,
                CAST(SUM(tr.total_steps) AS BIGINT) AS total_steps,
                CAST(SUM(tr.passed_steps) AS BIGINT) AS passed_steps,
                CAST(SUM(tr.failed_steps) AS BIGINT) AS failed_steps,
                CAST(COUNT(*) AS BIGINT) AS run_count
            FROM test_runs tr
            INNER JOIN releases r ON r.id = tr.release_id
            WHERE {batch_where}
            GROUP BY tr.batch_id
            {having}
        )
        "#,
        standalone_where = standalone_where.join(" AND "),
        status_expr = BATCH_STATUS_EXPR,
        batch_where = batch_where.join(" AND "),
        having = having,
    )
}

/// Statement returning one page of the combined listing.
fn page_statement(backend: DatabaseBackend, query: &RunListQuery) -> Statement {
    let mut builder = SqlBuilder::new(backend);
    let ctes = listing_ctes(&mut builder, query);
    let limit = builder.bind(query.clamped_limit() as i64);
    let offset = builder.bind(query.sql_offset());

    let sql = format!(
        r#"{ctes}
        SELECT * FROM (
            SELECT * FROM standalone
            UNION ALL
            SELECT * FROM batches
        ) combined
        ORDER BY executed_at DESC, test_run_id DESC, batch_id DESC
        LIMIT {limit} OFFSET {offset}"#
    );

    builder.into_statement(sql)
}

/// Statement counting standalone rows plus distinct batches under the same filters.
fn count_statement(backend: DatabaseBackend, query: &RunListQuery) -> Statement {
    let mut builder = SqlBuilder::new(backend);
    let ctes = listing_ctes(&mut builder, query);

    let sql = format!(
        r#"{ctes}
        SELECT CAST(
            (SELECT COUNT(*) FROM standalone) + (SELECT COUNT(*) FROM batches)
        AS BIGINT) AS total"#
    );

    builder.into_statement(sql)
}

#[derive(Debug, FromQueryResult)]
struct ListingRow {
    kind: String,
    test_run_id: Option<i32>,
    batch_id: Option<String>,
    release_id: i32,
    release_number: String,
    name: Option<String>,
    status: String,
    environment: String,
    executed_by: String,
    executed_at: DateTime<Utc>,
    duration_ms: i64,
    total_scenarios: i64,
    total_steps: i64,
    passed_steps: i64,
    failed_steps: i64,
    run_count: i64,
}

impl From<ListingRow> for RunListItem {
    fn from(row: ListingRow) -> Self {
        let kind = if row.kind == "batch" {
            RunListKind::Batch
        } else {
            RunListKind::Run
        };
        let name = match kind {
            RunListKind::Batch => batch_display_name(&row.release_number, row.executed_at),
            RunListKind::Run => row.name.unwrap_or_default(),
        };

        RunListItem {
            kind,
            test_run_id: row.test_run_id,
            batch_id: row.batch_id,
            name,
            release_id: row.release_id,
            release_number: row.release_number,
            status: RunStatus::parse(&row.status).unwrap_or(RunStatus::Failed),
            environment: row.environment,
            executed_by: row.executed_by,
            executed_at: row.executed_at,
            duration_ms: row.duration_ms,
            total_scenarios: row.total_scenarios,
            total_steps: row.total_steps,
            passed_steps: row.passed_steps,
            failed_steps: row.failed_steps,
            run_count: row.run_count,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    total: i64,
}

impl DbPool {
    /// List standalone runs and batches, newest first, with the matching total.
    pub async fn list_runs(&self, query: &RunListQuery) -> AppResult<(Vec<RunListItem>, u64)> {
        let backend = self.backend();

        let count = CountRow::find_by_statement(count_statement(backend, query))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count runs: {}", e)))?
            .map(|row| row.total.max(0) as u64)
            .unwrap_or(0);

        let rows = ListingRow::find_by_statement(page_statement(backend, query))
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list runs: {}", e)))?;

        Ok((rows.into_iter().map(RunListItem::from).collect(), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use crate::models::{RunCompletion, RunOutcome};

    fn outcome(passed: i32, failed: i32) -> RunOutcome {
        RunOutcome {
            duration_ms: 1000,
            total_scenarios: 1,
            total_steps: passed + failed,
            passed_steps: passed,
            failed_steps: failed,
            ..Default::default()
        }
    }

    /// 3 standalone runs (passed, failed, failed) plus two batches of two:
    /// batch-a = [passed, failed] -> failed, batch-b = [passed, passed] -> passed.
    async fn seed_fixture(pool: &DbPool) {
        let release = test_support::seed_release(pool, "4.2").await;

        for (set, result) in [(1, outcome(3, 0)), (2, outcome(2, 1)), (3, outcome(0, 2))] {
            let run = pool
                .insert_test_run(test_support::new_run(release, set, &format!("Set {}", set)))
                .await
                .unwrap();
            pool.complete_test_run(run.id, RunCompletion::finished(result))
                .await
                .unwrap();
        }

        for (batch_id, results) in [
            ("batch-a", [outcome(4, 0), outcome(1, 1)]),
            ("batch-b", [outcome(2, 0), outcome(5, 0)]),
        ] {
            let members = pool
                .insert_batch_runs(
                    batch_id,
                    vec![
                        test_support::new_run(release, 10, "Smoke"),
                        test_support::new_run(release, 11, "Regression"),
                    ],
                )
                .await
                .unwrap();
            for (member, result) in members.iter().zip(results) {
                pool.complete_test_run(member.id, RunCompletion::finished(result))
                    .await
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_batch_status_filter_goes_into_having() {
        let query = RunListQuery {
            status: Some(RunStatus::Failed),
            limit: 20,
            ..Default::default()
        };
        let statement = page_statement(DatabaseBackend::Postgres, &query);
        let sql = statement.sql.as_str();

        let batches_cte = &sql[sql.find("batches AS").unwrap()..];
        let where_clause = &batches_cte[..batches_cte.find("GROUP BY").unwrap()];
        assert!(!where_clause.contains("tr.status ="));
        assert!(batches_cte.contains("HAVING CASE"));
        assert!(sql.contains("LIMIT $3 OFFSET $4"));
    }

    #[test]
    fn test_sqlite_uses_positional_placeholders() {
        let query = RunListQuery {
            release_id: Some(2),
            search: Some("smoke".into()),
            limit: 10,
            ..Default::default()
        };
        let statement = count_statement(DatabaseBackend::Sqlite, &query);
        let bound = statement.values.as_ref().map(|v| v.0.len()).unwrap_or(0);

        assert_eq!(statement.sql.matches('?').count(), bound);
        assert!(!statement.sql.contains('$'));
    }

    #[tokio::test]
    async fn test_status_filter_count_matches_page() {
        let pool = test_support::memory_pool().await;
        seed_fixture(&pool).await;

        let failed = RunListQuery {
            status: Some(RunStatus::Failed),
            limit: 50,
            ..Default::default()
        };
        let (items, total) = pool.list_runs(&failed).await.unwrap();
        // 2 failed standalone runs + batch-a
        assert_eq!(total, 3);
        assert_eq!(items.len(), 3);
        assert_eq!(
            items.iter().filter(|i| i.kind == RunListKind::Batch).count(),
            1
        );
        assert!(items.iter().all(|i| i.status == RunStatus::Failed));

        let passed = RunListQuery {
            status: Some(RunStatus::Passed),
            limit: 50,
            ..Default::default()
        };
        let (items, total) = pool.list_runs(&passed).await.unwrap();
        // 1 passed standalone run + batch-b
        assert_eq!(total, 2);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_batches_collapse_into_single_rows() {
        let pool = test_support::memory_pool().await;
        seed_fixture(&pool).await;

        let all = RunListQuery {
            limit: 50,
            ..Default::default()
        };
        let (items, total) = pool.list_runs(&all).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 5);

        let batch_a = items
            .iter()
            .find(|i| i.batch_id.as_deref() == Some("batch-a"))
            .unwrap();
        assert_eq!(batch_a.status, RunStatus::Failed);
        assert_eq!(batch_a.run_count, 2);
        assert_eq!(batch_a.total_steps, 6);
        assert_eq!(batch_a.passed_steps, 5);
        assert_eq!(batch_a.failed_steps, 1);
        assert_eq!(batch_a.duration_ms, 2000);
        assert!(batch_a.name.starts_with("Release 4.2 - "));
        assert_eq!(batch_a.test_run_id, None);

        assert!(items.windows(2).all(|w| w[0].executed_at >= w[1].executed_at));
    }

    #[tokio::test]
    async fn test_pagination_keeps_full_total() {
        let pool = test_support::memory_pool().await;
        seed_fixture(&pool).await;

        let first_page = RunListQuery {
            limit: 2,
            offset: 0,
            ..Default::default()
        };
        let (items, total) = pool.list_runs(&first_page).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(total, 5);

        let last_page = RunListQuery {
            limit: 2,
            offset: 4,
            ..Default::default()
        };
        let (items, _) = pool.list_runs(&last_page).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_search_matches_batch_member_names() {
        let pool = test_support::memory_pool().await;
        seed_fixture(&pool).await;

        let query = RunListQuery {
            search: Some("REGRESSION".into()),
            limit: 50,
            ..Default::default()
        };
        let (items, total) = pool.list_runs(&query).await.unwrap();
        assert_eq!(total, 2);
        assert!(items.iter().all(|i| i.kind == RunListKind::Batch));
        // Sums still cover every member, not only the matching one
        assert!(items.iter().all(|i| i.run_count == 2));
    }

    #[tokio::test]
    async fn test_search_wildcards_match_literally() {
        let pool = test_support::memory_pool().await;
        seed_fixture(&pool).await;

        for term in ["%", "_", "Set_1", "100%"] {
            let query = RunListQuery {
                search: Some(term.into()),
                limit: 50,
                ..Default::default()
            };
            let (items, total) = pool.list_runs(&query).await.unwrap();
            assert_eq!(total, 0, "search {:?}", term);
            assert!(items.is_empty());
        }

        let query = RunListQuery {
            search: Some("set 1".into()),
            limit: 50,
            ..Default::default()
        };
        let (_, total) = pool.list_runs(&query).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_huge_offset_returns_empty_page() {
        let pool = test_support::memory_pool().await;
        seed_fixture(&pool).await;

        let query = RunListQuery {
            limit: 10,
            offset: u64::MAX,
            ..Default::default()
        };
        let (items, total) = pool.list_runs(&query).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 5);
    }
}
