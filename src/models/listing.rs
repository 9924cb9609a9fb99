//! Combined run listing models (standalone runs and batches as single rows).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::RunStatus;

fn default_limit() -> u64 {
    20
}

/// Query parameters for the combined run listing.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunListQuery {
    /// Filter by status; batches are matched on their derived status.
    pub status: Option<RunStatus>,
    #[serde(alias = "release_id")]
    pub release_id: Option<i32>,
    /// Only rows executed at or after this time (ISO 8601).
    #[serde(alias = "from_date")]
    pub from_date: Option<DateTime<Utc>>,
    /// Only rows executed at or before this time (ISO 8601).
    #[serde(alias = "to_date")]
    pub to_date: Option<DateTime<Utc>>,
    /// Case-insensitive match on test-set name or release number.
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

impl RunListQuery {
    pub fn clamped_limit(&self) -> u64 {
        self.limit.clamp(1, 100)
    }

    /// Search term wrapped for LIKE matching, None when blank. Wildcards and
    /// backslashes in the term are escaped for `ESCAPE '\\'`.
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let mut escaped = String::with_capacity(s.len() + 2);
                for c in s.to_lowercase().chars() {
                    if matches!(c, '%' | '_' | '\\') {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
                format!("%{}%", escaped)
            })
    }

    /// Offset as a SQL bind value; out-of-range offsets saturate.
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

/// Kind of a listing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunListKind {
    Run,
    Batch,
}

/// One row of the combined listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunListItem {
    pub kind: RunListKind,
    /// Set for standalone runs.
    pub test_run_id: Option<i32>,
    /// Set for batches.
    pub batch_id: Option<String>,
    pub name: String,
    pub release_id: i32,
    pub release_number: String,
    pub status: RunStatus,
    pub environment: String,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub total_scenarios: i64,
    pub total_steps: i64,
    pub passed_steps: i64,
    pub failed_steps: i64,
    pub run_count: i64,
}

/// Paginated combined listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunListResponse {
    pub items: Vec<RunListItem>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Display name of a batch: release number plus the formatted start time.
pub fn batch_display_name(release_number: &str, started_at: DateTime<Utc>) -> String {
    format!(
        "Release {} - {}",
        release_number,
        started_at.format("%Y-%m-%d %H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_limit_is_clamped() {
        let mut query = RunListQuery {
            limit: 500,
            ..Default::default()
        };
        assert_eq!(query.clamped_limit(), 100);
        query.limit = 0;
        assert_eq!(query.clamped_limit(), 1);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let query = RunListQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_pattern(), None);

        let query = RunListQuery {
            search: Some("Login".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_pattern().as_deref(), Some("%login%"));
    }

    #[test]
    fn test_search_wildcards_are_escaped() {
        let query = RunListQuery {
            search: Some(r"100%_A\b".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_pattern().as_deref(), Some(r"%100\%\_a\\b%"));
    }

    #[test]
    fn test_offset_saturates() {
        let query = RunListQuery {
            offset: u64::MAX,
            ..Default::default()
        };
        assert_eq!(query.sql_offset(), i64::MAX);
    }

    #[test]
    fn test_batch_display_name() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 17, 3, 59).unwrap();
        assert_eq!(batch_display_name("3.1.0", at), "Release 3.1.0 - 2026-01-05 17:03");
    }
}
