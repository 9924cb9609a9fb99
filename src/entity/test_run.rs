//! Test run entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Shared by sibling runs started by one "run all" request; NULL for standalone runs
    pub batch_id: Option<String>,
    pub release_id: i32,
    pub test_set_id: i32,
    pub test_set_name: String,
    /// running, passed, failed
    pub status: String,
    pub environment: String,
    pub base_url: String,
    pub executed_by: String,
    pub executed_at: DateTimeUtc,
    pub duration_ms: i64,
    pub total_scenarios: i32,
    pub total_steps: i32,
    pub passed_steps: i32,
    pub failed_steps: i32,
    /// Ordered list of `FailedDetail` records
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub failed_details: Option<JsonValue>,
    pub video_path: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::release::Entity",
        from = "Column::ReleaseId",
        to = "super::release::Column::Id"
    )]
    Release,
    #[sea_orm(has_many = "super::test_run_step::Entity")]
    Steps,
}

impl Related<super::release::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Release.def()
    }
}

impl Related<super::test_run_step::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Steps.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
