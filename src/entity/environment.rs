//! Environment URL entity for SeaORM.
//!
//! A row with `release_id = NULL` is the global default for that environment
//! name; a row with a release id overrides it for that release.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "environments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub release_id: Option<i32>,
    pub name: String,
    pub base_url: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
