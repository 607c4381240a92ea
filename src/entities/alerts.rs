use sea_orm::entity::prelude::*;

/// Alert rules. `webhook` is the legacy single-channel column; rows written
/// before the multi-channel migration carry it and are upgraded on first read.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub origin: String,
    pub destination: String,
    pub cabin: Option<String>,
    pub program: Option<String>,
    pub max_miles: Option<i64>,
    pub webhook: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub webhooks_json: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub emails_json: Option<String>,
    pub email_config: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
