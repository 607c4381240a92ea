use sea_orm::entity::prelude::*;

/// Append-only fare observation log. Rows are never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fare_snapshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub origin: String,
    pub destination: String,
    pub flight_date: String,
    pub cabin: String,
    pub program: String,
    pub miles: i64,
    pub taxes_usd: f64,
    pub flight_no: Option<String>,
    pub observed_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
