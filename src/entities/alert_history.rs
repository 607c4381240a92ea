use sea_orm::entity::prelude::*;

/// Fire records: one row per alert match, kept even after the rule is deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub alert_id: i32,
    pub fingerprint: String,
    pub flight_no: Option<String>,
    pub flight_date: String,
    pub cabin: String,
    pub program: String,
    pub miles: i64,
    pub taxes_usd: f64,
    pub is_new_low: bool,
    pub previous_low_miles: Option<i64>,
    pub fired_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
