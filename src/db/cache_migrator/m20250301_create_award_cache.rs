use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AwardCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AwardCache::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AwardCache::CacheKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AwardCache::PayloadJson).text().not_null())
                    .col(
                        ColumnDef::new(AwardCache::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(AwardCache::ExpiresAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_award_cache_expires")
                    .table(AwardCache::Table)
                    .col(AwardCache::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AwardCache::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AwardCache {
    Table,
    Id,
    CacheKey,
    PayloadJson,
    CreatedAt,
    ExpiresAt,
}
