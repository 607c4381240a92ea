use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FareSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FareSnapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FareSnapshots::Origin).string().not_null())
                    .col(
                        ColumnDef::new(FareSnapshots::Destination)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FareSnapshots::FlightDate)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FareSnapshots::Cabin).string().not_null())
                    .col(ColumnDef::new(FareSnapshots::Program).string().not_null())
                    .col(
                        ColumnDef::new(FareSnapshots::Miles)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FareSnapshots::TaxesUsd).double().not_null())
                    .col(ColumnDef::new(FareSnapshots::FlightNo).string())
                    .col(
                        ColumnDef::new(FareSnapshots::ObservedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fare_snapshots_route")
                    .table(FareSnapshots::Table)
                    .col(FareSnapshots::Origin)
                    .col(FareSnapshots::Destination)
                    .col(FareSnapshots::FlightDate)
                    .col(FareSnapshots::Cabin)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alerts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alerts::Origin).string().not_null())
                    .col(ColumnDef::new(Alerts::Destination).string().not_null())
                    .col(ColumnDef::new(Alerts::Cabin).string())
                    .col(ColumnDef::new(Alerts::Program).string())
                    .col(ColumnDef::new(Alerts::MaxMiles).big_integer())
                    .col(ColumnDef::new(Alerts::Webhook).string())
                    .col(
                        ColumnDef::new(Alerts::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailConfigs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailConfigs::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(EmailConfigs::SmtpHost).string().not_null())
                    .col(ColumnDef::new(EmailConfigs::SmtpPort).integer().not_null())
                    .col(ColumnDef::new(EmailConfigs::Username).string().not_null())
                    .col(ColumnDef::new(EmailConfigs::Password).string().not_null())
                    .col(ColumnDef::new(EmailConfigs::FromAddr).string().not_null())
                    .col(
                        ColumnDef::new(EmailConfigs::UseTls)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(EmailConfigs::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertHistory::AlertId).integer().not_null())
                    .col(
                        ColumnDef::new(AlertHistory::Fingerprint)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertHistory::FlightNo).string())
                    .col(
                        ColumnDef::new(AlertHistory::FlightDate)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertHistory::Cabin).string().not_null())
                    .col(ColumnDef::new(AlertHistory::Program).string().not_null())
                    .col(
                        ColumnDef::new(AlertHistory::Miles)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertHistory::TaxesUsd).double().not_null())
                    .col(
                        ColumnDef::new(AlertHistory::IsNewLow)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(AlertHistory::PreviousLowMiles).big_integer())
                    .col(
                        ColumnDef::new(AlertHistory::FiredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alert_history_dedup")
                    .table(AlertHistory::Table)
                    .col(AlertHistory::AlertId)
                    .col(AlertHistory::Fingerprint)
                    .col(AlertHistory::FiredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlertHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailConfigs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FareSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FareSnapshots {
    Table,
    Id,
    Origin,
    Destination,
    FlightDate,
    Cabin,
    Program,
    Miles,
    TaxesUsd,
    FlightNo,
    ObservedAt,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    Origin,
    Destination,
    Cabin,
    Program,
    MaxMiles,
    Webhook,
    Enabled,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmailConfigs {
    Table,
    Id,
    Name,
    SmtpHost,
    SmtpPort,
    Username,
    Password,
    FromAddr,
    UseTls,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AlertHistory {
    Table,
    Id,
    AlertId,
    Fingerprint,
    FlightNo,
    FlightDate,
    Cabin,
    Program,
    Miles,
    TaxesUsd,
    IsNewLow,
    PreviousLowMiles,
    FiredAt,
}
