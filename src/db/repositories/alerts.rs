use crate::entities::{alert_history, alerts, email_configs, prelude::*};
use anyhow::Result;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert not found: {0}")]
    NotFound(i32),

    #[error("Email config not found: {0}")]
    ConfigNotFound(String),

    #[error("Email config '{name}' is referenced by alert(s) {rule_ids:?}")]
    ConfigInUse { name: String, rule_ids: Vec<i32> },

    #[error("Invalid alert: {0}")]
    Validation(String),
}

/// Repository for alert rules, email configs and fire records.
pub struct AlertRepository {
    conn: DatabaseConnection,
}

impl AlertRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Model Conversion Helpers
    // ========================================================================

    /// Decodes the channel columns of a stored row into an explicit version.
    /// Rows written before the multi-channel migration only carry `webhook`.
    fn stored_channels(model: &alerts::Model) -> StoredChannels {
        if model.webhooks_json.is_none() && model.emails_json.is_none() {
            return StoredChannels::Legacy {
                webhook: model.webhook.clone(),
            };
        }

        let webhooks = model
            .webhooks_json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default();
        let emails = model
            .emails_json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default();

        StoredChannels::Multi {
            webhooks,
            emails,
            email_config: model.email_config.clone(),
        }
    }

    fn map_rule_model(model: alerts::Model, channels: AlertChannels) -> AlertRule {
        AlertRule {
            id: model.id,
            origin: model.origin,
            destination: model.destination,
            cabin: model.cabin,
            program: model.program,
            max_miles: model.max_miles,
            webhooks: channels.webhooks,
            emails: channels.emails,
            email_config: channels.email_config,
            enabled: model.enabled,
            created_at: model.created_at,
        }
    }

    /// Upgrades a legacy row to the multi-channel shape and writes it back,
    /// so the legacy column is read at most once per row.
    async fn upgrade_row(&self, model: &alerts::Model, channels: &AlertChannels) -> Result<()> {
        let active_model = alerts::ActiveModel {
            id: Set(model.id),
            webhook: Set(None),
            webhooks_json: Set(Some(serde_json::to_string(&channels.webhooks)?)),
            emails_json: Set(Some(serde_json::to_string(&channels.emails)?)),
            email_config: Set(channels.email_config.clone()),
            ..Default::default()
        };
        Alerts::update(active_model).exec(&self.conn).await?;
        info!("Upgraded legacy alert #{} to multi-channel storage", model.id);
        Ok(())
    }

    async fn load_rule(&self, model: alerts::Model) -> Result<AlertRule> {
        let channels = match Self::stored_channels(&model) {
            StoredChannels::Multi {
                webhooks,
                emails,
                email_config,
            } => AlertChannels {
                webhooks,
                emails,
                email_config,
            },
            StoredChannels::Legacy { webhook } => {
                let channels = AlertChannels {
                    webhooks: webhook.into_iter().collect(),
                    emails: Vec::new(),
                    email_config: None,
                };
                if let Err(e) = self.upgrade_row(&model, &channels).await {
                    warn!("Failed to write back upgraded alert #{}: {}", model.id, e);
                }
                channels
            }
        };

        Ok(Self::map_rule_model(model, channels))
    }

    // ========================================================================
    // Alert Rule Operations
    // ========================================================================

    pub async fn add_rule(&self, rule: &NewAlertRule) -> Result<i64> {
        if let Some(max_miles) = rule.max_miles
            && max_miles <= 0
        {
            return Err(AlertError::Validation(format!(
                "max_miles must be positive, got {max_miles}"
            ))
            .into());
        }

        for webhook in &rule.webhooks {
            url::Url::parse(webhook).map_err(|e| {
                AlertError::Validation(format!("invalid webhook URL '{webhook}': {e}"))
            })?;
        }

        if let Some(name) = &rule.email_config
            && self.get_config(name).await?.is_none()
        {
            return Err(AlertError::ConfigNotFound(name.clone()).into());
        }

        let program = rule
            .program
            .as_deref()
            .filter(|p| !p.eq_ignore_ascii_case("all"))
            .map(str::to_lowercase);

        let active_model = alerts::ActiveModel {
            origin: Set(rule.origin.to_uppercase()),
            destination: Set(rule.destination.to_uppercase()),
            cabin: Set(rule.cabin.clone()),
            program: Set(program),
            max_miles: Set(rule.max_miles),
            webhook: Set(None),
            webhooks_json: Set(Some(serde_json::to_string(&rule.webhooks)?)),
            emails_json: Set(Some(serde_json::to_string(&rule.emails)?)),
            email_config: Set(rule.email_config.clone()),
            enabled: Set(true),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let res = Alerts::insert(active_model).exec(&self.conn).await?;
        info!(
            "Alert #{} created: {}->{}",
            res.last_insert_id, rule.origin, rule.destination
        );
        Ok(i64::from(res.last_insert_id))
    }

    pub async fn get_rule(&self, id: i32) -> Result<Option<AlertRule>> {
        match Alerts::find_by_id(id).one(&self.conn).await? {
            Some(model) => Ok(Some(self.load_rule(model).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_rules(&self, include_disabled: bool) -> Result<Vec<AlertRule>> {
        let mut query = Alerts::find().order_by_asc(alerts::Column::Id);
        if !include_disabled {
            query = query.filter(alerts::Column::Enabled.eq(true));
        }

        let models = query.all(&self.conn).await?;
        let mut rules = Vec::with_capacity(models.len());
        for model in models {
            rules.push(self.load_rule(model).await?);
        }
        Ok(rules)
    }

    /// Hard delete. Fire records for the rule are kept as audit trail.
    pub async fn remove_rule(&self, id: i32) -> Result<()> {
        let result = Alerts::delete_by_id(id).exec(&self.conn).await?;
        if result.rows_affected == 0 {
            return Err(AlertError::NotFound(id).into());
        }
        Ok(())
    }

    pub async fn set_rule_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        let result = Alerts::update_many()
            .col_expr(
                alerts::Column::Enabled,
                sea_orm::sea_query::Expr::value(enabled),
            )
            .filter(alerts::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AlertError::NotFound(id).into());
        }
        Ok(())
    }

    // ========================================================================
    // Email Config Operations
    // ========================================================================

    pub async fn add_config(&self, config: &EmailConfig) -> Result<()> {
        let active_model = email_configs::ActiveModel {
            name: Set(config.name.clone()),
            smtp_host: Set(config.smtp_host.clone()),
            smtp_port: Set(i32::from(config.smtp_port)),
            username: Set(config.username.clone()),
            password: Set(config.password.clone()),
            from_addr: Set(config.from_addr.clone()),
            use_tls: Set(config.use_tls),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        EmailConfigs::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(email_configs::Column::Name)
                    .update_columns([
                        email_configs::Column::SmtpHost,
                        email_configs::Column::SmtpPort,
                        email_configs::Column::Username,
                        email_configs::Column::Password,
                        email_configs::Column::FromAddr,
                        email_configs::Column::UseTls,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        info!("Email config '{}' saved", config.name);
        Ok(())
    }

    /// Full config including the password, for dispatch.
    pub async fn get_config(&self, name: &str) -> Result<Option<EmailConfig>> {
        let model = EmailConfigs::find()
            .filter(email_configs::Column::Name.eq(name))
            .one(&self.conn)
            .await?;

        Ok(model.map(|m| EmailConfig {
            name: m.name,
            smtp_host: m.smtp_host,
            smtp_port: m.smtp_port as u16,
            username: m.username,
            password: m.password,
            from_addr: m.from_addr,
            use_tls: m.use_tls,
        }))
    }

    /// Listing redacts passwords; only dispatch needs credentials.
    pub async fn list_configs(&self) -> Result<Vec<EmailConfig>> {
        let models = EmailConfigs::find()
            .order_by_asc(email_configs::Column::Name)
            .all(&self.conn)
            .await?;

        Ok(models
            .into_iter()
            .map(|m| EmailConfig {
                name: m.name,
                smtp_host: m.smtp_host,
                smtp_port: m.smtp_port as u16,
                username: m.username,
                password: "***".to_string(),
                from_addr: m.from_addr,
                use_tls: m.use_tls,
            })
            .collect())
    }

    /// Refuses to delete a config any rule still points at; a silently
    /// orphaned rule would only fail later, at dispatch time.
    pub async fn remove_config(&self, name: &str) -> Result<()> {
        let referencing: Vec<i32> = Alerts::find()
            .filter(alerts::Column::EmailConfig.eq(name))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        if !referencing.is_empty() {
            return Err(AlertError::ConfigInUse {
                name: name.to_string(),
                rule_ids: referencing,
            }
            .into());
        }

        let result = EmailConfigs::delete_many()
            .filter(email_configs::Column::Name.eq(name))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AlertError::ConfigNotFound(name.to_string()).into());
        }
        Ok(())
    }

    // ========================================================================
    // Fire Record Operations
    // ========================================================================

    pub async fn record_fire(&self, fire: &FireRecord) -> Result<()> {
        let active_model = alert_history::ActiveModel {
            alert_id: Set(fire.alert_id),
            fingerprint: Set(fire.fingerprint.clone()),
            flight_no: Set(fire.flight_no.clone()),
            flight_date: Set(fire.flight_date.clone()),
            cabin: Set(fire.cabin.clone()),
            program: Set(fire.program.clone()),
            miles: Set(fire.miles),
            taxes_usd: Set(fire.taxes_usd),
            is_new_low: Set(fire.is_new_low),
            previous_low_miles: Set(fire.previous_low_miles),
            fired_at: Set(fire.fired_at.clone()),
            ..Default::default()
        };

        AlertHistory::insert(active_model).exec(&self.conn).await?;
        Ok(())
    }

    pub async fn recently_fired(
        &self,
        alert_id: i32,
        fingerprint: &str,
        since: &str,
    ) -> Result<bool> {
        let count = AlertHistory::find()
            .filter(alert_history::Column::AlertId.eq(alert_id))
            .filter(alert_history::Column::Fingerprint.eq(fingerprint))
            .filter(alert_history::Column::FiredAt.gte(since))
            .count(&self.conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn fire_history(
        &self,
        alert_id: Option<i32>,
        limit: u64,
    ) -> Result<Vec<FireRecord>> {
        let mut query = AlertHistory::find()
            .order_by_desc(alert_history::Column::FiredAt)
            .limit(limit);

        if let Some(id) = alert_id {
            query = query.filter(alert_history::Column::AlertId.eq(id));
        }

        let models = query.all(&self.conn).await?;
        Ok(models
            .into_iter()
            .map(|m| FireRecord {
                alert_id: m.alert_id,
                fingerprint: m.fingerprint,
                flight_no: m.flight_no,
                flight_date: m.flight_date,
                cabin: m.cabin,
                program: m.program,
                miles: m.miles,
                taxes_usd: m.taxes_usd,
                is_new_low: m.is_new_low,
                previous_low_miles: m.previous_low_miles,
                fired_at: m.fired_at,
            })
            .collect())
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Channel columns of a stored alert row, versioned so the legacy shape is
/// handled in one place instead of leaking into rule logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredChannels {
    Legacy {
        webhook: Option<String>,
    },
    Multi {
        webhooks: Vec<String>,
        emails: Vec<String>,
        email_config: Option<String>,
    },
}

#[derive(Debug, Clone, Default)]
struct AlertChannels {
    webhooks: Vec<String>,
    emails: Vec<String>,
    email_config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: i32,
    pub origin: String,
    pub destination: String,
    pub cabin: Option<String>,
    pub program: Option<String>,
    pub max_miles: Option<i64>,
    pub webhooks: Vec<String>,
    pub emails: Vec<String>,
    pub email_config: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

impl AlertRule {
    #[must_use]
    pub fn route(&self) -> String {
        format!("{} -> {}", self.origin, self.destination)
    }

    #[must_use]
    pub fn description(&self) -> String {
        let mut parts = vec![self.route()];
        if let Some(cabin) = &self.cabin {
            parts.push(cabin.clone());
        }
        if let Some(max) = self.max_miles {
            parts.push(format!("<= {max} miles"));
        }
        if let Some(program) = &self.program {
            parts.push(format!("({program})"));
        }
        parts.join(" | ")
    }

    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.webhooks.is_empty() || !self.emails.is_empty()
    }
}

/// Input for creating an alert rule.
#[derive(Debug, Clone, Default)]
pub struct NewAlertRule {
    pub origin: String,
    pub destination: String,
    pub cabin: Option<String>,
    pub program: Option<String>,
    pub max_miles: Option<i64>,
    pub webhooks: Vec<String>,
    pub emails: Vec<String>,
    pub email_config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub name: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_addr: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct FireRecord {
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
