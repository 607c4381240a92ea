use crate::entities::{award_cache, prelude::*};
use crate::models::SearchResult;
use crate::scrapers::AwardQuery;
use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::debug;

/// Repository for the TTL-bounded award search cache.
///
/// Expiry is lazy: an expired row reads as a miss but stays on disk until
/// `clear_expired` or `clear_all` reclaims it. There is no background sweep.
pub struct CacheRepository {
    conn: DatabaseConnection,
    ttl: chrono::Duration,
}

impl CacheRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, ttl: chrono::Duration) -> Self {
        Self { conn, ttl }
    }

    /// Canonical cache key for a normalized query.
    /// An absent program filter keys as "all" so both spellings share a row.
    #[must_use]
    pub fn make_key(query: &AwardQuery) -> String {
        let program = query.program.as_deref().unwrap_or("all");
        let cabin = query.cabin.as_deref().unwrap_or("any");
        let stops = query
            .max_stops
            .map_or_else(|| "any".to_string(), |s| s.to_string());
        format!(
            "{program}_{}_{}_{}_{cabin}_{stops}",
            query.origin.to_uppercase(),
            query.destination.to_uppercase(),
            query.date
        )
    }

    pub async fn get(&self, key: &str) -> Result<Option<SearchResult>> {
        let now = chrono::Utc::now().to_rfc3339();

        let entry = AwardCache::find()
            .filter(award_cache::Column::CacheKey.eq(key))
            .filter(award_cache::Column::ExpiresAt.gt(&now))
            .one(&self.conn)
            .await?;

        match entry {
            Some(e) => {
                let result: SearchResult = serde_json::from_str(&e.payload_json)?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, result: &SearchResult) -> Result<()> {
        let payload_json = serde_json::to_string(result)?;
        let now = chrono::Utc::now();
        let created_at = now.to_rfc3339();
        let expires_at = (now + self.ttl).to_rfc3339();

        let active_model = award_cache::ActiveModel {
            cache_key: Set(key.to_string()),
            payload_json: Set(payload_json),
            created_at: Set(created_at),
            expires_at: Set(expires_at),
            ..Default::default()
        };

        AwardCache::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(award_cache::Column::CacheKey)
                    .update_columns([
                        award_cache::Column::PayloadJson,
                        award_cache::Column::CreatedAt,
                        award_cache::Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        debug!("Cached search results for {}", key);
        Ok(())
    }

    pub async fn clear_expired(&self) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = AwardCache::delete_many()
            .filter(award_cache::Column::ExpiresAt.lt(&now))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let result = AwardCache::delete_many().exec(&self.conn).await?;
        Ok(result.rows_affected)
    }

    pub async fn info(&self) -> Result<CacheInfo> {
        let rows = AwardCache::find().all(&self.conn).await?;

        let mut info = CacheInfo::default();
        for row in rows {
            info.entries += 1;
            info.total_bytes += row.payload_json.len() as u64;

            match &info.oldest_created_at {
                Some(oldest) if *oldest <= row.created_at => {}
                _ => info.oldest_created_at = Some(row.created_at.clone()),
            }
            match &info.newest_created_at {
                Some(newest) if *newest >= row.created_at => {}
                _ => info.newest_created_at = Some(row.created_at),
            }
        }

        Ok(info)
    }
}

// ============================================================================
// Data Types
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CacheInfo {
    pub entries: u64,
    pub oldest_created_at: Option<String>,
    pub newest_created_at: Option<String>,
    pub total_bytes: u64,
}
