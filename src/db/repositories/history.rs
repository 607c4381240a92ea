use crate::entities::{fare_snapshots, prelude::*};
use anyhow::Result;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Repository for the append-only fare history log.
pub struct HistoryRepository {
    conn: DatabaseConnection,
}

impl HistoryRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts every observation in one transaction. Duplicates are expected
    /// and kept; repeated sightings are what make the trend data useful.
    pub async fn record(&self, observations: &[FareObservation]) -> Result<usize> {
        if observations.is_empty() {
            return Ok(0);
        }

        let observed_at = chrono::Utc::now().to_rfc3339();
        let txn = self.conn.begin().await?;

        for obs in observations {
            let active_model = fare_snapshots::ActiveModel {
                origin: Set(obs.origin.to_uppercase()),
                destination: Set(obs.destination.to_uppercase()),
                flight_date: Set(obs.flight_date.clone()),
                cabin: Set(obs.cabin.clone()),
                program: Set(obs.program.clone()),
                miles: Set(obs.miles),
                taxes_usd: Set(obs.taxes_usd),
                flight_no: Set(obs.flight_no.clone()),
                observed_at: Set(observed_at.clone()),
                ..Default::default()
            };
            FareSnapshots::insert(active_model).exec(&txn).await?;
        }

        txn.commit().await?;
        debug!("Recorded {} fare snapshots", observations.len());
        Ok(observations.len())
    }

    /// Aggregated price history for a route, grouped by
    /// (flight_date, cabin, program), chronological by flight date.
    pub async fn trend(
        &self,
        origin: &str,
        destination: &str,
        cabin: Option<&str>,
        lookback_days: i64,
    ) -> Result<Vec<TrendPoint>> {
        let since = (chrono::Utc::now() - chrono::Duration::days(lookback_days)).to_rfc3339();

        let mut query = FareSnapshots::find()
            .filter(fare_snapshots::Column::Origin.eq(origin.to_uppercase()))
            .filter(fare_snapshots::Column::Destination.eq(destination.to_uppercase()))
            .filter(fare_snapshots::Column::ObservedAt.gte(since));

        if let Some(cabin) = cabin {
            query = query.filter(fare_snapshots::Column::Cabin.eq(cabin));
        }

        let rows = query
            .order_by_asc(fare_snapshots::Column::FlightDate)
            .all(&self.conn)
            .await?;

        let mut groups: BTreeMap<(String, String, String), TrendAccumulator> = BTreeMap::new();
        for row in rows {
            let key = (
                row.flight_date.clone(),
                row.cabin.clone(),
                row.program.clone(),
            );
            let acc = groups.entry(key).or_default();
            acc.min_miles = match acc.min_miles {
                Some(min) => Some(min.min(row.miles)),
                None => Some(row.miles),
            };
            acc.taxes_sum += row.taxes_usd;
            acc.sample_count += 1;
            if row.observed_at > acc.last_seen {
                acc.last_seen = row.observed_at;
            }
        }

        Ok(groups
            .into_iter()
            .map(|((flight_date, cabin, program), acc)| TrendPoint {
                flight_date,
                cabin,
                program,
                min_miles: acc.min_miles.unwrap_or_default(),
                avg_taxes: acc.taxes_sum / f64::from(acc.sample_count),
                sample_count: acc.sample_count,
                last_seen: acc.last_seen,
            })
            .collect())
    }

    /// Summary statistics across all recorded snapshots for a route.
    /// An empty route yields a zero-count summary, never an error.
    pub async fn stats(
        &self,
        origin: &str,
        destination: &str,
        cabin: Option<&str>,
    ) -> Result<RouteStats> {
        let mut query = FareSnapshots::find()
            .filter(fare_snapshots::Column::Origin.eq(origin.to_uppercase()))
            .filter(fare_snapshots::Column::Destination.eq(destination.to_uppercase()));

        if let Some(cabin) = cabin {
            query = query.filter(fare_snapshots::Column::Cabin.eq(cabin));
        }

        let rows = query.all(&self.conn).await?;

        let mut stats = RouteStats::default();
        let mut miles_sum: i64 = 0;
        let mut dates: BTreeSet<String> = BTreeSet::new();

        for row in &rows {
            stats.total_records += 1;
            miles_sum += row.miles;
            stats.min_miles = Some(stats.min_miles.map_or(row.miles, |m| m.min(row.miles)));
            stats.max_miles = Some(stats.max_miles.map_or(row.miles, |m| m.max(row.miles)));
            dates.insert(row.flight_date.clone());

            match &stats.first_seen {
                Some(first) if *first <= row.observed_at => {}
                _ => stats.first_seen = Some(row.observed_at.clone()),
            }
            match &stats.last_seen {
                Some(last) if *last >= row.observed_at => {}
                _ => stats.last_seen = Some(row.observed_at.clone()),
            }
        }

        if stats.total_records > 0 {
            #[allow(clippy::cast_precision_loss)]
            let avg = miles_sum as f64 / stats.total_records as f64;
            stats.avg_miles = Some(avg.round() as i64);
        }
        stats.unique_flight_dates = dates.len() as u64;

        Ok(stats)
    }

    /// Compares a candidate fare against the windowed minimum for the same
    /// (route, cabin, program). Strictly-less-than; with no prior rows there
    /// is nothing to beat, so the answer is no.
    pub async fn is_new_low(
        &self,
        origin: &str,
        destination: &str,
        cabin: &str,
        program: &str,
        candidate_miles: i64,
        lookback_days: i64,
    ) -> Result<NewLowCheck> {
        let since = (chrono::Utc::now() - chrono::Duration::days(lookback_days)).to_rfc3339();

        let rows = FareSnapshots::find()
            .filter(fare_snapshots::Column::Origin.eq(origin.to_uppercase()))
            .filter(fare_snapshots::Column::Destination.eq(destination.to_uppercase()))
            .filter(fare_snapshots::Column::Cabin.eq(cabin))
            .filter(fare_snapshots::Column::Program.eq(program))
            .filter(fare_snapshots::Column::ObservedAt.gte(since))
            .all(&self.conn)
            .await?;

        let previous_min = rows.iter().map(|r| r.miles).min();

        Ok(NewLowCheck {
            is_new_low: previous_min.is_some_and(|min| candidate_miles < min),
            previous_min,
        })
    }

    /// Deletes history for one route, or everything when no route is given.
    pub async fn clear(&self, route: Option<(&str, &str)>) -> Result<u64> {
        let mut delete = FareSnapshots::delete_many();
        if let Some((origin, destination)) = route {
            delete = delete
                .filter(fare_snapshots::Column::Origin.eq(origin.to_uppercase()))
                .filter(fare_snapshots::Column::Destination.eq(destination.to_uppercase()));
        }
        let result = delete.exec(&self.conn).await?;
        Ok(result.rows_affected)
    }
}

#[derive(Default)]
struct TrendAccumulator {
    min_miles: Option<i64>,
    taxes_sum: f64,
    sample_count: u32,
    last_seen: String,
}

// ============================================================================
// Data Types
// ============================================================================

/// One fare sighting, as recorded by a search.
#[derive(Debug, Clone)]
pub struct FareObservation {
    pub origin: String,
    pub destination: String,
    pub flight_date: String,
    pub cabin: String,
    pub program: String,
    pub miles: i64,
    pub taxes_usd: f64,
    pub flight_no: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TrendPoint {
    pub flight_date: String,
    pub cabin: String,
    pub program: String,
    pub min_miles: i64,
    pub avg_taxes: f64,
    pub sample_count: u32,
    pub last_seen: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteStats {
    pub total_records: u64,
    pub min_miles: Option<i64>,
    pub max_miles: Option<i64>,
    pub avg_miles: Option<i64>,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub unique_flight_dates: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewLowCheck {
    pub is_new_low: bool,
    pub previous_min: Option<i64>,
}
