use crate::db::repositories::cache::CacheRepository;
use crate::db::{CacheStore, FareObservation, Store};
use crate::models::SearchResult;
use crate::scrapers::{AwardQuery, ScraperSet};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache-first award search.
///
/// Fresh fetches are compared against fare history before being recorded,
/// so a fare can only be a new low against sightings from earlier runs.
/// Cache hits record nothing; the history rows already exist.
pub struct SearchService {
    scrapers: Arc<ScraperSet>,
    store: Store,
    cache: CacheStore,
    lookback_days: i64,
}

impl SearchService {
    #[must_use]
    pub const fn new(
        scrapers: Arc<ScraperSet>,
        store: Store,
        cache: CacheStore,
        lookback_days: i64,
    ) -> Self {
        Self {
            scrapers,
            store,
            cache,
            lookback_days,
        }
    }

    pub async fn search_with_cache(
        &self,
        query: &AwardQuery,
        options: &SearchOptions,
    ) -> Result<SearchOutcome> {
        let query = query.clone().normalized();
        let key = CacheRepository::make_key(&query);

        if !options.skip_cache
            && let Some(result) = self.cache.get(&key).await?
        {
            debug!("Cache hit for {}", key);
            return Ok(SearchOutcome {
                result,
                cache_hit: true,
                new_lows: Vec::new(),
            });
        }

        let result = self.scrapers.search(&query).await;
        info!(
            event = "award_search_finished",
            origin = %result.origin,
            destination = %result.destination,
            date = %result.date,
            flights = result.flights.len(),
            scraper_errors = result.errors.len(),
            "Award search complete"
        );

        // A clean empty result is a real answer worth caching; an empty
        // result with scraper errors is not, a retry may do better.
        if !result.flights.is_empty() || result.errors.is_empty() {
            self.cache.put(&key, &result).await?;
        }

        let new_lows = self.detect_new_lows(&result).await?;

        if options.record_history {
            let observations = Self::observations(&result);
            if !observations.is_empty() {
                self.store.record_fares(&observations).await?;
            }
        }

        Ok(SearchOutcome {
            result,
            cache_hit: false,
            new_lows,
        })
    }

    /// Checks the cheapest fare of every (cabin, program) group against the
    /// windowed historical minimum for the route.
    async fn detect_new_lows(&self, result: &SearchResult) -> Result<Vec<NewLowFare>> {
        let mut group_min: BTreeMap<(String, String), i64> = BTreeMap::new();
        for flight in &result.flights {
            for fare in &flight.fares {
                group_min
                    .entry((fare.cabin.clone(), fare.program.clone()))
                    .and_modify(|m| *m = (*m).min(fare.miles))
                    .or_insert(fare.miles);
            }
        }

        let mut new_lows = Vec::new();
        for ((cabin, program), miles) in group_min {
            let check = self
                .store
                .is_new_low(
                    &result.origin,
                    &result.destination,
                    &cabin,
                    &program,
                    miles,
                    self.lookback_days,
                )
                .await?;

            if check.is_new_low {
                info!(
                    "New low for {}->{} {} ({}): {} miles (was {:?})",
                    result.origin, result.destination, cabin, program, miles, check.previous_min
                );
                new_lows.push(NewLowFare {
                    cabin,
                    program,
                    miles,
                    previous_min: check.previous_min,
                });
            }
        }

        Ok(new_lows)
    }

    fn observations(result: &SearchResult) -> Vec<FareObservation> {
        let mut observations = Vec::new();
        for flight in &result.flights {
            for fare in &flight.fares {
                observations.push(FareObservation {
                    origin: result.origin.clone(),
                    destination: result.destination.clone(),
                    flight_date: result.date.clone(),
                    cabin: fare.cabin.clone(),
                    program: fare.program.clone(),
                    miles: fare.miles,
                    taxes_usd: fare.cash,
                    flight_no: Some(flight.flight_no.clone()),
                });
            }
        }
        if observations.is_empty() && !result.errors.is_empty() {
            warn!(
                "No fares recorded for {}->{} ({} scraper errors)",
                result.origin,
                result.destination,
                result.errors.len()
            );
        }
        observations
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Caller knobs for one search. History recording is opt-out; a caller that
/// only wants a peek can suppress it.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub skip_cache: bool,
    pub record_history: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            skip_cache: false,
            record_history: true,
        }
    }
}

pub struct SearchOutcome {
    pub result: SearchResult,
    pub cache_hit: bool,
    pub new_lows: Vec<NewLowFare>,
}

impl SearchOutcome {
    /// Whether a specific fare is the new low its group just set.
    #[must_use]
    pub fn new_low_for(&self, cabin: &str, program: &str, miles: i64) -> Option<&NewLowFare> {
        self.new_lows
            .iter()
            .find(|n| n.cabin == cabin && n.program == program && n.miles == miles)
    }
}

#[derive(Debug, Clone)]
pub struct NewLowFare {
    pub cabin: String,
    pub program: String,
    pub miles: i64,
    pub previous_min: Option<i64>,
}
