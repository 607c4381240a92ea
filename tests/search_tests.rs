//! Search service: cache interplay, history recording and new-low detection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use milewatch::db::{CacheStore, Store};
use milewatch::models::{Flight, FlightFare, SearchResult};
use milewatch::scrapers::{AwardQuery, AwardScraper, ScrapeError, ScraperSet};
use milewatch::services::search::{SearchOptions, SearchService};

/// Scraper whose fares can be swapped between calls, with a call counter.
struct ScriptedScraper {
    fares: Mutex<Vec<FlightFare>>,
    calls: Mutex<u32>,
    fail: Mutex<bool>,
}

impl ScriptedScraper {
    fn new(fares: Vec<FlightFare>) -> Self {
        Self {
            fares: Mutex::new(fares),
            calls: Mutex::new(0),
            fail: Mutex::new(false),
        }
    }

    fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AwardScraper for ScriptedScraper {
    fn program(&self) -> &str {
        "ana"
    }

    async fn search(&self, query: &AwardQuery) -> Result<SearchResult, ScrapeError> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(ScrapeError::Timeout);
        }

        let mut result = SearchResult::empty(&query.origin, &query.destination, &query.date);
        let fares = self.fares.lock().unwrap().clone();
        if !fares.is_empty() {
            result.flights.push(Flight {
                flight_no: "NH7".to_string(),
                origin: query.origin.clone(),
                destination: query.destination.clone(),
                departure: format!("{}T11:05:00", query.date),
                arrival: format!("{}T14:15:00", query.date),
                duration_minutes: 670,
                aircraft: None,
                fares,
            });
        }
        Ok(result)
    }
}

fn business_fare(miles: i64) -> FlightFare {
    FlightFare {
        miles,
        cash: 42.5,
        cabin: "business".to_string(),
        booking_class: "I".to_string(),
        program: "ana".to_string(),
        is_saver: true,
    }
}

async fn harness(scraper: Arc<ScriptedScraper>) -> (Store, SearchService) {
    let id = uuid::Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("milewatch-search-test-{id}.db"));
    let cache_path = std::env::temp_dir().join(format!("milewatch-search-cache-{id}.db"));

    let store = Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to open store");
    let cache = CacheStore::new(
        &format!("sqlite:{}", cache_path.display()),
        chrono::Duration::hours(4),
    )
    .await
    .expect("failed to open cache store");

    let mut scrapers = ScraperSet::new();
    scrapers.register(scraper);

    let search = SearchService::new(Arc::new(scrapers), store.clone(), cache, 30);
    (store, search)
}

fn query() -> AwardQuery {
    AwardQuery::new("SFO", "NRT", "2026-10-01")
}

fn fresh() -> SearchOptions {
    SearchOptions {
        skip_cache: true,
        ..SearchOptions::default()
    }
}

#[tokio::test]
async fn second_search_is_served_from_cache() {
    let scraper = Arc::new(ScriptedScraper::new(vec![business_fare(75_000)]));
    let (store, search) = harness(Arc::clone(&scraper)).await;

    let first = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(scraper.call_count(), 1);

    let second = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(scraper.call_count(), 1);
    assert_eq!(second.result.flights.len(), 1);

    // The cache hit did not append duplicate history rows.
    let stats = store.fare_stats("SFO", "NRT", None).await.unwrap();
    assert_eq!(stats.total_records, 1);
}

#[tokio::test]
async fn skip_cache_fetches_fresh_and_refreshes_cache() {
    let scraper = Arc::new(ScriptedScraper::new(vec![business_fare(75_000)]));
    let (_store, search) = harness(Arc::clone(&scraper)).await;

    search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();

    *scraper.fares.lock().unwrap() = vec![business_fare(70_000)];
    let refetched = search.search_with_cache(&query(), &fresh()).await.unwrap();
    assert!(!refetched.cache_hit);
    assert_eq!(refetched.result.flights[0].fares[0].miles, 70_000);

    // The refreshed payload replaced the cached one.
    let cached = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(cached.cache_hit);
    assert_eq!(cached.result.flights[0].fares[0].miles, 70_000);
}

#[tokio::test]
async fn errored_empty_result_is_not_cached() {
    let scraper = Arc::new(ScriptedScraper::new(Vec::new()));
    let (_store, search) = harness(Arc::clone(&scraper)).await;

    *scraper.fail.lock().unwrap() = true;
    let failed = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(failed.result.flights.is_empty());
    assert!(!failed.result.errors.is_empty());

    // A later attempt goes back to the scraper instead of the empty cache row.
    *scraper.fail.lock().unwrap() = false;
    *scraper.fares.lock().unwrap() = vec![business_fare(75_000)];
    let retry = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(!retry.cache_hit);
    assert_eq!(retry.result.flights.len(), 1);
}

#[tokio::test]
async fn clean_empty_result_is_cached() {
    let scraper = Arc::new(ScriptedScraper::new(Vec::new()));
    let (_store, search) = harness(Arc::clone(&scraper)).await;

    let first = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(first.result.flights.is_empty());
    assert!(first.result.errors.is_empty());

    let second = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(scraper.call_count(), 1);
}

#[tokio::test]
async fn uppercase_program_filter_still_selects_scraper() {
    let scraper = Arc::new(ScriptedScraper::new(vec![business_fare(75_000)]));
    let (_store, search) = harness(Arc::clone(&scraper)).await;

    let mut q = query();
    q.program = Some("ANA".to_string());
    let outcome = search.search_with_cache(&q, &SearchOptions::default()).await.unwrap();
    assert_eq!(outcome.result.flights.len(), 1);
    assert!(outcome.result.errors.is_empty());

    // Same query spelled lowercase lands on the same cache row.
    let mut lower = query();
    lower.program = Some("ana".to_string());
    let cached = search
        .search_with_cache(&lower, &SearchOptions::default())
        .await
        .unwrap();
    assert!(cached.cache_hit);
    assert_eq!(scraper.call_count(), 1);
}

#[tokio::test]
async fn no_history_search_records_nothing() {
    let scraper = Arc::new(ScriptedScraper::new(vec![business_fare(75_000)]));
    let (store, search) = harness(Arc::clone(&scraper)).await;

    let options = SearchOptions {
        skip_cache: false,
        record_history: false,
    };
    let outcome = search.search_with_cache(&query(), &options).await.unwrap();
    assert_eq!(outcome.result.flights.len(), 1);

    let stats = store.fare_stats("SFO", "NRT", None).await.unwrap();
    assert_eq!(stats.total_records, 0);
}

#[tokio::test]
async fn new_low_is_detected_against_earlier_runs_only() {
    let scraper = Arc::new(ScriptedScraper::new(vec![business_fare(75_000)]));
    let (_store, search) = harness(Arc::clone(&scraper)).await;

    // First sighting: nothing to compare against.
    let first = search.search_with_cache(&query(), &SearchOptions::default()).await.unwrap();
    assert!(first.new_lows.is_empty());

    // Lower fare on a fresh fetch beats the recorded 75k.
    *scraper.fares.lock().unwrap() = vec![business_fare(68_000)];
    let second = search.search_with_cache(&query(), &fresh()).await.unwrap();
    assert_eq!(second.new_lows.len(), 1);
    assert_eq!(second.new_lows[0].miles, 68_000);
    assert_eq!(second.new_lows[0].previous_min, Some(75_000));
    assert!(second.new_low_for("business", "ana", 68_000).is_some());

    // Same fare again is not a new low; 68k is now on record.
    let third = search.search_with_cache(&query(), &fresh()).await.unwrap();
    assert!(third.new_lows.is_empty());
}
