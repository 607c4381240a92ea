//! Scraper interface for award availability sources.
//!
//! Concrete program scrapers are registered into a `ScraperSet` at startup.
//! The rest of the system only sees `SearchResult` values, so a failing or
//! missing scraper degrades to an empty result with an error note.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::models::SearchResult;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request blocked by the airline site")]
    Blocked,

    #[error("response could not be parsed: {0}")]
    Malformed(String),

    #[error("request timed out")]
    Timeout,

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// One award search request. Origin and destination are IATA codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardQuery {
    pub origin: String,
    pub destination: String,
    /// Flight date, YYYY-MM-DD.
    pub date: String,
    pub cabin: Option<String>,
    pub max_stops: Option<u8>,
    /// None means all programs. "all" (any case) normalizes to None.
    pub program: Option<String>,
}

impl AwardQuery {
    #[must_use]
    pub fn new(origin: &str, destination: &str, date: &str) -> Self {
        Self {
            origin: origin.to_uppercase(),
            destination: destination.to_uppercase(),
            date: date.to_string(),
            cabin: None,
            max_stops: None,
            program: None,
        }
    }

    /// Uppercases airport codes, lowercases the program filter and collapses
    /// a literal "all" program to absence. Program names are lowercase
    /// everywhere downstream: scraper registry, cache keys, stored rules.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.origin = self.origin.to_uppercase();
        self.destination = self.destination.to_uppercase();
        self.program = self
            .program
            .take()
            .filter(|p| !p.eq_ignore_ascii_case("all"))
            .map(|p| p.to_lowercase());
        self
    }
}

#[async_trait]
pub trait AwardScraper: Send + Sync {
    /// Program this scraper serves, e.g. "alaska".
    fn program(&self) -> &str;

    async fn search(&self, query: &AwardQuery) -> Result<SearchResult, ScrapeError>;
}

/// Registry of program scrapers. Fan-out is sequential; airline endpoints
/// are rate limited and a sweep already spaces its requests.
#[derive(Clone, Default)]
pub struct ScraperSet {
    scrapers: Vec<Arc<dyn AwardScraper>>,
}

impl ScraperSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scraper: Arc<dyn AwardScraper>) {
        self.scrapers.push(scraper);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }

    /// Runs the query against every scraper matching its program filter and
    /// merges the flights. Scraper failures become error notes on the result.
    pub async fn search(&self, query: &AwardQuery) -> SearchResult {
        let mut merged = SearchResult::empty(&query.origin, &query.destination, &query.date);

        let selected: Vec<_> = self
            .scrapers
            .iter()
            .filter(|s| query.program.as_deref().is_none_or(|p| s.program() == p))
            .collect();

        if selected.is_empty() {
            let wanted = query.program.as_deref().unwrap_or("all");
            merged
                .errors
                .push(format!("no scraper registered for program '{wanted}'"));
            return merged;
        }

        for scraper in selected {
            match scraper.search(query).await {
                Ok(result) => {
                    merged.flights.extend(result.flights);
                    merged.errors.extend(result.errors);
                }
                Err(e) => {
                    warn!(
                        "Scraper {} failed for {}->{} {}: {}",
                        scraper.program(),
                        query.origin,
                        query.destination,
                        query.date,
                        e
                    );
                    merged.errors.push(format!("{}: {e}", scraper.program()));
                }
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_uppercases_and_drops_all() {
        let q = AwardQuery {
            origin: "sfo".to_string(),
            destination: "nrt".to_string(),
            date: "2026-10-01".to_string(),
            cabin: Some("business".to_string()),
            max_stops: None,
            program: Some("ALL".to_string()),
        }
        .normalized();

        assert_eq!(q.origin, "SFO");
        assert_eq!(q.destination, "NRT");
        assert_eq!(q.program, None);
    }

    #[test]
    fn normalization_lowercases_program() {
        let mut q = AwardQuery::new("SFO", "NRT", "2026-10-01");
        q.program = Some("ANA".to_string());
        assert_eq!(q.normalized().program.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn empty_registry_yields_error_note() {
        let set = ScraperSet::new();
        let result = set.search(&AwardQuery::new("SFO", "NRT", "2026-10-01")).await;
        assert!(result.flights.is_empty());
        assert_eq!(result.errors.len(), 1);
    }
}
