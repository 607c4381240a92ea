//! Alert sweep end-to-end against a scripted scraper and a mock notifier.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use milewatch::db::{CacheStore, EmailConfig, FareObservation, NewAlertRule, Store};
use milewatch::models::{Flight, FlightFare, SearchResult};
use milewatch::scrapers::{AwardQuery, AwardScraper, ScrapeError, ScraperSet};
use milewatch::services::engine::{AlertEngine, SweepOptions};
use milewatch::services::notify::{NotificationPayload, NotificationSender};
use milewatch::services::search::SearchService;

struct FixedScraper {
    date: String,
    fares: Vec<FlightFare>,
}

#[async_trait]
impl AwardScraper for FixedScraper {
    fn program(&self) -> &str {
        "ana"
    }

    async fn search(&self, query: &AwardQuery) -> Result<SearchResult, ScrapeError> {
        let mut result = SearchResult::empty(&query.origin, &query.destination, &query.date);
        if query.date == self.date {
            result.flights.push(Flight {
                flight_no: "NH7".to_string(),
                origin: query.origin.clone(),
                destination: query.destination.clone(),
                departure: format!("{}T11:05:00", query.date),
                arrival: format!("{}T14:15:00", query.date),
                duration_minutes: 670,
                aircraft: Some("77W".to_string()),
                fares: self.fares.clone(),
            });
        }
        Ok(result)
    }
}

#[derive(Default)]
struct MockNotifier {
    webhook_calls: Mutex<Vec<String>>,
    email_calls: Mutex<Vec<String>>,
    failing_urls: HashSet<String>,
}

#[async_trait]
impl NotificationSender for MockNotifier {
    async fn send_webhook(&self, url: &str, _payload: &NotificationPayload) -> anyhow::Result<()> {
        self.webhook_calls.lock().unwrap().push(url.to_string());
        if self.failing_urls.contains(url) {
            anyhow::bail!("simulated delivery failure");
        }
        Ok(())
    }

    async fn send_email(
        &self,
        _config: &EmailConfig,
        to: &str,
        _payload: &NotificationPayload,
    ) -> anyhow::Result<()> {
        self.email_calls.lock().unwrap().push(to.to_string());
        Ok(())
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

fn today() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

async fn harness(
    fares: Vec<FlightFare>,
    notifier: Arc<MockNotifier>,
) -> (Store, AlertEngine) {
    let id = uuid::Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("milewatch-engine-test-{id}.db"));
    let cache_path = std::env::temp_dir().join(format!("milewatch-engine-cache-{id}.db"));

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
    scrapers.register(Arc::new(FixedScraper {
        date: today(),
        fares,
    }));

    let search = Arc::new(SearchService::new(
        Arc::new(scrapers),
        store.clone(),
        cache,
        30,
    ));
    let engine = AlertEngine::new(store.clone(), search, notifier);
    (store, engine)
}

fn sweep_options(dry_run: bool) -> SweepOptions {
    SweepOptions {
        dry_run,
        lookahead_days: 1,
        dedup_window: chrono::Duration::hours(24),
    }
}

fn rule_with_webhooks(webhooks: Vec<String>) -> NewAlertRule {
    NewAlertRule {
        origin: "SFO".to_string(),
        destination: "NRT".to_string(),
        cabin: Some("business".to_string()),
        program: None,
        max_miles: Some(80_000),
        webhooks,
        emails: Vec::new(),
        email_config: None,
    }
}

fn smtp_config(name: &str) -> EmailConfig {
    EmailConfig {
        name: name.to_string(),
        smtp_host: "smtp.example.com".to_string(),
        smtp_port: 587,
        username: "alerts@example.com".to_string(),
        password: "hunter2".to_string(),
        from_addr: "alerts@example.com".to_string(),
        use_tls: true,
    }
}

#[tokio::test]
async fn matching_fare_fires_and_notifies() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    let id = store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/a".to_string(),
        ]))
        .await
        .unwrap() as i32;

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();

    assert_eq!(summary.rules_evaluated, 1);
    assert_eq!(summary.matches_found, 1);
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(summary.channel_failures, 0);
    assert_eq!(notifier.webhook_calls.lock().unwrap().len(), 1);

    let fires = store.alert_fire_history(Some(id), 50).await.unwrap();
    assert_eq!(fires.len(), 1);
    assert_eq!(fires[0].miles, 75_000);
}

#[tokio::test]
async fn second_sweep_is_deduplicated() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    let id = store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/a".to_string(),
        ]))
        .await
        .unwrap() as i32;

    engine.run_sweep(&sweep_options(false)).await.unwrap();
    let second = engine.run_sweep(&sweep_options(false)).await.unwrap();

    assert_eq!(second.matches_found, 0);
    assert_eq!(second.deduplicated, 1);
    assert_eq!(second.notifications_sent, 0);

    let fires = store.alert_fire_history(Some(id), 50).await.unwrap();
    assert_eq!(fires.len(), 1);
}

#[tokio::test]
async fn partial_channel_failure_still_records_one_fire() {
    let notifier = Arc::new(MockNotifier {
        failing_urls: HashSet::from(["https://hooks.example.com/bad".to_string()]),
        ..Default::default()
    });
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    let id = store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/bad".to_string(),
            "https://hooks.example.com/good".to_string(),
        ]))
        .await
        .unwrap() as i32;

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();

    assert_eq!(summary.matches_found, 1);
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(summary.channel_failures, 1);

    // One fire record for the match, whatever the channels did.
    let fires = store.alert_fire_history(Some(id), 50).await.unwrap();
    assert_eq!(fires.len(), 1);
}

#[tokio::test]
async fn failing_webhook_does_not_starve_email_channel() {
    let notifier = Arc::new(MockNotifier {
        failing_urls: HashSet::from(["https://hooks.example.com/bad".to_string()]),
        ..Default::default()
    });
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    store.add_email_config(&smtp_config("gmail")).await.unwrap();
    let mut rule = rule_with_webhooks(vec!["https://hooks.example.com/bad".to_string()]);
    rule.emails = vec!["me@example.com".to_string()];
    rule.email_config = Some("gmail".to_string());
    let id = store.add_alert(&rule).await.unwrap() as i32;

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();

    assert_eq!(summary.matches_found, 1);
    assert_eq!(summary.channel_failures, 1);
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(
        *notifier.email_calls.lock().unwrap(),
        vec!["me@example.com".to_string()]
    );

    let fires = store.alert_fire_history(Some(id), 50).await.unwrap();
    assert_eq!(fires.len(), 1);
}

#[tokio::test]
async fn emails_without_config_count_as_channel_failures() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    let mut rule = rule_with_webhooks(Vec::new());
    rule.emails = vec!["me@example.com".to_string()];
    let id = store.add_alert(&rule).await.unwrap() as i32;

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();

    assert_eq!(summary.matches_found, 1);
    assert_eq!(summary.notifications_sent, 0);
    assert_eq!(summary.channel_failures, 1);
    assert!(notifier.email_calls.lock().unwrap().is_empty());

    // The match itself is still on record.
    assert_eq!(store.alert_fire_history(Some(id), 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn new_low_match_is_flagged_on_fire_record() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    // Prior sighting at 85k makes today's 75k fare a new low.
    store
        .record_fares(&[FareObservation {
            origin: "SFO".to_string(),
            destination: "NRT".to_string(),
            flight_date: today(),
            cabin: "business".to_string(),
            program: "ana".to_string(),
            miles: 85_000,
            taxes_usd: 42.5,
            flight_no: Some("NH7".to_string()),
        }])
        .await
        .unwrap();

    let id = store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/a".to_string(),
        ]))
        .await
        .unwrap() as i32;

    engine.run_sweep(&sweep_options(false)).await.unwrap();

    let fires = store.alert_fire_history(Some(id), 50).await.unwrap();
    assert_eq!(fires.len(), 1);
    assert!(fires[0].is_new_low);
    assert_eq!(fires[0].previous_low_miles, Some(85_000));
}

#[tokio::test]
async fn dry_run_writes_nothing_and_repeats() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/a".to_string(),
        ]))
        .await
        .unwrap();

    let first = engine.run_sweep(&sweep_options(true)).await.unwrap();
    let second = engine.run_sweep(&sweep_options(true)).await.unwrap();

    assert_eq!(first.matches_found, 1);
    assert_eq!(second.matches_found, 1);
    assert_eq!(first.notifications_sent, 0);
    assert!(notifier.webhook_calls.lock().unwrap().is_empty());
    assert!(store.alert_fire_history(None, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn fare_above_max_miles_does_not_match() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(95_000)], Arc::clone(&notifier)).await;

    store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/a".to_string(),
        ]))
        .await
        .unwrap();

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();
    assert_eq!(summary.matches_found, 0);
    assert!(store.alert_fire_history(None, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn match_without_channels_is_recorded_and_counted() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    let id = store
        .add_alert(&rule_with_webhooks(Vec::new()))
        .await
        .unwrap() as i32;

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();

    assert_eq!(summary.matches_found, 1);
    assert_eq!(summary.no_channel_matches, 1);
    assert_eq!(summary.notifications_sent, 0);
    assert_eq!(store.alert_fire_history(Some(id), 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn disabled_rules_are_skipped() {
    let notifier = Arc::new(MockNotifier::default());
    let (store, engine) = harness(vec![business_fare(75_000)], Arc::clone(&notifier)).await;

    let id = store
        .add_alert(&rule_with_webhooks(vec![
            "https://hooks.example.com/a".to_string(),
        ]))
        .await
        .unwrap() as i32;
    store.set_alert_enabled(id, false).await.unwrap();

    let summary = engine.run_sweep(&sweep_options(false)).await.unwrap();
    assert_eq!(summary.rules_evaluated, 0);
    assert_eq!(summary.matches_found, 0);
}
