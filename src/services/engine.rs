use crate::db::{AlertRule, FireRecord, Store};
use crate::models::{Flight, FlightFare};
use crate::scrapers::AwardQuery;
use crate::services::notify::{NotificationPayload, NotificationSender};
use crate::services::search::{SearchOptions, SearchService};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluates alert rules against upcoming award availability and pushes
/// matches to the rule's channels.
pub struct AlertEngine {
    store: Store,
    search: Arc<SearchService>,
    sender: Arc<dyn NotificationSender>,
}

impl AlertEngine {
    #[must_use]
    pub fn new(
        store: Store,
        search: Arc<SearchService>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            store,
            search,
            sender,
        }
    }

    /// One full pass over all enabled rules.
    ///
    /// A matched fare produces exactly one fire record, however many of its
    /// channels succeed or fail. A dry run stops after dedup and new-low
    /// checks: nothing is dispatched and nothing is written, so running it
    /// twice gives the same answer.
    pub async fn run_sweep(&self, options: &SweepOptions) -> Result<SweepSummary> {
        let start = std::time::Instant::now();
        let rules = self.store.list_alerts(false).await?;
        info!(
            "Sweeping {} active alert rule(s), {} day look-ahead{}",
            rules.len(),
            options.lookahead_days,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let mut summary = SweepSummary::default();

        for rule in rules {
            summary.rules_evaluated += 1;
            if let Err(e) = self.sweep_rule(&rule, options, &mut summary).await {
                warn!(alert_id = rule.id, error = %e, "Error sweeping alert rule");
                summary.fetch_failures += 1;
            }
        }

        info!(
            event = "alert_sweep_finished",
            rules_evaluated = summary.rules_evaluated,
            matches_found = summary.matches_found,
            notifications_sent = summary.notifications_sent,
            channel_failures = summary.channel_failures,
            deduplicated = summary.deduplicated,
            fetch_failures = summary.fetch_failures,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Alert sweep complete"
        );

        Ok(summary)
    }

    async fn sweep_rule(
        &self,
        rule: &AlertRule,
        options: &SweepOptions,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        debug!("Sweeping alert #{}: {}", rule.id, rule.description());
        let today = chrono::Utc::now().date_naive();

        for offset in 0..options.lookahead_days {
            let date = today + chrono::Duration::days(offset);
            let mut query = AwardQuery::new(
                &rule.origin,
                &rule.destination,
                &date.format("%Y-%m-%d").to_string(),
            );
            query.cabin = rule.cabin.clone();
            query.program = rule.program.clone();

            let outcome = match self
                .search
                .search_with_cache(&query, &SearchOptions::default())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        alert_id = rule.id,
                        date = %date,
                        error = %e,
                        "Search failed during sweep"
                    );
                    summary.fetch_failures += 1;
                    continue;
                }
            };

            for flight in &outcome.result.flights {
                for fare in &flight.fares {
                    if !Self::matches(rule, fare) {
                        continue;
                    }

                    self.handle_match(rule, flight, fare, &outcome, options, summary)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Null criteria match anything; each set one must hold.
    fn matches(rule: &AlertRule, fare: &FlightFare) -> bool {
        if let Some(cabin) = &rule.cabin
            && !fare.cabin.eq_ignore_ascii_case(cabin)
        {
            return false;
        }
        if let Some(program) = &rule.program
            && !fare.program.eq_ignore_ascii_case(program)
        {
            return false;
        }
        if let Some(max_miles) = rule.max_miles
            && fare.miles > max_miles
        {
            return false;
        }
        true
    }

    async fn handle_match(
        &self,
        rule: &AlertRule,
        flight: &Flight,
        fare: &FlightFare,
        outcome: &crate::services::search::SearchOutcome,
        options: &SweepOptions,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        let flight_date = &outcome.result.date;
        let fingerprint = fingerprint(
            &rule.origin,
            &rule.destination,
            flight_date,
            &flight.flight_no,
            &fare.cabin,
            &fare.program,
            fare.miles,
        );

        let now = chrono::Utc::now();
        let since = (now - options.dedup_window).to_rfc3339();
        if self
            .store
            .alert_recently_fired(rule.id, &fingerprint, &since)
            .await?
        {
            debug!(alert_id = rule.id, "Suppressing recently fired match");
            summary.deduplicated += 1;
            return Ok(());
        }

        summary.matches_found += 1;

        let new_low = outcome.new_low_for(&fare.cabin, &fare.program, fare.miles);
        let payload = NotificationPayload {
            alert_id: rule.id,
            origin: rule.origin.clone(),
            destination: rule.destination.clone(),
            flight_date: flight_date.clone(),
            flight_no: Some(flight.flight_no.clone()),
            departure: Some(flight.departure.clone()),
            arrival: Some(flight.arrival.clone()),
            cabin: fare.cabin.clone(),
            program: fare.program.clone(),
            miles: fare.miles,
            taxes_usd: fare.cash,
            is_new_low: new_low.is_some(),
            previous_low_miles: new_low.and_then(|n| n.previous_min),
        };

        if options.dry_run {
            info!(
                "[dry run] Alert #{} would fire: {} {} for {} miles on {}",
                rule.id, flight.flight_no, fare.cabin, fare.miles, flight_date
            );
            return Ok(());
        }

        if !rule.has_channels() {
            summary.no_channel_matches += 1;
        } else {
            self.dispatch(rule, &payload, summary).await;
        }

        let fire = FireRecord {
            alert_id: rule.id,
            fingerprint,
            flight_no: Some(flight.flight_no.clone()),
            flight_date: flight_date.clone(),
            cabin: fare.cabin.clone(),
            program: fare.program.clone(),
            miles: fare.miles,
            taxes_usd: fare.cash,
            is_new_low: payload.is_new_low,
            previous_low_miles: payload.previous_low_miles,
            fired_at: now.to_rfc3339(),
        };
        self.store.record_alert_fire(&fire).await?;

        info!(
            "Alert #{} fired: {}->{} {} for {} miles{}",
            rule.id,
            rule.origin,
            rule.destination,
            fare.cabin,
            fare.miles,
            if payload.is_new_low { " (new low)" } else { "" }
        );
        Ok(())
    }

    /// Every channel gets its own attempt; one failing webhook must not
    /// starve the email channels or vice versa.
    async fn dispatch(
        &self,
        rule: &AlertRule,
        payload: &NotificationPayload,
        summary: &mut SweepSummary,
    ) {
        for url in &rule.webhooks {
            match self.sender.send_webhook(url, payload).await {
                Ok(()) => summary.notifications_sent += 1,
                Err(e) => {
                    warn!(alert_id = rule.id, url = %url, error = %e, "Webhook delivery failed");
                    summary.channel_failures += 1;
                }
            }
        }

        if rule.emails.is_empty() {
            return;
        }

        let config = match &rule.email_config {
            Some(name) => match self.store.get_email_config(name).await {
                Ok(Some(config)) => config,
                Ok(None) => {
                    warn!(
                        alert_id = rule.id,
                        config = %name,
                        "Email config missing, skipping email channels"
                    );
                    summary.channel_failures += rule.emails.len() as u64;
                    return;
                }
                Err(e) => {
                    warn!(alert_id = rule.id, error = %e, "Failed to load email config");
                    summary.channel_failures += rule.emails.len() as u64;
                    return;
                }
            },
            None => {
                warn!(
                    alert_id = rule.id,
                    "Rule has email recipients but no email config"
                );
                summary.channel_failures += rule.emails.len() as u64;
                return;
            }
        };

        for to in &rule.emails {
            match self.sender.send_email(&config, to, payload).await {
                Ok(()) => summary.notifications_sent += 1,
                Err(e) => {
                    warn!(alert_id = rule.id, to = %to, error = %e, "Email delivery failed");
                    summary.channel_failures += 1;
                }
            }
        }
    }
}

/// Identity of a matched fare, for dedup against fire records.
#[must_use]
pub fn fingerprint(
    origin: &str,
    destination: &str,
    flight_date: &str,
    flight_no: &str,
    cabin: &str,
    program: &str,
    miles: i64,
) -> String {
    format!("{origin}-{destination}|{flight_date}|{flight_no}|{cabin}|{program}|{miles}")
}

// ============================================================================
// Data Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub dry_run: bool,
    pub lookahead_days: i64,
    pub dedup_window: chrono::Duration,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            lookahead_days: 7,
            dedup_window: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub rules_evaluated: u64,
    pub matches_found: u64,
    pub notifications_sent: u64,
    pub channel_failures: u64,
    pub deduplicated: u64,
    pub no_channel_matches: u64,
    pub fetch_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fare(cabin: &str, program: &str, miles: i64) -> FlightFare {
        FlightFare {
            miles,
            cash: 50.0,
            cabin: cabin.to_string(),
            booking_class: "I".to_string(),
            program: program.to_string(),
            is_saver: true,
        }
    }

    fn open_rule() -> AlertRule {
        AlertRule {
            id: 1,
            origin: "SFO".to_string(),
            destination: "NRT".to_string(),
            cabin: None,
            program: None,
            max_miles: None,
            webhooks: Vec::new(),
            emails: Vec::new(),
            email_config: None,
            enabled: true,
            created_at: String::new(),
        }
    }

    #[test]
    fn null_criteria_match_anything() {
        let rule = open_rule();
        assert!(AlertEngine::matches(&rule, &fare("business", "ana", 75_000)));
        assert!(AlertEngine::matches(&rule, &fare("economy", "alaska", 25_000)));
    }

    #[test]
    fn set_criteria_all_apply() {
        let mut rule = open_rule();
        rule.cabin = Some("business".to_string());
        rule.max_miles = Some(80_000);

        assert!(AlertEngine::matches(&rule, &fare("Business", "ana", 75_000)));
        assert!(!AlertEngine::matches(&rule, &fare("economy", "ana", 40_000)));
        assert!(!AlertEngine::matches(&rule, &fare("business", "ana", 90_000)));
    }

    #[test]
    fn fingerprint_includes_fare_identity() {
        let fp = fingerprint("SFO", "NRT", "2026-10-01", "NH7", "business", "ana", 75_000);
        assert_eq!(fp, "SFO-NRT|2026-10-01|NH7|business|ana|75000");
    }
}
