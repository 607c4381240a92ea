use serde::{Deserialize, Serialize};

/// A single award fare option on a flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightFare {
    pub miles: i64,
    /// Taxes and fees in USD.
    pub cash: f64,
    /// economy / business / first
    pub cabin: String,
    /// Booking class letter, e.g. I, J, U.
    pub booking_class: String,
    /// alaska / aeroplan / ...
    pub program: String,
    #[serde(default)]
    pub is_saver: bool,
}

impl FlightFare {
    #[must_use]
    pub fn cabin_display(&self) -> &str {
        match self.cabin.as_str() {
            "economy" => "Economy",
            "business" => "Business",
            "first" => "First",
            other => other,
        }
    }
}

/// A flight with its available award fares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub flight_no: String,
    pub origin: String,
    pub destination: String,
    /// ISO datetime strings, e.g. "2026-06-01T10:30:00".
    pub departure: String,
    pub arrival: String,
    pub duration_minutes: i32,
    pub aircraft: Option<String>,
    #[serde(default)]
    pub fares: Vec<FlightFare>,
}

impl Flight {
    /// Lowest-miles fare, optionally restricted to a cabin.
    #[must_use]
    pub fn best_fare(&self, cabin: Option<&str>) -> Option<&FlightFare> {
        self.fares
            .iter()
            .filter(|f| cabin.is_none_or(|c| f.cabin == c))
            .min_by_key(|f| f.miles)
    }

    #[must_use]
    pub fn format_duration(&self) -> String {
        format!(
            "{}h{:02}m",
            self.duration_minutes / 60,
            self.duration_minutes % 60
        )
    }
}

/// Merged results for one (route, date) across the queried programs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub origin: String,
    pub destination: String,
    pub date: String,
    #[serde(default)]
    pub flights: Vec<Flight>,
    /// Per-program failure notes, e.g. "alaska: blocked".
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SearchResult {
    #[must_use]
    pub fn empty(origin: &str, destination: &str, date: &str) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            date: date.to_string(),
            flights: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fare(miles: i64, cabin: &str) -> FlightFare {
        FlightFare {
            miles,
            cash: 25.0,
            cabin: cabin.to_string(),
            booking_class: "I".to_string(),
            program: "alaska".to_string(),
            is_saver: false,
        }
    }

    fn flight(fares: Vec<FlightFare>) -> Flight {
        Flight {
            flight_no: "AS100".to_string(),
            origin: "SFO".to_string(),
            destination: "NRT".to_string(),
            departure: "2026-10-01T10:30:00".to_string(),
            arrival: "2026-10-02T14:05:00".to_string(),
            duration_minutes: 655,
            aircraft: Some("B789".to_string()),
            fares,
        }
    }

    #[test]
    fn best_fare_picks_lowest_miles() {
        let f = flight(vec![fare(75_000, "business"), fare(60_000, "business")]);
        assert_eq!(f.best_fare(None).unwrap().miles, 60_000);
    }

    #[test]
    fn best_fare_honors_cabin_filter() {
        let f = flight(vec![fare(40_000, "economy"), fare(60_000, "business")]);
        assert_eq!(f.best_fare(Some("business")).unwrap().miles, 60_000);
        assert!(f.best_fare(Some("first")).is_none());
    }

    #[test]
    fn duration_formatting() {
        let f = flight(vec![]);
        assert_eq!(f.format_duration(), "10h55m");
    }
}
