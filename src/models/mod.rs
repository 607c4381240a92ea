pub mod flight;

pub use flight::{Flight, FlightFare, SearchResult};
