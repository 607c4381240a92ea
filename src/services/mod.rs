pub mod engine;
pub use engine::{AlertEngine, SweepOptions, SweepSummary};

pub mod notify;
pub use notify::{HttpNotifier, NotificationPayload, NotificationSender, NotifyError};

pub mod search;
pub use search::{NewLowFare, SearchOptions, SearchOutcome, SearchService};
