pub mod auth;
pub mod labels;
pub mod messages;
pub mod statistics;

pub use auth::AuthService;
pub use labels::LabelService;
pub use messages::{ListOptions, MessagePage, MessageService};
pub use statistics::{
    AccountHealth, AccountStatistics, AccountSummary, HealthStatus, StatisticsOptions,
    StatisticsService,
};
