//! Gmail REST Client
//!
//! A typed client for the Gmail REST API that survives the API's rough
//! edges: paginated listings, rate limits and partial failures.
//!
//! # Overview
//!
//! - **Errors**: every non-success response maps onto [`GmailError`] with the
//!   raw payload retained
//! - **Pagination**: cursor-driven [`Paginator`] with an accumulator
//! - **Streaming**: pull-based [`MessageStream`] that requests pages on demand
//! - **Hydration**: bounded concurrent detail fetches for listed messages
//! - **Safe calls**: `safe_*` variants that log and return a fallback
//! - **Statistics**: cheap account summaries with partial-failure accounting
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_client::{services::ListOptions, Config, GmailClient, Token};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let token = Token::new("ya29.access-token");
//!     let client = GmailClient::with_token(config, &token).await?;
//!
//!     let unread = client
//!         .messages()
//!         .list(&ListOptions::default().query("is:unread").full_details())
//!         .await?;
//!     for email in unread {
//!         println!("{} {:?}", email.id, email.subject);
//!     }
//!
//!     // Never fails; errors are logged and an empty list comes back
//!     let labels = client.labels().safe_list().await;
//!     println!("{} labels", labels.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`transport`] - Connector seam and the HTTPS implementation
//! - [`resources`] - Request builders for messages, labels and OAuth
//! - [`pagination`], [`streaming`], [`hydration`] - Read engines
//! - [`services`] - Message, label, auth and statistics services
//! - [`circuit_breaker`], [`retry`] - Opt-in resilience decorators
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases

pub mod circuit_breaker;
pub mod cli;
pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod hydration;
pub mod models;
pub mod pagination;
pub mod resources;
pub mod retry;
pub mod retry_after;
pub mod safe;
pub mod services;
pub mod streaming;
pub mod transport;

// Re-export commonly used types for convenience
pub use error::{AuthFailure, GmailError, Result};

pub use client::GmailClient;
pub use compose::EmailDraft;
pub use config::Config;

pub use models::{
    Contact, Email, Label, LabelDraft, LabelType, MessageVisibility, Token, Visibility,
};

pub use pagination::Paginator;
pub use streaming::MessageStream;

pub use services::{
    AccountHealth, AccountStatistics, HealthStatus, ListOptions, MessagePage, StatisticsOptions,
};

pub use transport::{ApiRequest, ApiResponse, Connector, HyperConnector};
