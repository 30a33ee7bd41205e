//! Account statistics built from a handful of cheap queries
//!
//! Each figure costs one request. Large counts are never walked page by
//! page: the unread figure is a capped sample, optionally extrapolated, and
//! the overall size comes from the API's own `resultSizeEstimate`.

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PerformanceConfig;
use crate::error::{GmailError, Result};
use crate::resources::{labels, messages, ListParams};
use crate::safe;
use crate::transport::{dispatch, Connector};

#[derive(Debug, Clone)]
pub struct StatisticsOptions {
    /// Cap on the unread sample
    pub unread_limit: u32,
    pub today_limit: u32,
    pub include_labels: bool,
    /// Double a capped unread count instead of reporting the cap
    pub smart_estimation: bool,
    pub estimate_large_counts: bool,
    /// Swallow failures (flagging `partial_failure`) and skip the today query
    pub background_mode: bool,
    /// Per-query timeout
    pub timeout: Duration,
}

impl StatisticsOptions {
    pub fn from_config(performance: &PerformanceConfig) -> Self {
        Self {
            unread_limit: performance.count_estimation_threshold.max(1),
            smart_estimation: performance.enable_smart_counting,
            ..Self::default()
        }
    }

    pub fn background(mut self) -> Self {
        self.background_mode = true;
        self
    }
}

impl Default for StatisticsOptions {
    fn default() -> Self {
        Self {
            unread_limit: 50,
            today_limit: 15,
            include_labels: true,
            smart_estimation: true,
            estimate_large_counts: true,
            background_mode: false,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AccountStatistics {
    pub unread_count: Option<u64>,
    /// True when `unread_count` is an extrapolation past the sample cap
    pub unread_estimated: bool,
    pub today_count: Option<u64>,
    pub label_count: Option<u64>,
    pub total_estimate: Option<u64>,
    pub api_calls_made: u32,
    pub partial_failure: bool,
    pub errors: Vec<String>,
}

impl AccountStatistics {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn has_unread(&self) -> bool {
        self.unread_count.is_some_and(|count| count > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    AuthenticationFailed,
    RateLimited,
    Error,
}

impl HealthStatus {
    fn from_error(error: &GmailError) -> Self {
        match error {
            GmailError::Authentication { .. } => HealthStatus::AuthenticationFailed,
            GmailError::RateLimited { .. } => HealthStatus::RateLimited,
            GmailError::Network(_) | GmailError::CircuitBreakerOpen { .. } => HealthStatus::Unhealthy,
            GmailError::Api { status, .. } if *status >= 500 => HealthStatus::Unhealthy,
            _ => HealthStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::AuthenticationFailed => "authentication_failed",
            HealthStatus::RateLimited => "rate_limited",
            HealthStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccountHealth {
    pub connected: bool,
    pub status: HealthStatus,
    pub quota_remaining: Option<u64>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccountSummary {
    pub connected: bool,
    pub has_unread: bool,
    pub statistics: AccountStatistics,
}

pub struct StatisticsService {
    connector: Arc<dyn Connector>,
    defaults: StatisticsOptions,
}

impl StatisticsService {
    pub fn new(connector: Arc<dyn Connector>, defaults: StatisticsOptions) -> Self {
        Self {
            connector,
            defaults,
        }
    }

    pub fn defaults(&self) -> &StatisticsOptions {
        &self.defaults
    }

    /// Statistics with the service defaults
    pub async fn account_statistics(&self) -> Result<AccountStatistics> {
        self.account_statistics_with(&self.defaults).await
    }

    /// Run the unread, today, label and estimate queries in that order.
    ///
    /// The first failure stops the remaining queries. In background mode the
    /// partial result is returned with `partial_failure` set; otherwise the
    /// error is returned.
    pub async fn account_statistics_with(
        &self,
        options: &StatisticsOptions,
    ) -> Result<AccountStatistics> {
        let mut stats = AccountStatistics::default();

        match self.collect(options, &mut stats).await {
            Ok(()) => {
                debug!(api_calls = stats.api_calls_made, "Collected account statistics");
                Ok(stats)
            }
            Err(error) => {
                stats.partial_failure = true;
                stats.errors.push(error.to_string());

                if options.background_mode {
                    warn!(
                        error_kind = error.kind_name(),
                        error = %error,
                        api_calls = stats.api_calls_made,
                        "Statistics incomplete"
                    );
                    Ok(stats)
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn collect(&self, options: &StatisticsOptions, stats: &mut AccountStatistics) -> Result<()> {
        let unread_limit = options.unread_limit.max(1);
        let unread = self
            .timed(options, self.count_messages("is:unread", unread_limit))
            .await?;
        stats.api_calls_made += 1;

        if unread >= u64::from(unread_limit) && options.smart_estimation {
            stats.unread_count = Some(unread * 2);
            stats.unread_estimated = true;
        } else {
            stats.unread_count = Some(unread);
        }

        if !options.background_mode {
            let query = format!("after:{}", Local::now().format("%Y/%m/%d"));
            let today = self
                .timed(options, self.count_messages(&query, options.today_limit.max(1)))
                .await?;
            stats.today_count = Some(today);
            stats.api_calls_made += 1;
        }

        if options.include_labels {
            let count = self.timed(options, self.count_labels()).await?;
            stats.label_count = Some(count);
            stats.api_calls_made += 1;
        }

        if options.estimate_large_counts {
            let estimate = self.timed(options, self.size_estimate()).await?;
            stats.total_estimate = estimate;
            stats.api_calls_made += 1;
        }

        Ok(())
    }

    async fn timed<T>(
        &self,
        options: &StatisticsOptions,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(options.timeout, future)
            .await
            .map_err(|_| {
                GmailError::Network(format!(
                    "Statistics query timed out after {}s",
                    options.timeout.as_secs()
                ))
            })?
    }

    async fn count_messages(&self, query: &str, limit: u32) -> Result<u64> {
        let params = ListParams {
            query: Some(query.to_string()),
            max_results: Some(limit),
            ..ListParams::default()
        };
        let page = dispatch(
            self.connector.as_ref(),
            messages::list(&params),
            &messages::collection(),
        )
        .await?;

        Ok(page
            .get("messages")
            .and_then(Value::as_array)
            .map(|items| items.len() as u64)
            .unwrap_or(0))
    }

    async fn count_labels(&self) -> Result<u64> {
        let response =
            dispatch(self.connector.as_ref(), labels::list(), &labels::collection()).await?;
        Ok(response
            .get("labels")
            .and_then(Value::as_array)
            .map(|items| items.len() as u64)
            .unwrap_or(0))
    }

    async fn size_estimate(&self) -> Result<Option<u64>> {
        let params = ListParams {
            max_results: Some(1),
            ..ListParams::default()
        };
        let page = dispatch(
            self.connector.as_ref(),
            messages::list(&params),
            &messages::collection(),
        )
        .await?;
        Ok(page.get("resultSizeEstimate").and_then(Value::as_u64))
    }

    /// One minimal read used as a connectivity probe
    pub async fn account_health(&self) -> AccountHealth {
        let probe = messages::list(&ListParams {
            max_results: Some(1),
            ..ListParams::default()
        });

        let outcome = match self.connector.send(probe).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(GmailError::from_response(&response, &messages::collection())),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(response) => AccountHealth {
                connected: true,
                status: HealthStatus::Healthy,
                quota_remaining: response
                    .header("x-ratelimit-remaining")
                    .and_then(|v| v.trim().parse().ok()),
                errors: Vec::new(),
            },
            Err(error) => {
                let status = HealthStatus::from_error(&error);
                warn!(status = %status, error = %error, "Account health probe failed");
                AccountHealth {
                    connected: false,
                    status,
                    quota_remaining: None,
                    errors: vec![error.to_string()],
                }
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.account_health().await.status == HealthStatus::Healthy
    }

    /// Connectivity plus "is there anything unread", for two requests at most
    pub async fn account_summary(&self) -> AccountSummary {
        let connected = self.is_connected().await;

        let options = StatisticsOptions {
            unread_limit: 1,
            smart_estimation: false,
            include_labels: false,
            estimate_large_counts: false,
            background_mode: true,
            timeout: self.defaults.timeout,
            ..StatisticsOptions::default()
        };
        let statistics = self
            .account_statistics_with(&options)
            .await
            .unwrap_or_else(|error| AccountStatistics {
                partial_failure: true,
                errors: vec![error.to_string()],
                ..AccountStatistics::default()
            });

        info!(connected, has_unread = statistics.has_unread(), "Account summary");
        AccountSummary {
            connected,
            has_unread: statistics.has_unread(),
            statistics,
        }
    }

    /// Statistics that never fail; errors are logged and yield an empty report
    /// flagged `partial_failure`
    pub async fn safe_account_statistics(&self, options: &StatisticsOptions) -> AccountStatistics {
        match self.account_statistics_with(options).await {
            Ok(stats) => stats,
            Err(error) => {
                safe::report("account_statistics", &error);
                AccountStatistics {
                    partial_failure: true,
                    errors: vec![error.to_string()],
                    ..AccountStatistics::default()
                }
            }
        }
    }
}
