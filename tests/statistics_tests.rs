//! Statistics aggregation and health probes

mod common;

use common::*;
use gmail_client::{HealthStatus, StatisticsOptions};
use serde_json::json;

#[tokio::test]
async fn test_background_auth_failure_is_flagged_not_raised() {
    let mut api = MockApi::new();
    api.expect_send().returning(|_| status(401));

    let client = client_with(api);
    let options = StatisticsOptions::default().background();
    let stats = client
        .statistics()
        .account_statistics_with(&options)
        .await
        .unwrap();

    assert!(stats.partial_failure);
    assert_eq!(stats.api_calls_made, 0);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.to_json()["partial_failure"], json!(true));
}

#[tokio::test]
async fn test_foreground_auth_failure_is_raised() {
    let mut api = MockApi::new();
    api.expect_send().returning(|_| status(401));

    let client = client_with(api);
    assert!(client.statistics().account_statistics().await.is_err());

    let safe = client
        .statistics()
        .safe_account_statistics(&StatisticsOptions::default())
        .await;
    assert!(safe.partial_failure);
}

#[tokio::test]
async fn test_disabled_steps_issue_no_requests() {
    let mut api = MockApi::new();
    api.expect_send()
        .withf(|r| r.query_value("q") == Some("is:unread"))
        .times(1)
        .returning(|_| ok(list_page(&["m1"], None)));

    let client = client_with(api);
    let options = StatisticsOptions {
        include_labels: false,
        estimate_large_counts: false,
        background_mode: true,
        ..StatisticsOptions::default()
    };
    let stats = client
        .statistics()
        .account_statistics_with(&options)
        .await
        .unwrap();

    assert_eq!(stats.unread_count, Some(1));
    assert_eq!(stats.api_calls_made, 1);
    assert!(!stats.partial_failure);
}

#[tokio::test]
async fn test_unhealthy_account_is_not_connected() {
    let mut api = MockApi::new();
    api.expect_send().returning(|_| status(401));

    let client = client_with(api);
    let health = client.statistics().account_health().await;

    assert_eq!(health.status, HealthStatus::AuthenticationFailed);
    assert!(!client.statistics().is_connected().await);

    let summary = client.statistics().account_summary().await;
    assert!(!summary.connected);
    assert!(!summary.has_unread);
    assert!(summary.statistics.partial_failure);
}
