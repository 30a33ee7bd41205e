//! Cursor walks over multi-page listings

mod common;

use common::*;
use gmail_client::ListOptions;
use std::collections::BTreeSet;

fn three_page_api() -> MockApi {
    let mut api = MockApi::new();
    api.expect_send().withf(is_list).returning(|request| {
        match request.query_value("pageToken") {
            None => ok(list_page(&["a", "b"], Some("p2"))),
            Some("p2") => ok(list_page(&["c", "d"], Some("p3"))),
            Some("p3") => ok(list_page(&["e"], None)),
            Some(_) => status(400),
        }
    });
    api
}

#[tokio::test]
async fn test_all_pages_matches_exhaustive_walk() {
    let client = client_with(three_page_api());
    let options = ListOptions::default().max_results(2);

    let mut walked = BTreeSet::new();
    let mut paginator = client.messages().paginate(&options);
    while paginator.has_more_pages() {
        for email in paginator.next_page().await.unwrap() {
            walked.insert(email.id);
        }
    }

    let all: BTreeSet<String> = client
        .messages()
        .paginate(&options)
        .all_pages()
        .await
        .unwrap()
        .into_iter()
        .map(|email| email.id)
        .collect();

    assert_eq!(walked, all);
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn test_last_page_clears_cursor() {
    let client = client_with(three_page_api());
    let mut paginator = client
        .messages()
        .paginate(&ListOptions::default().page_token("p3"));

    let page = paginator.next_page().await.unwrap();
    assert_eq!(page.len(), 1);
    assert!(!paginator.has_more_pages());
    assert_eq!(paginator.page_token(), None);

    // Exhausted cursors stay quiet
    assert!(paginator.next_page().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pages_hydrate_on_request() {
    let mut api = three_page_api();
    api.expect_send()
        .withf(|r| r.path.starts_with("/users/me/messages/"))
        .returning(|request| {
            let id = request.path.rsplit('/').next().unwrap_or_default().to_string();
            ok(full_message(&id, "news@example.com", "Digest"))
        });

    let client = client_with(api);
    let mut paginator = client.messages().paginate(&ListOptions::default().max_results(2));
    let page = paginator.next_page().await.unwrap();
    assert!(page.iter().all(|email| email.is_minimal()));

    let hydrated = client.messages().hydrate(page).await;
    assert_eq!(hydrated.len(), 2);
    assert!(hydrated.iter().all(|email| email.subject.as_deref() == Some("Digest")));
}

#[tokio::test]
async fn test_safe_paginator_ends_on_failure() {
    let mut api = MockApi::new();
    api.expect_send().returning(|_| status(503));

    let client = client_with(api);
    let mut paginator = client.messages().safe_paginate(&ListOptions::default());
    assert!(paginator.next_page().await.unwrap().is_empty());
    assert!(!paginator.has_more_pages());
}
