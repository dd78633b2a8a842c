use chrono::{TimeZone, Utc};
use std::sync::Arc;

use crate::helpers::{phone_number, TestApp, UnavailableStore};

#[tokio::test]
async fn stop_keyword_opts_the_subscriber_out() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;

    let response = test_app
        .get_update(&[
            ("text", "Stop"),
            ("keyword", "STOP"),
            ("msisdn", "+1555"),
            ("message-timestamp", "100"),
        ])
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "update": "+1555" }));

    let subscriber = test_app.store.subscriber(&phone_number("+1555")).await.unwrap();
    assert_eq!(subscriber.opted_out_at, Some(Utc.timestamp_opt(100, 0).unwrap()));
}

#[tokio::test]
async fn repeated_stop_keeps_the_first_timestamp() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;

    let test_cases = vec![("STOP", "100"), ("STOP", "100"), ("stop", "200")];

    for (keyword, timestamp) in test_cases {
        let response = test_app
            .get_update(&[
                ("keyword", keyword),
                ("msisdn", "+1555"),
                ("message-timestamp", timestamp),
            ])
            .await;

        assert_eq!(
            200,
            response.status().as_u16(),
            "Opt-out with keyword {} at {} did not succeed",
            keyword,
            timestamp
        );
    }

    let subscriber = test_app.store.subscriber(&phone_number("+1555")).await.unwrap();
    assert_eq!(subscriber.opted_out_at, Some(Utc.timestamp_opt(100, 0).unwrap()));
}

#[tokio::test]
async fn stop_in_message_text_opts_the_subscriber_out() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;

    let response = test_app
        .get_update(&[
            ("text", "stop"),
            ("keyword", "WHATEVER"),
            ("msisdn", "+1555"),
            ("message-timestamp", "2020-01-01 12:00:00"),
        ])
        .await;

    assert_eq!(200, response.status().as_u16());
    let subscriber = test_app.store.subscriber(&phone_number("+1555")).await.unwrap();
    assert_eq!(
        subscriber.opted_out_at,
        Some(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn other_keywords_do_not_change_anything() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;

    let response = test_app
        .get_update(&[
            ("text", "help"),
            ("keyword", "HELP"),
            ("msisdn", "+1555"),
            ("message-timestamp", "100"),
        ])
        .await;

    assert_eq!(204, response.status().as_u16());
    let subscriber = test_app.store.subscriber(&phone_number("+1555")).await.unwrap();
    assert!(!subscriber.is_opted_out());
}

#[tokio::test]
async fn stop_from_unknown_number_returns_204() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;

    let response = test_app
        .get_update(&[
            ("keyword", "STOP"),
            ("msisdn", "+1999"),
            ("message-timestamp", "100"),
        ])
        .await;

    assert_eq!(204, response.status().as_u16());
    let subscriber = test_app.store.subscriber(&phone_number("+1555")).await.unwrap();
    assert!(!subscriber.is_opted_out());
}

#[tokio::test]
async fn update_without_parameters_returns_204() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get_update(&[]).await;

    assert_eq!(204, response.status().as_u16());
}

#[tokio::test]
async fn stop_with_invalid_parameters_returns_400() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;

    // This is a common practice and it is called table-driven tests.
    let test_cases: Vec<(Vec<(&str, &str)>, &str)> = vec![
        (
            vec![("keyword", "STOP"), ("message-timestamp", "100")],
            "missing msisdn",
        ),
        (vec![("keyword", "STOP"), ("msisdn", "+1555")], "missing timestamp"),
        (
            vec![
                ("keyword", "STOP"),
                ("msisdn", "+1555"),
                ("message-timestamp", "later"),
            ],
            "invalid timestamp",
        ),
        (
            vec![
                ("keyword", "STOP"),
                ("msisdn", "not a number"),
                ("message-timestamp", "100"),
            ],
            "invalid msisdn",
        ),
    ];

    for (query, error_message) in test_cases {
        let response = test_app.get_update(&query).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 status when the query had {}",
            error_message
        );
    }

    let subscriber = test_app.store.subscriber(&phone_number("+1555")).await.unwrap();
    assert!(!subscriber.is_opted_out());
}

#[tokio::test]
async fn update_returns_500_when_store_write_fails() {
    let test_app = TestApp::spawn_app_with_store(Arc::new(UnavailableStore), 0).await;

    let response = test_app
        .get_update(&[
            ("keyword", "STOP"),
            ("msisdn", "+1555"),
            ("message-timestamp", "100"),
        ])
        .await;

    assert_eq!(500, response.status().as_u16());
}

#[tokio::test]
async fn opted_out_subscriber_is_excluded_from_the_next_broadcast() {
    let test_app = TestApp::spawn_app().await;
    test_app.add_subscriber("+1555").await;
    test_app.add_subscriber("+1556").await;

    test_app
        .get_update(&[
            ("keyword", "STOP"),
            ("msisdn", "+1556"),
            ("message-timestamp", "100"),
        ])
        .await;
    test_app.post_send(serde_json::json!({ "msg": "fire" })).await;

    let recipients: Vec<String> = test_app
        .queued_jobs()
        .await
        .into_iter()
        .map(|(to, _, _)| to)
        .collect();
    assert_eq!(recipients, vec!["+1555".to_string()]);
}
