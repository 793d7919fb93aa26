mod common;

use flagcache::domain::errors::ErrorKind;
use flagcache::domain::models::{EvaluationReason, Event, UserContext};
use flagcache::services::FlagClient;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use common::{flag_body, silent_server, temp_dir, test_config};

const EVALUATE: &str = "/api/v1/sdk/evaluate";
const EVALUATE_BATCH: &str = "/api/v1/sdk/evaluate/batch";

#[tokio::test]
async fn test_cache_aside_single_flag() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", EVALUATE)
        .with_status(200)
        .with_body(flag_body("new-ui", json!(true)))
        .expect(1)
        .create_async()
        .await;

    let client = FlagClient::new(test_config(&server.url())).unwrap();
    let user = UserContext::new("u-1");

    let first = client.evaluate_flag("new-ui", json!(false), &user).await;
    let second = client.evaluate_flag("new-ui", json!(false), &user).await;

    mock.assert_async().await;
    assert_eq!(first.reason, EvaluationReason::ApiEvaluation);
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.value, json!(true));

    let metrics = client.metrics();
    assert_eq!(metrics.api_calls, 1);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    client.close().await;
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let mut server = mockito::Server::new_async().await;
    let mut config = test_config(&server.url());
    config.retry.max_retries = 0;

    let mock = server
        .mock("POST", EVALUATE)
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let client = FlagClient::new(config).unwrap();
    let user = UserContext::new("u-1");

    let first = client.evaluate_flag("checkout", json!("legacy"), &user).await;
    assert_eq!(first.reason, EvaluationReason::ErrorFallback);
    assert_eq!(first.value, json!("legacy"));
    assert_eq!(first.error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
    assert_eq!(client.cache_stats().size, 0);

    let second = client.evaluate_flag("checkout", json!("legacy"), &user).await;
    assert!(!second.cache_hit);
    mock.assert_async().await;
    client.close().await;
}

#[tokio::test]
async fn test_batch_independence() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", EVALUATE_BATCH)
        .with_status(200)
        .with_body(
            json!({
                "results": {
                    "a": {"flag_key": "a", "enabled": true, "value": 10},
                    "b": {"flag_key": "b", "enabled": false, "error": {"code": "EVAL", "message": "rule failed"}},
                    "c": {"flag_key": "c", "enabled": true, "value": "blue"}
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = FlagClient::new(test_config(&server.url())).unwrap();
    let user = UserContext::new("u-1");
    let requests = vec![
        ("a".to_string(), json!(0)),
        ("b".to_string(), json!("default-b")),
        ("c".to_string(), json!("red")),
    ];

    let results = client.evaluate_flags(&requests, &user).await;
    mock.assert_async().await;

    assert_eq!(results["a"].reason, EvaluationReason::ApiEvaluation);
    assert_eq!(results["a"].value, json!(10));
    assert_eq!(results["c"].reason, EvaluationReason::ApiEvaluation);
    assert_eq!(results["c"].value, json!("blue"));
    assert_eq!(results["b"].reason, EvaluationReason::ErrorFallback);
    assert_eq!(results["b"].value, json!("default-b"));

    // Cached successes answer the next batch without another request
    let again = client
        .evaluate_flags(&[("a".to_string(), json!(0)), ("c".to_string(), json!(""))], &user)
        .await;
    assert!(again.values().all(|r| r.cache_hit));
    client.close().await;
}

#[tokio::test]
async fn test_batch_missing_key_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", EVALUATE_BATCH)
        .with_status(200)
        .with_body(json!({"results": {"a": {"flag_key": "a", "enabled": true}}}).to_string())
        .create_async()
        .await;

    let client = FlagClient::new(test_config(&server.url())).unwrap();
    let results = client
        .evaluate_flags(
            &[("a".to_string(), json!(false)), ("ghost".to_string(), json!(7))],
            &UserContext::new("u-1"),
        )
        .await;

    assert_eq!(results["a"].value, json!(true));
    assert_eq!(results["ghost"].reason, EvaluationReason::NotFound);
    assert_eq!(results["ghost"].value, json!(7));
    client.close().await;
}

#[tokio::test]
async fn test_gates_batch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/sdk/feature-gates/evaluate/batch")
        .match_body(mockito::Matcher::PartialJson(json!({"user_id": "u-1", "environment": "test"})))
        .with_status(200)
        .with_body(
            json!({
                "results": {
                    "admin": {"gate_key": "admin", "enabled": true, "access_granted": true},
                    "billing": {"gate_key": "billing", "enabled": true, "access_granted": false}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = FlagClient::new(test_config(&server.url())).unwrap();
    let gates = client
        .gates(&["admin".to_string(), "billing".to_string()], &UserContext::new("u-1"))
        .await;

    mock.assert_async().await;
    assert!(gates["admin"]);
    assert!(!gates["billing"]);
    assert_eq!(client.metrics().gates_evaluated, 2);
    client.close().await;
}

#[tokio::test]
async fn test_evaluation_cancelled_promptly() {
    let addr = silent_server().await;
    let mut config = test_config(&format!("http://{addr}"));
    config.timeout_ms = 30_000;
    let client = FlagClient::new(config).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = client
        .evaluate_flag_with_cancel("slow", json!(false), &UserContext::new("u-1"), &cancel)
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(500), "elapsed {elapsed:?}");
    assert_eq!(result.reason, EvaluationReason::ErrorFallback);
    assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::Cancelled));
    client.close().await;
}

#[tokio::test]
async fn test_persistent_cache_survives_restart() {
    let dir = temp_dir();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", EVALUATE)
        .with_status(200)
        .with_body(flag_body("limits", json!({"max": 5})))
        .expect(1)
        .create_async()
        .await;

    let mut config = test_config(&server.url());
    config.cache.enable_persistence = true;
    config.cache.persistence_path = Some(dir.path().join("flags.json"));
    let user = UserContext::new("u-1");

    let client = FlagClient::new(config.clone()).unwrap();
    client.evaluate_flag("limits", json!({}), &user).await;
    client.close().await;

    let restarted = FlagClient::new(config).unwrap();
    let result = restarted.evaluate_flag("limits", json!({}), &user).await;
    assert!(result.cache_hit);
    assert_eq!(result.value, json!({"max": 5}));

    mock.assert_async().await;
    restarted.close().await;
}

#[tokio::test]
async fn test_hanging_batch_cancelled_by_caller() {
    let addr = silent_server().await;
    let mut config = test_config(&format!("http://{addr}"));
    config.timeout_ms = 30_000;
    let client = FlagClient::new(config).unwrap();
    let user = UserContext::new("u-1");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let results = client
        .evaluate_flags_with_cancel(
            &[("a".to_string(), json!(1)), ("b".to_string(), json!(2))],
            &user,
            &cancel,
        )
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(500), "elapsed {elapsed:?}");
    assert_eq!(results["a"].value, json!(1));
    assert_eq!(results["b"].error.as_ref().map(|e| e.kind), Some(ErrorKind::Cancelled));

    // The client stays usable for later calls
    let pre_cancelled = CancellationToken::new();
    pre_cancelled.cancel();
    let gates = client
        .gates_with_cancel(&["admin".to_string()], &user, &pre_cancelled)
        .await;
    assert_eq!(gates.get("admin"), Some(&false));
    assert!(!client.is_closed());
    client.close().await;
}

#[tokio::test]
async fn test_track_posts_events() {
    let mut server = mockito::Server::new_async().await;
    let single = server
        .mock("POST", "/api/v1/sdk/events")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::PartialJson(json!({
                "name": "checkout",
                "user_id": "u-1",
                "properties": {"total": 42}
            })),
            mockito::Matcher::Regex("\"timestamp\"".to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/api/v1/sdk/events/batch")
        .match_body(mockito::Matcher::PartialJson(json!({
            "events": [{"name": "view", "user_id": "u-1"}, {"name": "click", "user_id": "u-2"}]
        })))
        .with_status(200)
        .with_body(json!({"success": true}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = FlagClient::new(test_config(&server.url())).unwrap();
    client
        .track(Event::new("checkout", "u-1").with_property("total", json!(42)))
        .await
        .unwrap();
    client
        .track_batch(vec![Event::new("view", "u-1"), Event::new("click", "u-2")])
        .await
        .unwrap();

    single.assert_async().await;
    batch.assert_async().await;
    let metrics = client.metrics();
    assert_eq!(metrics.events_tracked, 3);
    assert_eq!(metrics.api_calls, 2);
    client.close().await;
}

#[tokio::test]
async fn test_track_failure_is_returned() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/sdk/events")
        .with_status(400)
        .with_body(json!({"code": "BAD_EVENT", "message": "name required"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = FlagClient::new(test_config(&server.url())).unwrap();
    let err = client.track(Event::new("", "u-1")).await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.kind(), ErrorKind::Validation);
    client.close().await;
}

#[tokio::test]
async fn test_track_disabled_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut config = test_config(&server.url());
    config.enable_analytics = false;
    let client = FlagClient::new(config).unwrap();
    client.track(Event::new("checkout", "u-1")).await.unwrap();

    mock.assert_async().await;
    assert_eq!(client.metrics().events_tracked, 0);
    client.close().await;
}
