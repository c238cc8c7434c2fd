use drifthound::{
    models::{ChannelOwner, EnvironmentStatus},
    persistence::traits::{ChannelRepository, LedgerRepository},
};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn create_check_provisions_and_returns_created() {
    let server = TestServer::new().await;

    let resp = server
        .post_check(
            "my-app",
            "production",
            json!({ "status": "drift", "add_count": 2, "change_count": 1 }),
        )
        .await;

    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["project_key"], "my-app");
    assert_eq!(body["environment_key"], "production");
    assert_eq!(body["status"], "drift");
    assert_eq!(body["execution_number"], 1);
    assert!(body["id"].is_i64());

    let project = server.repo.find_or_create_project("my-app", "ignored").await.unwrap();
    assert_eq!(project.name, "My App");
    let check = server.repo.get_check(body["id"].as_i64().unwrap()).await.unwrap().unwrap();
    assert_eq!(check.add_count, Some(2));

    server.shutdown().await;
}

#[tokio::test]
async fn status_changes_are_queued_for_delivery() {
    let mut server = TestServer::new().await;

    server.post_check("acme", "prod", json!({ "status": "ok" })).await;
    let resp = server.post_check("acme", "prod", json!({ "status": "error" })).await;
    assert_eq!(resp.status(), 201);

    let first = server.queued.recv().await.unwrap();
    let second = server.queued.recv().await.unwrap();
    assert_eq!(first.new_status, EnvironmentStatus::Ok);
    assert_eq!(
        (second.old_status, second.new_status),
        (EnvironmentStatus::Ok, EnvironmentStatus::Error)
    );

    server.post_check("acme", "prod", json!({ "status": "error" })).await;
    let lateral = server.queued.recv().await.unwrap();
    assert_eq!(lateral.old_status, lateral.new_status);

    server.shutdown().await;
}

#[tokio::test]
async fn notification_channel_is_stored_without_token() {
    let server = TestServer::new().await;

    let resp = server
        .post_check(
            "acme",
            "prod",
            json!({
                "status": "ok",
                "notification_channel": {
                    "channel_kind": "slack",
                    "config": { "channel": "#ops", "token": "xoxb-leak" }
                }
            }),
        )
        .await;
    assert_eq!(resp.status(), 201);

    let project = server.repo.find_or_create_project("acme", "Acme").await.unwrap();
    let env = server.repo.find_or_create_environment(project.id, "prod", "Prod").await.unwrap();
    let channel =
        server.repo.find_channel(ChannelOwner::Environment(env.id), "slack").await.unwrap().unwrap();
    assert!(channel.enabled);
    assert_eq!(channel.config["channel"], "#ops");
    assert!(!channel.config.contains_key("token"));

    server.shutdown().await;
}

#[tokio::test]
async fn invalid_key_is_rejected() {
    let server = TestServer::new().await;

    let resp = server.post_check("acme", "prod%20eu", json!({ "status": "ok" })).await;

    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("prod eu"));

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let server = TestServer::new().await;

    let resp = server.post_check("acme", "prod", json!({ "status": "broken" })).await;

    assert_eq!(resp.status(), 422);
    server.shutdown().await;
}

#[tokio::test]
async fn missing_or_wrong_token_is_unauthorized() {
    let server = TestServer::new().await;

    let missing =
        server.post_check_with_token("acme", "prod", json!({ "status": "ok" }), None).await;
    let wrong = server
        .post_check_with_token("acme", "prod", json!({ "status": "ok" }), Some("nope"))
        .await;

    assert_eq!(missing.status(), 401);
    assert_eq!(wrong.status(), 401);
    let body: serde_json::Value = wrong.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");

    server.shutdown().await;
}

#[tokio::test]
async fn submissions_are_rejected_without_configured_key() {
    let server = TestServer::with_api_key(None).await;

    let resp = server.post_check("acme", "prod", json!({ "status": "ok" })).await;

    assert_eq!(resp.status(), 401);
    server.shutdown().await;
}
