//! HTTP behaviour of the evidence intake and alert history routes.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, jpeg_data_url, send, TestServer};
use serde_json::json;

fn evidence_body(user_id: i64, session: &str, sequence_index: i64) -> serde_json::Value {
    json!({
        "userID": user_id,
        "alertType": "FIRE",
        "sessionID": session,
        "sequenceIndex": sequence_index,
        "timestamp": 1_700_000_000_000i64,
        "image": jpeg_data_url(),
    })
}

#[tokio::test]
async fn health_reports_ok_without_database() {
    let server = TestServer::new();
    let response = send(server.router(), Method::GET, "/api/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["db_healthy"], true);
}

#[tokio::test]
async fn evidence_upload_is_stored_and_served() {
    let server = TestServer::new();

    let response = send(
        server.router(),
        Method::POST,
        "/api/alerts/evidence",
        None,
        Some(evidence_body(5, "sess-http", 1)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    let alert_id = json["alertID"].as_i64().unwrap();
    let saved = json["saved"].as_str().unwrap().to_string();
    assert_eq!(saved, format!("uploads/evidence_{}_1.jpg", alert_id));

    let image = send(server.router(), Method::GET, &format!("/{}", saved), None, None).await;
    assert_eq!(image.status(), StatusCode::OK);
}

#[tokio::test]
async fn string_identifiers_are_accepted() {
    let server = TestServer::new();
    let mut body = evidence_body(0, "sess-text", 2);
    body["userID"] = json!("5");
    body["sequenceIndex"] = json!(2);

    let response = send(server.router(), Method::POST, "/api/alerts/evidence", None, Some(body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.store.alert_count().await, 1);
}

#[tokio::test]
async fn missing_session_is_rejected_without_side_effects() {
    let server = TestServer::new();
    let mut body = evidence_body(5, "unused", 1);
    body.as_object_mut().unwrap().remove("sessionID");

    let response = send(server.router(), Method::POST, "/api/alerts/evidence", None, Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("sessionID"));
    assert_eq!(server.store.alert_count().await, 0);
    assert_eq!(server.store.evidence_count().await, 0);
}

#[tokio::test]
async fn history_requires_a_bearer_token() {
    let server = TestServer::new();

    let response = send(server.router(), Method::GET, "/api/alerts", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(server.router(), Method::GET, "/api/alerts", Some("not-a-jwt"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_lists_details_and_deletes() {
    let server = TestServer::new();
    for index in [2, 1, 3] {
        let response = send(
            server.router(),
            Method::POST,
            "/api/alerts/evidence",
            None,
            Some(evidence_body(5, "sess-history", index)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let token = server.token_for(5);

    let list = body_json(send(server.router(), Method::GET, "/api/alerts", Some(&token), None).await).await;
    let alerts = list["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["alertType"], "fire");
    let alert_id = alerts[0]["alertID"].as_i64().unwrap();

    let detail_uri = format!("/api/alerts/{}", alert_id);
    let detail = body_json(send(server.router(), Method::GET, &detail_uri, Some(&token), None).await).await;
    let indices: Vec<i64> = detail["alert"]["evidences"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["sequenceIndex"].as_i64().unwrap())
        .collect();
    assert_eq!(indices, vec![1, 2, 3]);

    // Another user cannot see or delete it
    let stranger = server.token_for(6);
    let response = send(server.router(), Method::GET, &detail_uri, Some(&stranger), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(server.router(), Method::DELETE, &detail_uri, Some(&stranger), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(server.router(), Method::DELETE, &detail_uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.store.evidence_count().await, 0);

    let response = send(server.router(), Method::GET, &detail_uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let image_uri = format!("/uploads/evidence_{}_1.jpg", alert_id);
    let response = send(server.router(), Method::GET, &image_uri, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
