//! REST venue adapter tests against a stubbed bridge server.

use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;
use signal_relay::config::GatewaySettings;
use signal_relay::gateway::{ExecutionRequest, RestVenue, VenueClient, VenueError};
use signal_relay::{Signal, SignalRecord, TradeCredentials};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn venue_for(server: &MockServer) -> RestVenue {
    RestVenue::new(&GatewaySettings {
        rest_base_url: server.uri(),
        call_timeout: Duration::from_secs(2),
        ..GatewaySettings::default()
    })
    .unwrap()
}

fn credentials() -> TradeCredentials {
    TradeCredentials::new(
        "8812345".to_string(),
        "Demo-Server".to_string(),
        "pw".to_string(),
    )
}

fn request(kind: &str, ticket: Option<i64>) -> ExecutionRequest {
    let signal = Signal::from_record(SignalRecord {
        id: Some("sig-1".to_string()),
        kind: kind.to_string(),
        instrument: "EURUSD".to_string(),
        volume: dec!(0.10),
        price: Some(dec!(1.0850)),
        stop: Some(dec!(1.0800)),
        target: Some(dec!(1.0950)),
        ticket,
        owner: "1001".to_string(),
        account_ref: None,
        comment: Some("relay".to_string()),
        tag: None,
    })
    .unwrap();
    ExecutionRequest::from_signal(&signal)
}

#[tokio::test]
async fn placement_posts_credentials_and_parses_ticket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trades"))
        .and(body_partial_json(json!({
            "symbol": "EURUSD",
            "command": "open_buy",
            "login": "8812345",
            "server": "Demo-Server",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "success",
            "data": { "ticket": 33333, "message": "order placed" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    let reply = venue
        .execute(&request("open_buy", None), &credentials())
        .await
        .unwrap();

    assert_eq!(reply.ticket, Some(33333));
    assert_eq!(reply.message, "order placed");
}

#[tokio::test]
async fn business_rejection_maps_to_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trades"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "status": "error",
            "message": "insufficient margin"
        })))
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    let err = venue
        .execute(&request("open_buy", None), &credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, VenueError::Rejected(reason) if reason.contains("insufficient margin")));
}

#[tokio::test]
async fn server_failure_maps_to_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trades"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({
            "status": "error",
            "message": "bad gateway"
        })))
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    let err = venue
        .execute(&request("open_buy", None), &credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, VenueError::Transport(_)));
}

#[tokio::test]
async fn unreachable_bridge_maps_to_transport() {
    // Nothing is listening on this port.
    let venue = RestVenue::new(&GatewaySettings {
        rest_base_url: "http://127.0.0.1:1".to_string(),
        call_timeout: Duration::from_millis(500),
        ..GatewaySettings::default()
    })
    .unwrap();

    let err = venue
        .execute(&request("open_buy", None), &credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, VenueError::Transport(_)));
    assert!(!venue.probe().await);
}

#[tokio::test]
async fn modify_puts_to_the_ticket_resource() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/trades/777"))
        .and(body_partial_json(json!({ "sl": "1.0800", "tp": "1.0950" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "message": "modified" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    let reply = venue
        .execute(&request("modify", Some(777)), &credentials())
        .await
        .unwrap();

    // No new ticket on modify; the gateway falls back to the signal's.
    assert_eq!(reply.ticket, None);
    assert_eq!(reply.message, "modified");
}

#[tokio::test]
async fn close_deletes_the_ticket_resource() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/trades/777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "ticket": 777, "message": "closed" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    let reply = venue
        .execute(&request("close", Some(777)), &credentials())
        .await
        .unwrap();

    assert_eq!(reply.ticket, Some(777));
}

#[tokio::test]
async fn status_query_reads_open_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trades/777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "ticket": 777, "is_open": true }
        })))
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    let status = venue.query_status(777).await.unwrap();
    assert_eq!(status.ticket, 777);
    assert!(status.is_open);
}

#[tokio::test]
async fn probe_accepts_ok_and_success_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })),
        )
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    assert!(venue.probe().await);
}

#[tokio::test]
async fn probe_rejects_unhealthy_replies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "status": "error" })))
        .mount(&server)
        .await;

    let venue = venue_for(&server);
    assert!(!venue.probe().await);
}
