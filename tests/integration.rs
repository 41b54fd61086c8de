use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use laundry_lifecycle::api::rest::router;
use laundry_lifecycle::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> Router {
    router(Arc::new(AppState::new(1024)))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn create_driver(app: &Router, name: &str, background_checked: bool) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/drivers",
            json!({ "name": name, "background_checked": background_checked }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

async fn post_order(app: &Router, client_id: Uuid) -> String {
    let (status, body) = send(
        app,
        json_request("POST", "/orders", json!({ "client_id": client_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["order"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["open_orders"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["units"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("open_orders"));
}

#[tokio::test]
async fn create_driver_empty_name_returns_400() {
    let app = setup();
    let (status, body) = send(
        &app,
        json_request("POST", "/drivers", json!({ "name": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_order_returns_posted_pickup() {
    let app = setup();
    let client = Uuid::new_v4();
    let (status, body) = send(
        &app,
        json_request("POST", "/orders", json!({ "client_id": client })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "PostedPickup");
    assert_eq!(body["order"]["pick_up_driver"], "unassigned");
    assert_eq!(body["order"]["is_drop_off"], false);
    assert_eq!(body["order"]["event_log"].as_array().unwrap().len(), 1);
    assert!(body["registry_warnings"].as_array().unwrap().is_empty());

    let (_, available) = send(&app, get_request("/orders/available")).await;
    assert_eq!(available.as_array().unwrap().len(), 1);

    let (_, filtered) = send(&app, get_request("/orders?status=Complete")).await;
    assert!(filtered.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn second_claim_returns_409() {
    let app = setup();
    let first = create_driver(&app, "Avery", true).await;
    let second = create_driver(&app, "Blair", true).await;
    let order_id = post_order(&app, Uuid::new_v4()).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/claim"),
            json!({ "driver_id": first, "role": "pickup" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "PickupDriverEnRoute");
    assert_eq!(body["order"]["pick_up_driver"]["assigned_to"], first);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/claim"),
            json!({ "driver_id": second, "role": "pickup" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "claim_lost");

    let (_, active) = send(&app, get_request(&format!("/drivers/{second}/active-orders"))).await;
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unchecked_driver_cannot_claim_until_cleared() {
    let app = setup();
    let driver = create_driver(&app, "Quinn", false).await;
    let order_id = post_order(&app, Uuid::new_v4()).await;
    let claim = json!({ "driver_id": driver, "role": "pickup" });

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/orders/{order_id}/claim"), claim.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/drivers/{driver}/background-check"),
            json!({ "background_checked": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/orders/{order_id}/claim"), claim),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cancel_after_client_pickup_returns_409() {
    let app = setup();
    let client = Uuid::new_v4();
    let driver = create_driver(&app, "Avery", true).await;
    let order_id = post_order(&app, client).await;

    send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/claim"),
            json!({ "driver_id": driver, "role": "pickup" }),
        ),
    )
    .await;
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/client-pickup"),
            json!({ "driver_id": driver }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({ "actor": { "kind": "Client", "id": client } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["status"], "ClothesToCleaner");
}

#[tokio::test]
async fn cancel_posted_order_closes_it() {
    let app = setup();
    let client = Uuid::new_v4();
    let order_id = post_order(&app, client).await;
    let cancel = json!({ "actor": { "kind": "Client", "id": client } });

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/orders/{order_id}/cancel"), cancel.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "Cancelled");
    assert_eq!(body["order"]["order_closed"], true);

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/orders/{order_id}/cancel"), cancel),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_closed");
}

#[tokio::test]
async fn unit_queue_feeds_driver_created_orders() {
    let app = setup();
    let client = Uuid::new_v4();
    let driver = create_driver(&app, "Avery", true).await;

    let (status, unit) = send(
        &app,
        json_request(
            "POST",
            "/units",
            json!({ "building": "Maple Court", "unit_number": "4B", "client_id": client }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let unit_id = unit["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, empty_request("POST", &format!("/units/{unit_id}/queue"))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, queue) = send(&app, get_request("/units/queue")).await;
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["id"], unit_id);

    let (status, created) = send(
        &app,
        json_request(
            "POST",
            &format!("/units/{unit_id}/orders"),
            json!({ "driver_id": driver }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["order"]["status"], "PickupDriverEnRoute");
    assert_eq!(created["order"]["client_id"], client.to_string());
    let order_id = created["order"]["id"].as_str().unwrap().to_string();

    let (_, queue) = send(&app, get_request("/units/queue")).await;
    assert!(queue.as_array().unwrap().is_empty());

    let (_, unit) = send(&app, get_request(&format!("/units/{unit_id}"))).await;
    assert_eq!(unit["occupancy"]["occupied"]["order_id"], order_id);

    let (status, body) = send(&app, empty_request("POST", &format!("/units/{unit_id}/queue"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (_, active) = send(&app, get_request(&format!("/drivers/{driver}/active-orders"))).await;
    assert_eq!(active[0]["id"], order_id);
}

#[tokio::test]
async fn reconcile_reports_no_drift_on_consistent_state() {
    let app = setup();
    let driver = create_driver(&app, "Avery", true).await;
    let order_id = post_order(&app, Uuid::new_v4()).await;
    send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/claim"),
            json!({ "driver_id": driver, "role": "pickup" }),
        ),
    )
    .await;

    let (status, report) = send(&app, empty_request("POST", "/reconcile")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["orders_scanned"], 1);
    assert_eq!(report["driver_repairs"], 0);
    assert_eq!(report["cleaner_repairs"], 0);
    assert_eq!(report["unit_repairs"], 0);
}

#[tokio::test]
async fn full_order_lifecycle() {
    let app = setup();
    let client = Uuid::new_v4();
    let pickup_driver = create_driver(&app, "Avery", true).await;
    let dropoff_driver = create_driver(&app, "Blair", true).await;

    let (_, cleaner) = send(
        &app,
        json_request(
            "POST",
            "/cleaners",
            json!({ "name": "Fresh Press", "address": "12 Press Street" }),
        ),
    )
    .await;
    let cleaner_id = cleaner["id"].as_str().unwrap().to_string();

    let (_, staff) = send(
        &app,
        json_request(
            "POST",
            &format!("/cleaners/{cleaner_id}/staff"),
            json!({ "name": "Casey" }),
        ),
    )
    .await;
    let staff_id = staff["id"].as_str().unwrap().to_string();

    let (_, shirt) = send(
        &app,
        json_request("POST", "/services", json!({ "name": "Shirt", "price_cents": 500 })),
    )
    .await;
    let shirt_id = shirt["id"].as_str().unwrap().to_string();

    let order_id = post_order(&app, client).await;
    let order_uri = |step: &str| format!("/orders/{order_id}/{step}");

    let steps = vec![
        (
            "POST",
            order_uri("claim"),
            json!({ "driver_id": pickup_driver, "role": "pickup" }),
            "PickupDriverEnRoute",
        ),
        (
            "POST",
            order_uri("client-pickup"),
            json!({ "driver_id": pickup_driver }),
            "ClothesToCleaner",
        ),
        (
            "POST",
            order_uri("drop-at-cleaner"),
            json!({ "driver_id": pickup_driver, "cleaner_id": cleaner_id }),
            "AwaitingPricing",
        ),
        (
            "POST",
            order_uri("approve-drop-off"),
            json!({ "staff_id": staff_id }),
            "AwaitingPricing",
        ),
        (
            "PUT",
            order_uri("pricing"),
            json!({
                "staff_id": staff_id,
                "services": [{ "service_id": shirt_id, "quantity": 4 }]
            }),
            "AwaitingClean",
        ),
        (
            "POST",
            order_uri("machine"),
            json!({ "staff_id": staff_id, "machine_id": Uuid::new_v4() }),
            "BeingCleaned",
        ),
        (
            "DELETE",
            order_uri("machine"),
            json!({ "staff_id": staff_id }),
            "BeingCleaned",
        ),
        ("POST", order_uri("ready"), json!({ "staff_id": staff_id }), "Ready"),
        ("POST", order_uri("payment"), json!({}), "Ready"),
        (
            "POST",
            order_uri("request-delivery"),
            json!({ "actor": { "kind": "Client", "id": client } }),
            "PostedDropoff",
        ),
        (
            "POST",
            order_uri("claim"),
            json!({ "driver_id": dropoff_driver, "role": "dropoff" }),
            "DropoffDriverEnRoute",
        ),
        (
            "POST",
            order_uri("cleaner-pickup"),
            json!({ "driver_id": dropoff_driver }),
            "PickedUpFromCleaner",
        ),
        (
            "POST",
            order_uri("client-dropoff"),
            json!({ "driver_id": dropoff_driver }),
            "Complete",
        ),
    ];

    for (method, uri, body, expected) in steps {
        let (status, outcome) = send(&app, json_request(method, &uri, body)).await;
        assert_eq!(status, StatusCode::OK, "{method} {uri}: {outcome}");
        assert_eq!(outcome["order"]["status"], expected, "{method} {uri}");
        assert!(outcome["registry_warnings"].as_array().unwrap().is_empty());
    }

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["order_total_cents"], 2000);
    assert_eq!(order["order_paid_for"], true);
    assert_eq!(order["order_closed"], true);
    assert_eq!(order["is_drop_off"], true);

    let (_, events) = send(&app, get_request(&format!("/orders/{order_id}/events"))).await;
    assert_eq!(events.as_array().unwrap().len(), 14);

    for uri in [
        format!("/drivers/{pickup_driver}/active-orders"),
        format!("/drivers/{dropoff_driver}/active-orders"),
        format!("/cleaners/{cleaner_id}/active-orders"),
    ] {
        let (status, active) = send(&app, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(active.as_array().unwrap().is_empty(), "{uri}");
    }

    let (_, health) = send(&app, get_request("/health")).await;
    assert_eq!(health["orders"], 1);
    assert_eq!(health["open_orders"], 0);
}
