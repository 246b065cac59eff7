use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestUser};

const OCCUPYING_FILTER: &str = "in.(pending_staff_approval,scheduled,confirmed,completed,no_show)";

fn test_config(mock_server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: mock_server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
    }
}

fn create_test_app(config: AppConfig) -> Router {
    appointment_routes(Arc::new(config))
}

#[allow(clippy::too_many_arguments)]
fn appointment_row(
    appointment_id: Uuid,
    professional_id: &str,
    client_id: Option<&str>,
    date: &str,
    start_time: &str,
    duration_minutes: i32,
    status: &str,
    total_cost: Option<&str>,
    signal_paid: bool,
) -> serde_json::Value {
    json!({
        "id": appointment_id,
        "professional_id": professional_id,
        "client_id": client_id,
        "guest_name": null,
        "guest_email": null,
        "guest_phone": null,
        "date": date,
        "start_time": start_time,
        "duration_minutes": duration_minutes,
        "status": status,
        "total_cost": total_cost,
        "signal_paid": signal_paid,
        "notes": null,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

async fn send_json(
    app: Router,
    method_str: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method_str)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = builder
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        json!(null)
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Mocks shared by every path that writes into a professional's calendar:
/// the professional lookup and the slot lock acquire/release round trip.
async fn mount_calendar_mocks(mock_server: &MockServer, professional_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .and(query_param("id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::professional_response(professional_id, "Alex Reyes")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mount_outbox_mock(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// CREATE / REQUEST
// ==============================================================================

#[tokio::test]
async fn test_create_appointment_requires_admin() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));

    let (status, _) = send_json(
        app,
        "POST",
        "/",
        Some(&token),
        Some(json!({
            "professional_id": Uuid::new_v4(),
            "date": "2025-03-10",
            "start_time": "10:00:00",
            "duration_minutes": 60
        })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_creates_open_slot() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();

    mount_calendar_mocks(&mock_server, &professional_id).await;
    mount_outbox_mock(&mock_server).await;

    // No competing appointments on the day.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .and(query_param("date", "eq.2025-03-10"))
        .and(query_param("status", OCCUPYING_FILTER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "available" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            Uuid::new_v4(),
            &professional_id,
            None,
            "2025-03-10",
            "10:00:00",
            60,
            "available",
            None,
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        "/",
        Some(&token),
        Some(json!({
            "professional_id": professional_id,
            "date": "2025-03-10",
            "start_time": "10:00:00",
            "duration_minutes": 60
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "available");
}

#[tokio::test]
async fn test_admin_booking_with_client_issues_deposit() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();
    let client_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    mount_calendar_mocks(&mock_server, &professional_id).await;
    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "scheduled" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            Some(&client_id),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    // No deposit exists yet for this appointment.
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("category", "eq.deposit"))
        .and(query_param("related_resource_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // 20% of 150.00, attributed to the requesting admin.
    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .and(body_partial_json(json!({
            "amount": "30.00",
            "status": "pending",
            "category": "deposit",
            "related_resource_type": "appointment",
            "related_resource_id": appointment_id,
            "issued_by_staff_id": admin.id,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "amount": "30.00",
            "status": "pending",
            "category": "deposit",
            "related_resource_type": "appointment",
            "related_resource_id": appointment_id,
            "client_id": client_id,
            "issued_by_staff_id": admin.id,
            "description": "Booking deposit",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        "/",
        Some(&token),
        Some(json!({
            "professional_id": professional_id,
            "client_id": client_id,
            "date": "2025-03-10",
            "start_time": "10:00:00",
            "duration_minutes": 60,
            "total_cost": "150.00"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "scheduled");
}

#[tokio::test]
async fn test_overlapping_booking_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();

    mount_calendar_mocks(&mock_server, &professional_id).await;

    // 10:00-11:00 already confirmed; the request asks for 10:30.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            Uuid::new_v4(),
            &professional_id,
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "confirmed",
            Some("150.00"),
            true
        )])))
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "POST",
        "/",
        Some(&token),
        Some(json!({
            "professional_id": professional_id,
            "date": "2025-03-10",
            "start_time": "10:30:00",
            "duration_minutes": 60
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_back_to_back_booking_is_allowed() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();

    mount_calendar_mocks(&mock_server, &professional_id).await;
    mount_outbox_mock(&mock_server).await;

    // Existing 10:00-11:00; the new slot starts exactly at 11:00.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            Uuid::new_v4(),
            &professional_id,
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            Uuid::new_v4(),
            &professional_id,
            None,
            "2025-03-10",
            "11:00:00",
            30,
            "available",
            None,
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        "/",
        Some(&token),
        Some(json!({
            "professional_id": professional_id,
            "date": "2025-03-10",
            "start_time": "11:00:00",
            "duration_minutes": 30
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "available");
}

#[tokio::test]
async fn test_guest_request_without_credentials() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let professional_id = Uuid::new_v4().to_string();

    mount_calendar_mocks(&mock_server, &professional_id).await;
    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "status": "pending_staff_approval",
            "guest_name": "Sam Visitor",
            "guest_email": "sam@example.com",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "client_id": null,
            "guest_name": "Sam Visitor",
            "guest_email": "sam@example.com",
            "guest_phone": null,
            "date": "2025-03-10",
            "start_time": "14:00:00",
            "duration_minutes": 45,
            "status": "pending_staff_approval",
            "total_cost": null,
            "signal_paid": false,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        "/request/guest",
        None,
        Some(json!({
            "professional_id": professional_id,
            "date": "2025-03-10",
            "start_time": "14:00:00",
            "duration_minutes": 45,
            "guest_name": "Sam Visitor",
            "guest_email": "sam@example.com"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "pending_staff_approval");
    assert_eq!(body["appointment"]["guest_email"], "sam@example.com");
}

#[tokio::test]
async fn test_guest_request_rejects_bad_email() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config);

    let (status, _) = send_json(
        app,
        "POST",
        "/request/guest",
        None,
        Some(json!({
            "professional_id": Uuid::new_v4(),
            "date": "2025-03-10",
            "start_time": "14:00:00",
            "duration_minutes": 45,
            "guest_name": "Sam Visitor",
            "guest_email": "not-an-email"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==============================================================================
// STAFF DECISIONS
// ==============================================================================

#[tokio::test]
async fn test_professional_approves_request_and_deposit_is_issued() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let professional = TestUser::professional("pro@example.com");
    let token =
        JwtTestUtils::create_test_token(&professional, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();
    let client_id = Uuid::new_v4().to_string();

    mount_calendar_mocks(&mock_server, &professional.id).await;
    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional.id,
            Some(&client_id),
            "2025-03-10",
            "10:00:00",
            60,
            "pending_staff_approval",
            None,
            false
        )])))
        .mount(&mock_server)
        .await;

    // Approval re-checks the slot excluding the request itself.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({ "status": "scheduled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional.id,
            Some(&client_id),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("200.00"),
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("related_resource_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .and(body_partial_json(json!({
            "amount": "40.00",
            "category": "deposit",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "amount": "40.00",
            "status": "pending",
            "category": "deposit",
            "related_resource_type": "appointment",
            "related_resource_id": appointment_id,
            "client_id": client_id,
            "issued_by_staff_id": professional.id,
            "description": "Booking deposit",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/respond", appointment_id),
        Some(&token),
        Some(json!({ "decision": "accept", "total_cost": "200.00" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "scheduled");
}

#[tokio::test]
async fn test_professional_rejects_request() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let professional = TestUser::professional("pro@example.com");
    let token =
        JwtTestUtils::create_test_token(&professional, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional.id,
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "pending_staff_approval",
            None,
            false
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "rejected_by_staff" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional.id,
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "rejected_by_staff",
            None,
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/respond", appointment_id),
        Some(&token),
        Some(json!({ "decision": "reject" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "rejected_by_staff");
}

#[tokio::test]
async fn test_other_professional_cannot_respond() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let professional = TestUser::professional("other@example.com");
    let token =
        JwtTestUtils::create_test_token(&professional, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    // Request belongs to a different professional's calendar.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &Uuid::new_v4().to_string(),
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "pending_staff_approval",
            None,
            false
        )])))
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "POST",
        &format!("/{}/respond", appointment_id),
        Some(&token),
        Some(json!({ "decision": "accept", "total_cost": "200.00" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ==============================================================================
// CLIENT SLOT ACTIONS
// ==============================================================================

#[tokio::test]
async fn test_client_books_open_slot() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    mount_calendar_mocks(&mock_server, &professional_id).await;
    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            None,
            "2025-03-10",
            "10:00:00",
            60,
            "available",
            Some("100.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    // The professional's calendar is otherwise clear.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // The caller has nothing else booked over this window.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("client_id", format!("eq.{}", client.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({
            "client_id": client.id,
            "status": "scheduled",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            Some(&client.id),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("100.00"),
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("related_resource_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .and(body_partial_json(json!({
            "amount": "20.00",
            "category": "deposit",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "amount": "20.00",
            "status": "pending",
            "category": "deposit",
            "related_resource_type": "appointment",
            "related_resource_id": appointment_id,
            "client_id": client.id,
            "issued_by_staff_id": null,
            "description": "Booking deposit",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/book", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "scheduled");
    assert_eq!(body["appointment"]["client_id"], client.id);
}

#[tokio::test]
async fn test_booking_taken_slot_fails() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &Uuid::new_v4().to_string(),
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("100.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "POST",
        &format!("/{}/book", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_booking_open_slot_rejects_calendar_overlap() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    mount_calendar_mocks(&mock_server, &professional_id).await;

    // The published slot: 10:00-11:00, still open.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            None,
            "2025-03-10",
            "10:00:00",
            60,
            "available",
            Some("100.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    // An approved request landed on top of it: 10:15-11:15, scheduled.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            Uuid::new_v4(),
            &professional_id,
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:15:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "POST",
        &format!("/{}/book", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_attaching_client_to_open_slot_rechecks_calendar() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // The slot itself does not move, but attaching a client makes it occupy
    // its window, so the calendar must be re-checked.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            None,
            "2025-03-10",
            "10:00:00",
            60,
            "available",
            None,
            false
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            Uuid::new_v4(),
            &professional_id,
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:30:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "PUT",
        &format!("/{}", appointment_id),
        Some(&token),
        Some(json!({
            "client_id": Uuid::new_v4(),
            "total_cost": "150.00"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unpaid_booking_cannot_be_confirmed_by_edit() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &Uuid::new_v4().to_string(),
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "PUT",
        &format!("/{}", appointment_id),
        Some(&token),
        Some(json!({ "status": "confirmed" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unpaid_cancellation_reopens_slot_and_voids_deposit() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();
    let deposit_id = Uuid::new_v4();

    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            Some(&client.id),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("related_resource_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": deposit_id,
            "amount": "30.00",
            "status": "pending",
            "category": "deposit",
            "related_resource_type": "appointment",
            "related_resource_id": appointment_id,
            "client_id": client.id,
            "issued_by_staff_id": null,
            "description": "Booking deposit",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .and(query_param("id", format!("eq.{}", deposit_id)))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": deposit_id,
            "amount": "30.00",
            "status": "cancelled",
            "category": "deposit",
            "related_resource_type": "appointment",
            "related_resource_id": appointment_id,
            "client_id": client.id,
            "issued_by_staff_id": null,
            "description": "Booking deposit",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({
            "status": "available",
            "client_id": null,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            None,
            "2025-03-10",
            "10:00:00",
            60,
            "available",
            None,
            false
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/cancel", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "available");
    assert_eq!(body["appointment"]["client_id"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_paid_cancellation_closes_booking() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4();

    mount_outbox_mock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            Some(&client.id),
            "2025-03-10",
            "10:00:00",
            60,
            "confirmed",
            Some("150.00"),
            true
        )])))
        .mount(&mock_server)
        .await;

    // The slot stays consumed; the paid deposit is not touched.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({ "status": "cancelled_by_client" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &professional_id,
            Some(&client.id),
            "2025-03-10",
            "10:00:00",
            60,
            "cancelled_by_client",
            Some("150.00"),
            true
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/cancel", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "cancelled_by_client");
    assert_eq!(body["appointment"]["signal_paid"], true);
}

#[tokio::test]
async fn test_cancel_requires_booked_client() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("someone-else@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &Uuid::new_v4().to_string(),
            Some(&Uuid::new_v4().to_string()),
            "2025-03-10",
            "10:00:00",
            60,
            "scheduled",
            Some("150.00"),
            false
        )])))
        .mount(&mock_server)
        .await;

    let (status, _) = send_json(
        app,
        "POST",
        &format!("/{}/cancel", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ==============================================================================
// READS / ADMIN EDITS
// ==============================================================================

#[tokio::test]
async fn test_list_appointments_client_sees_own_and_open() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let client = TestUser::client("client@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, Some(24));
    let professional_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param(
            "or",
            format!("(client_id.eq.{},status.eq.available)", client.id),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(
                Uuid::new_v4(),
                &professional_id,
                Some(&client.id),
                "2025-03-10",
                "10:00:00",
                60,
                "scheduled",
                Some("150.00"),
                false
            ),
            appointment_row(
                Uuid::new_v4(),
                &professional_id,
                None,
                "2025-03-11",
                "09:00:00",
                30,
                "available",
                None,
                false
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(app, "GET", "/", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_update_appointment_requires_admin() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let professional = TestUser::professional("pro@example.com");
    let token =
        JwtTestUtils::create_test_token(&professional, &config.supabase_jwt_secret, Some(24));

    let (status, _) = send_json(
        app,
        "PUT",
        &format!("/{}", Uuid::new_v4()),
        Some(&token),
        Some(json!({ "notes": "moved" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_deletes_appointment() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone());

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.supabase_jwt_secret, Some(24));
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            appointment_id,
            &Uuid::new_v4().to_string(),
            None,
            "2025-03-10",
            "10:00:00",
            60,
            "available",
            None,
            false
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, body) = send_json(
        app,
        "DELETE",
        &format!("/{}", appointment_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_protected_routes_reject_missing_token() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config);

    let (status, _) = send_json(app, "GET", "/", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
