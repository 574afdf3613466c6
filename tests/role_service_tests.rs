use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use course_portal::{
    AppConfig, Credentials, GuardDecision, HttpRoleResolver, InMemoryIdentityProvider, Loading,
    PortalContext, Role, RoleLookupError, RoleResolver,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// --- Mock Role Service ---

const TOKEN: &str = "s3cret";

async fn role_handler(
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let email = params.get("email").cloned().unwrap_or_default();
    let record = |role: &str| {
        Json(serde_json::json!({
            "role": role,
            "name": "Ada",
            "email": email,
            "createdAt": "2024-01-15T09:30:00Z",
        }))
        .into_response()
    };

    match email.as_str() {
        "admin@portal.io" => record("admin"),
        "student@portal.io" => record("student"),
        "down@portal.io" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "garbled@portal.io" => (StatusCode::OK, "<html>oops</html>").into_response(),
        "token@portal.io" => {
            let expected = format!("Bearer {}", TOKEN);
            match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                Some(value) if value == expected => record("admin"),
                _ => StatusCode::UNAUTHORIZED.into_response(),
            }
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_role_service() -> String {
    let app = Router::new().route("/users/role", get(role_handler));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn resolver(address: &str, token: Option<&str>) -> HttpRoleResolver {
    HttpRoleResolver::new(address, token.map(str::to_string), Duration::from_secs(5)).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn test_resolves_role_record() {
    let address = spawn_role_service().await;
    let record = resolver(&address, None).resolve("admin@portal.io").await.unwrap();

    assert_eq!(record.role, Role::Admin);
    assert_eq!(record.name, "Ada");
    assert_eq!(record.email, "admin@portal.io");
    assert_eq!(
        record.created_at.map(|t| t.to_rfc3339()),
        Some("2024-01-15T09:30:00+00:00".to_string())
    );
}

#[tokio::test]
async fn test_trailing_slash_in_base_url_is_tolerated() {
    let address = spawn_role_service().await;
    let record = resolver(&format!("{}/", address), None)
        .resolve("student@portal.io")
        .await
        .unwrap();
    assert_eq!(record.role, Role::Student);
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let address = spawn_role_service().await;
    let result = resolver(&address, None).resolve("down@portal.io").await;
    assert_eq!(result, Err(RoleLookupError::Status(500)));
}

#[tokio::test]
async fn test_missing_user_maps_to_not_found() {
    let address = spawn_role_service().await;
    let result = resolver(&address, None).resolve("ghost@portal.io").await;
    assert_eq!(result, Err(RoleLookupError::NotFound("ghost@portal.io".to_string())));
}

#[tokio::test]
async fn test_malformed_body_maps_to_decode_error() {
    let address = spawn_role_service().await;
    let result = resolver(&address, None).resolve("garbled@portal.io").await;
    assert!(matches!(result, Err(RoleLookupError::Decode(_))));
}

#[tokio::test]
async fn test_unreachable_service_maps_to_transport_error() {
    // Bind and drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = resolver(&format!("http://127.0.0.1:{}", port), None)
        .resolve("admin@portal.io")
        .await;
    assert!(matches!(result, Err(RoleLookupError::Transport(_))));
}

#[tokio::test]
async fn test_bearer_token_is_sent_when_configured() {
    let address = spawn_role_service().await;

    let anonymous = resolver(&address, None).resolve("token@portal.io").await;
    assert_eq!(anonymous, Err(RoleLookupError::Status(401)));

    let authorized = resolver(&address, Some(TOKEN)).resolve("token@portal.io").await;
    assert_eq!(authorized.map(|r| r.role), Ok(Role::Admin));
}

#[tokio::test]
async fn test_role_service_outage_degrades_session_but_renders() {
    let address = spawn_role_service().await;
    let provider = Arc::new(InMemoryIdentityProvider::new());
    provider.add_account("down@portal.io", "Secret1", None);

    let portal = PortalContext::new(
        AppConfig::default(),
        provider,
        Arc::new(resolver(&address, None)),
    );
    portal.session().wait_until_settled().await;

    let credentials = Credentials::try_new("down@portal.io", "Secret1").unwrap();
    portal.session().sign_in(&credentials).await.unwrap();

    let mut rx = portal.session().observe();
    let session = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.email() == Some("down@portal.io") && s.is_settled()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(session.loading, Loading::Ready);
    assert_eq!(session.role, Some(Role::Unresolved));
    assert_eq!(session.last_error, Some(RoleLookupError::Status(500)));
    assert_eq!(portal.guard("/dashboard/student/overview"), GuardDecision::Render);
}
