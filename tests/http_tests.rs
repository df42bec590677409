//! HTTP API tests driving the router over the in-memory store

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::Duration;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use fleet_pulse_users::auth::{
        AccessTokenCodec, AuthService, InviteTokenCodec, PasswordHasher, MIN_HASH_COST,
    };
    use fleet_pulse_users::db::MemoryStore;
    use fleet_pulse_users::models::User;
    use fleet_pulse_users::routes::build_router;
    use fleet_pulse_users::state::AppState;
    use fleet_pulse_users::users::{InviteDelivery, UserService};

    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InviteDelivery for RecordingDelivery {
        async fn deliver(&self, _user: &User, invite_token: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(invite_token.to_string());
            Ok(())
        }
    }

    fn app() -> (Router, Arc<RecordingDelivery>) {
        let store = MemoryStore::new();
        let hasher = PasswordHasher::new(MIN_HASH_COST);
        let delivery = Arc::new(RecordingDelivery::default());

        let auth_service = Arc::new(AuthService::new(
            store.clone(),
            hasher,
            Arc::new(AccessTokenCodec::new("access-secret")),
            Duration::minutes(10),
            Duration::hours(72),
        ));
        let user_service = Arc::new(UserService::new(
            store.clone(),
            hasher,
            Arc::new(InviteTokenCodec::new("invite-secret", Duration::hours(72))),
            delivery.clone(),
        ));

        let router = build_router(AppState::new(auth_service, user_service, store));
        (router, delivery)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, value)
    }

    async fn register(app: &Router, email: &str, password: Option<&str>) -> (StatusCode, Value) {
        let mut body = json!({
            "first_name": "Test",
            "last_name": "User",
            "email": email,
        });
        if let Some(password) = password {
            body["password"] = json!(password);
        }
        send(app, Method::POST, "/v1/users", Some(body), None).await
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            app,
            Method::POST,
            "/v1/login",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    #[tokio::test]
    async fn test_register_accept_login_and_current_user() {
        let (app, delivery) = app();

        let (status, user) = register(&app, "alice@example.com", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["email"], "alice@example.com");
        assert!(user.get("password_hash").is_none());

        let invite = delivery.sent.lock().unwrap().last().unwrap().clone();
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/users/invite/accept",
            Some(json!({ "token": invite, "password": "pw123" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, tokens) = login(&app, "alice@example.com", "pw123").await;
        assert_eq!(status, StatusCode::CREATED);
        let access = tokens["token"].as_str().unwrap().to_string();
        assert!(tokens["refreshToken"].as_str().is_some());

        let (status, me) = send(&app, Method::GET, "/v1/users/current", None, Some(&access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], user["id"]);
    }

    #[tokio::test]
    async fn test_refresh_rotation_over_http() {
        let (app, _) = app();
        register(&app, "bob@example.com", Some("pw")).await;
        let (_, tokens) = login(&app, "bob@example.com", "pw").await;
        let secret = tokens["refreshToken"].as_str().unwrap().to_string();

        let (status, rotated) = send(
            &app,
            Method::POST,
            "/v1/refresh",
            Some(json!({ "refresh_token": secret })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["refreshToken"].as_str().unwrap(), secret);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/refresh",
            Some(json!({ "refresh_token": secret })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_login_failures_are_forbidden() {
        let (app, _) = app();
        register(&app, "carol@example.com", Some("pw")).await;

        let (status, wrong_password) = login(&app, "carol@example.com", "nope").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, unknown) = login(&app, "ghost@example.com", "pw").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(unknown["error"]["message"], wrong_password["error"]["message"]);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflict() {
        let (app, _) = app();
        let (status, _) = register(&app, "dup@example.com", None).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = register(&app, "dup@example.com", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_invalid_payloads_are_bad_requests() {
        let (app, _) = app();

        let (status, body) = register(&app, "not-an-email", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/login",
            Some(json!({ "email": "x@example.com" })),
            None,
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_current_user_requires_valid_token() {
        let (app, _) = app();

        let (status, _) = send(&app, Method::GET, "/v1/users/current", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(&app, Method::GET, "/v1/users/current", None, Some("garbage")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let expired = AccessTokenCodec::new("access-secret")
            .issue(Uuid::new_v4(), Duration::seconds(-5))
            .unwrap();
        let (status, _) =
            send(&app, Method::GET, "/v1/users/current", None, Some(&expired)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_current_user_rejects_token_from_other_secret() {
        let (app, delivery) = app();
        register(&app, "mallory@example.com", None).await;
        let invite = delivery.sent.lock().unwrap().last().unwrap().clone();

        let foreign = AccessTokenCodec::new("invite-secret")
            .issue(Uuid::new_v4(), Duration::minutes(5))
            .unwrap();
        for token in [foreign.as_str(), invite.as_str()] {
            let (status, body) =
                send(&app, Method::GET, "/v1/users/current", None, Some(token)).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body["error"]["message"], "invalid token");
        }
    }

    #[tokio::test]
    async fn test_current_user_deleted_account_not_found() {
        let (app, _) = app();
        let token = AccessTokenCodec::new("access-secret")
            .issue(Uuid::new_v4(), Duration::minutes(5))
            .unwrap();

        let (status, body) =
            send(&app, Method::GET, "/v1/users/current", None, Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_accept_invite_with_bad_token() {
        let (app, _) = app();
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/users/invite/accept",
            Some(json!({ "token": "bogus", "password": "pw" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_internal_search() {
        let (app, _) = app();
        let (_, a) = register(&app, "a@example.com", None).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/internal/users/search",
            Some(json!({ "user_ids": [a["id"], Uuid::new_v4()] })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let found = body.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["email"], "a@example.com");
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _) = app();

        for path in ["/health", "/ready", "/live"] {
            let (status, body) = send(&app, Method::GET, path, None, None).await;
            assert_eq!(status, StatusCode::OK, "{}", path);
            assert_eq!(body["status"], "healthy");
        }
    }
}
