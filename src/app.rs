use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, error::method_not_allowed, ledger, state::AppState, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(ledger::router())
        .route(
            "/health",
            get(|| async { "ok" }).fallback(method_not_allowed),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = res.status();
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::{google::GOOGLE_PROVIDER, ExternalIdentity, IdentityError, IdentityVerifier},
        store::MemoryStore,
    };

    /// Accepts `google:<sub>` as an identity token.
    struct FakeGoogle;

    #[async_trait]
    impl IdentityVerifier for FakeGoogle {
        async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
            let sub = id_token
                .strip_prefix("google:")
                .ok_or_else(|| IdentityError::Malformed("not a test token".into()))?;
            Ok(ExternalIdentity {
                provider: GOOGLE_PROVIDER,
                subject_id: sub.to_owned(),
                email: format!("{sub}@example.com"),
                name: Some(format!("User {sub}")),
            })
        }
    }

    fn test_app() -> (Router, MemoryStore) {
        let store = MemoryStore::new();
        let state = AppState::fake(store.clone(), Arc::new(FakeGoogle));
        (build_app(state), store)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    async fn sign_in(app: &Router, sub: &str) -> String {
        let (status, body) = send(
            app,
            request(
                Method::POST,
                "/auth/google",
                None,
                Some(json!({ "id_token": format!("google:{sub}") })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_owned()
    }

    async fn balance(app: &Router, token: &str) -> f64 {
        let (status, body) = send(app, request(Method::GET, "/balance", Some(token), None)).await;
        assert_eq!(status, StatusCode::OK);
        body["balance"].as_f64().unwrap()
    }

    async fn transactions(app: &Router, token: &str) -> Vec<Value> {
        let (status, body) =
            send(app, request(Method::GET, "/transactions", Some(token), None)).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().unwrap().clone()
    }

    async fn post_tx(app: &Router, token: &str, body: Value) -> (StatusCode, Value) {
        send(app, request(Method::POST, "/transactions", Some(token), Some(body))).await
    }

    #[tokio::test]
    async fn health_is_open() {
        let (app, _) = test_app();
        let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn sign_in_creates_the_user_once() {
        let (app, store) = test_app();

        let first = sign_in(&app, "alice").await;
        let second = sign_in(&app, "alice").await;

        assert!(!first.is_empty() && !second.is_empty());
        assert_eq!(store.counts().await, (1, 1));
        assert_eq!(balance(&app, &first).await, 0.0);
    }

    #[tokio::test]
    async fn sign_in_with_rejected_identity_is_401() {
        let (app, store) = test_app();
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/auth/google",
                None,
                Some(json!({ "id_token": "forged" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "upstream_identity_error");
        assert_eq!(store.counts().await, (0, 0));
    }

    #[tokio::test]
    async fn sign_in_without_token_field_is_400() {
        let (app, _) = test_app();
        let (status, body) = send(
            &app,
            request(Method::POST, "/auth/google", None, Some(json!({ "token": "x" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn authenticated_routes_reject_missing_or_bad_credentials() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;

        for (method, uri) in [
            (Method::GET, "/balance"),
            (Method::POST, "/balance"),
            (Method::GET, "/transactions"),
            (Method::POST, "/transactions"),
            (Method::PATCH, "/auth/google"),
            (Method::GET, "/me"),
        ] {
            let body = Some(json!({ "type": "deposit", "amount": 5, "balance": 5 }));

            let (status, res) = send(&app, request(method.clone(), uri, None, body.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(res["error"], "unauthorized");

            let (status, _) =
                send(&app, request(method.clone(), uri, Some("not-a-jwt"), body.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");

            let req = Request::builder()
                .method(method.clone())
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Basic {token}"))
                .body(Body::empty())
                .unwrap();
            let (status, _) = send(&app, req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        }

        assert_eq!(balance(&app, &token).await, 0.0);
        assert!(transactions(&app, &token).await.is_empty());
    }

    #[tokio::test]
    async fn unsupported_method_on_known_path_is_405() {
        let (app, _) = test_app();
        for (method, uri) in [
            (Method::PUT, "/balance"),
            (Method::DELETE, "/transactions"),
            (Method::GET, "/auth/google"),
            (Method::POST, "/me"),
        ] {
            let (status, body) = send(&app, request(method.clone(), uri, None, None)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(body["error"], "method_not_allowed");
        }

        let (status, _) = send(&app, request(Method::GET, "/nope", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deposit_and_withdraw_scenarios() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;

        let (status, body) =
            post_tx(&app, &token, json!({ "type": "deposit", "amount": 100 })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "Transaction completed");
        assert_eq!(body["transaction"]["amount"].as_f64(), Some(100.0));
        assert_eq!(balance(&app, &token).await, 100.0);
        assert_eq!(transactions(&app, &token).await.len(), 1);

        let (status, body) =
            post_tx(&app, &token, json!({ "type": "withdraw", "amount": 150 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insufficient_funds");
        assert_eq!(balance(&app, &token).await, 100.0);
        assert_eq!(transactions(&app, &token).await.len(), 1);

        let (status, _) = post_tx(
            &app,
            &token,
            json!({ "type": "withdraw", "amount": 100, "category": "rent" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(balance(&app, &token).await, 0.0);

        let history = transactions(&app, &token).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["type"], "withdraw");
        assert_eq!(history[0]["category"], "rent");
        assert_eq!(history[0]["amount"].as_f64(), Some(-100.0));
        assert_eq!(history[1]["type"], "deposit");
        assert_eq!(history[1]["category"], "");
        assert!(history[0]["transaction_id"].as_i64() > history[1]["transaction_id"].as_i64());
        assert!(history[0]["created_at"].as_str().is_some());
    }

    #[tokio::test]
    async fn deposit_overflowing_the_balance_is_400() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;

        let (status, _) = post_tx(&app, &token, json!({ "type": "deposit", "amount": 7.9e28 })).await;
        assert_eq!(status, StatusCode::CREATED);
        let before = balance(&app, &token).await;

        let (status, body) =
            post_tx(&app, &token, json!({ "type": "deposit", "amount": 7.9e28 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["message"], "amount out of range");

        assert_eq!(balance(&app, &token).await, before);
        assert_eq!(transactions(&app, &token).await.len(), 1);

        let (status, _) =
            post_tx(&app, &token, json!({ "type": "withdraw", "amount": 1 })).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn invalid_transactions_are_validation_errors() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;

        for body in [
            json!({ "amount": 0 }),
            json!({ "type": "deposit", "amount": 0 }),
            json!({ "type": "deposit", "amount": -3 }),
            json!({ "type": "refund", "amount": 3 }),
            json!({ "type": "deposit" }),
            json!({ "type": "deposit", "amount": "lots" }),
        ] {
            let (status, res) = post_tx(&app, &token, body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(res["error"], "validation_error", "{body}");
        }

        assert_eq!(balance(&app, &token).await, 0.0);
        assert!(transactions(&app, &token).await.is_empty());
    }

    #[tokio::test]
    async fn empty_history_is_an_empty_array() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;
        let (status, body) =
            send(&app, request(Method::GET, "/transactions", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn balance_override_is_scoped_to_the_caller() {
        let (app, _) = test_app();
        let alice = sign_in(&app, "alice").await;
        let bob = sign_in(&app, "bob").await;

        let (status, body) = send(
            &app,
            request(Method::POST, "/balance", Some(&alice), Some(json!({ "balance": 250.5 }))),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        assert_eq!(balance(&app, &alice).await, 250.5);
        assert_eq!(balance(&app, &bob).await, 0.0);
        assert!(transactions(&app, &alice).await.is_empty());
    }

    #[tokio::test]
    async fn profile_patch_shows_up_in_me() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;

        let (status, body) = send(
            &app,
            request(
                Method::PATCH,
                "/auth/google",
                Some(&token),
                Some(json!({ "givenName": "Alice", "photoUrl": "https://example.com/a.png" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User updated successfully");

        let (status, me) = send(&app, request(Method::GET, "/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "alice@example.com");
        assert_eq!(me["name"], "User alice");
        assert_eq!(me["givenName"], "Alice");
        assert_eq!(me["photoUrl"], "https://example.com/a.png");
    }

    #[tokio::test]
    async fn profile_patch_rejects_bad_photo_url() {
        let (app, _) = test_app();
        let token = sign_in(&app, "alice").await;
        let (status, body) = send(
            &app,
            request(
                Method::PATCH,
                "/auth/google",
                Some(&token),
                Some(json!({ "photoUrl": "javascript:alert(1)" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn token_for_unknown_user_gets_404_not_500() {
        let (app, _) = test_app();
        let state = AppState::fake(MemoryStore::new(), Arc::new(FakeGoogle));
        let ghost = state
            .jwt
            .sign(uuid::Uuid::new_v4(), "ghost@example.com")
            .unwrap();

        let (status, body) = send(&app, request(Method::GET, "/balance", Some(&ghost), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _) = send(
            &app,
            request(
                Method::PATCH,
                "/auth/google",
                Some(&ghost),
                Some(json!({ "givenName": "Ghost" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, request(Method::GET, "/me", Some(&ghost), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
