use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::state::AppState;
use crate::{auth, orders, payments};

/// Browser calls come from the storefront with the session cookie attached.
fn cors_layer(frontend_url: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = frontend_url
        .trim_end_matches('/')
        .parse()
        .context("FRONTEND_URL is not a valid origin")?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.frontend_url)?;
    Ok(Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(orders::router())
                .merge(payments::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        ))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("APP_HOST/APP_PORT do not form a socket address")?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use crate::auth::repo_types::{AuthMethod, User};
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header::SET_COOKIE, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        build_app(AppState::fake()).unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gated_routes_need_a_session() {
        for (method, uri) in [
            ("GET", "/api/user"),
            ("POST", "/api/logout"),
            ("GET", "/api/transactions"),
            ("GET", "/api/admin/transactions"),
        ] {
            let res = app()
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn expired_and_malformed_tokens_are_rejected() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let expired = keys
            .sign_at(uuid::Uuid::new_v4(), time::OffsetDateTime::now_utc() - time::Duration::hours(25))
            .unwrap();

        let res = app()
            .oneshot(
                Request::get("/api/user")
                    .header("Authorization", format!("Bearer {expired}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "token_expired");

        let res = app()
            .oneshot(
                Request::get("/api/user")
                    .header("Authorization", "Basic abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_400() {
        let res = app()
            .oneshot(
                Request::post("/api/webhook")
                    .header("Stripe-Signature", "t=1,v1=00")
                    .body(Body::from(r#"{"type":"charge.updated"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "invalid_signature");
    }

    #[tokio::test]
    async fn signed_webhook_is_acknowledged() {
        let payload = br#"{"type":"checkout.session.async_payment_failed","data":{"object":{"id":"cs_9"}}}"#;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let header = crate::payments::webhook::sign(payload, "whsec_test", now);
        let res = app()
            .oneshot(
                Request::post("/api/webhook")
                    .header("Stripe-Signature", header)
                    .body(Body::from(payload.as_slice()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "failed");
    }

    #[tokio::test]
    async fn oauth_start_redirects_with_state_cookie() {
        let res = app()
            .oneshot(Request::get("/api/login/github").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(res.status().is_redirection());
        let cookie = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_string();
        let state = cookie
            .strip_prefix("oauth_state=")
            .and_then(|c| c.split(';').next())
            .unwrap();
        let location = res.headers().get("location").unwrap().to_str().unwrap();
        assert!(location.ends_with(&format!("state={state}")));

        let res = app()
            .oneshot(Request::get("/api/login/google").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oauth_callback_rejects_state_mismatch() {
        for cookie in [None, Some("oauth_state=aaaa")] {
            let mut req = Request::get("/api/login/github/callback?code=1&state=bbbb");
            if let Some(cookie) = cookie {
                req = req.header("Cookie", cookie);
            }
            let res = app().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(res).await["error"], "oauth_state");
        }
    }

    #[tokio::test]
    async fn register_validates_before_the_store() {
        let res = app()
            .oneshot(
                Request::post("/api/register")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        r#"{"username":"ann","email":"not-an-email","password":"longenough"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn incomplete_register_body_gets_json_error() {
        let res = app()
            .oneshot(
                Request::post("/api/register")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"username":"ann"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()["content-type"], "application/json");
        assert_eq!(body_json(res).await["error"], "validation");
    }

    fn member(is_admin: bool) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            username: if is_admin { "root".into() } else { "bob".into() },
            email: if is_admin { "root@example.com".into() } else { "bob@example.com".into() },
            password_hash: String::new(),
            auth_method: AuthMethod::Local,
            is_admin,
            created_at: time::OffsetDateTime::now_utc(),
        }
    }

    /// App knowing one customer and one admin, plus bearer headers for both.
    fn app_with_members() -> (Router, String, String) {
        let customer = member(false);
        let admin = member(true);
        let state = AppState::fake_with_users(vec![customer.clone(), admin.clone()]);
        let keys = JwtKeys::from_ref(&state);
        let customer_auth = format!("Bearer {}", keys.sign(customer.id).unwrap());
        let admin_auth = format!("Bearer {}", keys.sign(admin.id).unwrap());
        (build_app(state).unwrap(), customer_auth, admin_auth)
    }

    #[tokio::test]
    async fn known_session_reads_current_user() {
        let (app, customer_auth, _) = app_with_members();
        let res = app
            .oneshot(
                Request::get("/api/user")
                    .header("Authorization", customer_auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["user"]["username"], "bob");
        assert_eq!(json["user"]["is_admin"], false);
    }

    #[tokio::test]
    async fn token_for_missing_user_is_unauthorized() {
        let (app, _, _) = app_with_members();
        let stranger = JwtKeys::from_ref(&AppState::fake())
            .sign(uuid::Uuid::new_v4())
            .unwrap();
        let res = app
            .oneshot(
                Request::get("/api/user")
                    .header("Authorization", format!("Bearer {stranger}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn customers_are_forbidden_on_admin_routes() {
        let (app, customer_auth, _) = app_with_members();
        let id = uuid::Uuid::new_v4();
        for (method, uri, body) in [
            ("GET", "/api/admin/transactions".to_string(), ""),
            ("PUT", format!("/api/admin/transactions/{id}"), r#"{"status":"approved"}"#),
        ] {
            let res = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(&uri)
                        .header("Authorization", &customer_auth)
                        .header("Content-Type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::FORBIDDEN, "{method} {uri}");
            assert_eq!(body_json(res).await["error"], "forbidden");
        }
    }

    #[tokio::test]
    async fn admin_status_update_rejects_bad_input_with_json() {
        let (app, _, admin_auth) = app_with_members();
        let id = uuid::Uuid::new_v4();
        for (uri, body, code) in [
            ("/api/admin/transactions/not-a-uuid".to_string(), r#"{"status":"approved"}"#, "validation"),
            (format!("/api/admin/transactions/{id}"), "{}", "invalid_status"),
            (format!("/api/admin/transactions/{id}"), r#"{"status":"paid"}"#, "invalid_status"),
            (format!("/api/admin/transactions/{id}"), "{broken", "validation"),
        ] {
            let res = app
                .clone()
                .oneshot(
                    Request::put(&uri)
                        .header("Authorization", &admin_auth)
                        .header("Content-Type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(body_json(res).await["error"], code, "{uri} {body}");
        }
    }

    #[tokio::test]
    async fn oversized_offline_cart_is_a_validation_error() {
        let (app, customer_auth, _) = app_with_members();
        let body = serde_json::json!({
            "lineItems": [{"price_data": {"unit_amount": i64::MAX}, "quantity": i32::MAX}]
        });
        let res = app
            .oneshot(
                Request::post("/api/create-offline-payment")
                    .header("Authorization", customer_auth)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "validation");
    }

    #[tokio::test]
    async fn checkout_uses_gateway_url() {
        let (app, customer_auth, _) = app_with_members();
        let res = app
            .oneshot(
                Request::post("/api/create-checkout-session")
                    .header("Authorization", customer_auth)
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"lineItems":[{"price_data":{"unit_amount":1000}}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let url = body_json(res).await["url"].as_str().unwrap().to_string();
        assert!(url.starts_with("https://checkout.fake.local/"));
    }

    #[test]
    fn cors_rejects_unparseable_origin() {
        assert!(cors_layer("http://localhost:5173/").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
