//! HTTP front: routes dashboard calls into the [`Gateway`].
//!
//! `GET|POST /plugins/embystreams/api` carries the action in the query string
//! or form body, the CSRF token in `X-CSRF-Token`, and the caller session in
//! the `embystreams_session` cookie. `GET /health` is unauthenticated.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{Form, Router};
use axum_extra::extract::CookieJar;
use embystreams_core::ErrorCategory;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::gateway::{Gateway, GatewayRequest, GatewayResponse};

pub const API_PATH: &str = "/plugins/embystreams/api";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const SESSION_COOKIE: &str = "embystreams_session";

#[derive(Clone)]
struct AppState {
    gateway: Gateway,
}

/// Build the router (shared between startup and tests).
pub fn build_app(gateway: Gateway) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(API_PATH, get(api_get_handler).post(api_post_handler))
        .with_state(AppState { gateway })
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    gateway: Gateway,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, path = API_PATH, "gateway listening");

    axum::serve(
        listener,
        build_app(gateway).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

// ── Caller identity ──────────────────────────────────────────────────────────

/// Hashed caller identity: the session cookie if present, else the remote IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CallerKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(CallerKey(caller_key(&parts.headers, remote)))
    }
}

fn caller_key(headers: &HeaderMap, remote: Option<IpAddr>) -> String {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE).filter(|c| !c.value().is_empty()) {
        return digest("session", cookie.value());
    }
    match remote {
        Some(ip) => digest("ip", &ip.to_string()),
        None => digest("anonymous", ""),
    }
}

fn digest(kind: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_get_handler(
    State(state): State<AppState>,
    CallerKey(caller): CallerKey,
    headers: HeaderMap,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(params)) => dispatch(&state, caller, &headers, params).await,
        Err(rejection) => reject(rejection.body_text()),
    }
}

async fn api_post_handler(
    State(state): State<AppState>,
    CallerKey(caller): CallerKey,
    headers: HeaderMap,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let (Query(mut params), Form(form)) = match (query, form) {
        (Ok(query), Ok(form)) => (query, form),
        (Err(rejection), _) => return reject(rejection.body_text()),
        (_, Err(rejection)) => return reject(rejection.body_text()),
    };
    params.extend(form);
    dispatch(&state, caller, &headers, params).await
}

/// Undecodable query or body: answered in the gateway's JSON shape.
fn reject(detail: String) -> Response {
    warn!(detail = %detail, "rejected malformed gateway request");
    into_http(GatewayResponse::failure(ErrorCategory::InvalidRequest))
}

async fn dispatch(
    state: &AppState,
    caller_key: String,
    headers: &HeaderMap,
    params: HashMap<String, String>,
) -> Response {
    let csrf_token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request = GatewayRequest {
        action: params.get("action").cloned().unwrap_or_default(),
        caller_key,
        csrf_token,
        params,
    };
    into_http(state.gateway.handle(request).await)
}

fn into_http(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CACHE_CONTROL, "no-store")], Json(resp)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticSessionToken;
    use crate::gateway::UpstreamClient;
    use axum::body::Body;
    use axum::http::Request;
    use embystreams_core::{keys, ConfigStore, MemoryConfigStore};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const CSRF: &str = "front-secret";

    fn app_with(store: Arc<MemoryConfigStore>) -> Router {
        let gateway = Gateway::new(
            store,
            Arc::new(StaticSessionToken::new(CSRF)),
            UpstreamClient::new("emby").unwrap(),
        );
        build_app(gateway)
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str, cookie: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri).header(header::COOKIE, format!("{SESSION_COOKIE}={cookie}"));
        if let Some(t) = token {
            builder = builder.header(CSRF_HEADER, t);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn missing_csrf_header_is_forbidden() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let resp = app
            .oneshot(get("/plugins/embystreams/api?action=getStatus", "s1", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let v = json_body(resp).await;
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "_(Authentication Failed)_");
    }

    #[tokio::test]
    async fn status_over_http() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let resp = app
            .oneshot(get("/plugins/embystreams/api?action=getStatus", "s1", Some(CSRF)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json_body(resp).await;
        assert_eq!(v["configured"], false);
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn rate_limit_is_per_session_cookie() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let uri = "/plugins/embystreams/api?action=getStatus";

        let first = app.clone().oneshot(get(uri, "s1", Some(CSRF))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(get(uri, "s1", Some(CSRF))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let other = app.oneshot(get(uri, "s2", Some(CSRF))).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn save_config_from_form_body() {
        let store = Arc::new(MemoryConfigStore::new());
        let app = app_with(store.clone());
        let req = Request::post(API_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(CSRF_HEADER, CSRF)
            .body(Body::from("action=saveConfig&HOST=media.lan&MAX_STREAMS=4"))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["message"], "Configuration saved");

        let saved = store.load().unwrap();
        assert_eq!(saved[keys::HOST], "media.lan");
        assert_eq!(saved[keys::MAX_STREAMS], "4");
    }

    #[tokio::test]
    async fn json_body_gets_a_json_error() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let req = Request::post(API_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .header(CSRF_HEADER, CSRF)
            .body(Body::from(r#"{"action":"getStatus"}"#))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let v = json_body(resp).await;
        assert_eq!(v["success"], false);
        assert_eq!(v["errorCode"], "invalid_request");
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn post_without_content_type_gets_a_json_error() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let req = Request::post(API_PATH)
            .header(CSRF_HEADER, CSRF)
            .body(Body::from("action=getStatus"))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "_(Invalid Request)_");
    }

    #[tokio::test]
    async fn unknown_action_is_bad_request() {
        let app = app_with(Arc::new(MemoryConfigStore::new()));
        let resp = app
            .oneshot(get("/plugins/embystreams/api?action=dropTables", "s1", Some(CSRF)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "Unknown action");
    }

    #[test]
    fn caller_key_prefers_cookie_over_ip() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let mut headers = HeaderMap::new();
        let by_ip = caller_key(&headers, Some(ip));

        headers.insert(header::COOKIE, format!("{SESSION_COOKIE}=abc").parse().unwrap());
        let by_cookie = caller_key(&headers, Some(ip));

        assert_ne!(by_ip, by_cookie);
        assert_eq!(by_cookie, caller_key(&headers, None));
        assert_eq!(by_cookie.len(), 64);
    }
}
