//! HTTP handlers
//!
//! - `<prefix>/<namespace>` - authenticated SSE subscription; the namespace
//!   is the percent-decoded path remainder
//! - `<prefix>` - redirects to `<prefix>/`
//! - `/admin/status.json` - hub status report
//! - `/admin` - status page polling the report

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use tokio::sync::Semaphore;

use crate::auth::{Authenticator, CredentialStore};
use crate::hub::message::{sse_data, INVALID_AUTH_PAYLOAD};
use crate::hub::{ClientInfo, Hub};

use super::config::ServerConfig;
use super::drain::{body_channel, drain, DrainOutcome};

const EVENT_STREAM: &str = "text/event-stream; charset=utf-8";

/// Shared handler state
pub struct AppState<S> {
    pub hub: Hub,
    pub auth: Arc<Authenticator<S>>,
    pub config: Arc<ServerConfig>,
    pub connection_semaphore: Option<Arc<Semaphore>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            auth: Arc::clone(&self.auth),
            config: Arc::clone(&self.config),
            connection_semaphore: self.connection_semaphore.clone(),
        }
    }
}

/// Build the router for all endpoints
pub fn router<S: CredentialStore>(state: AppState<S>) -> Router {
    let prefix = state.config.subscribe_prefix.clone();
    let root = format!("{}/", prefix);

    Router::new()
        .route(
            &prefix,
            get({
                let root = root.clone();
                move || {
                    let root = root.clone();
                    async move { Redirect::permanent(&root) }
                }
            }),
        )
        .route(&root, get(subscribe_root::<S>))
        .route(&format!("{}/{{*namespace}}", prefix), get(subscribe::<S>))
        .route("/admin", get(admin_page))
        .route("/admin/status.json", get(admin_status::<S>))
        .with_state(state)
}

/// Open an event stream for the namespace in the request path
pub async fn subscribe<S: CredentialStore>(
    State(state): State<AppState<S>>,
    Path(namespace): Path<String>,
    request: Request,
) -> Response {
    open_stream(state, format!("/{}", namespace), request).await
}

/// Open an event stream receiving every namespace under `/`
pub async fn subscribe_root<S: CredentialStore>(
    State(state): State<AppState<S>>,
    request: Request,
) -> Response {
    open_stream(state, "/".to_string(), request).await
}

async fn open_stream<S: CredentialStore>(
    state: AppState<S>,
    namespace: String,
    request: Request,
) -> Response {
    let headers = request.headers();
    let token = headers
        .get(state.config.auth_header.as_str())
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.auth.authenticate(token).await {
        tracing::debug!(path = %request.uri().path(), error = %e, "Subscribe rejected");
        return invalid_auth();
    }

    let path = format!("{}{}", state.config.subscribe_prefix, namespace);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let info = ClientInfo::new(
        path,
        client_ip(headers, peer),
        header_str(headers, header::USER_AGENT.as_str()),
    );

    let permit = match state.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(client_ip = %info.client_ip, "Subscriber rejected: limit reached");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => None,
    };

    let client_ip = info.client_ip.clone();
    let (subscriber, mut mailbox) = match state.hub.register(namespace, info).await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::error!(error = %e, "Cannot register subscriber");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    tracing::info!(
        subscriber_id = subscriber.id(),
        namespace = %subscriber.namespace(),
        client_ip = %client_ip,
        "Subscriber connected"
    );

    let (mut writer, mut close, body) = body_channel(state.config.write_buffer);
    let hub = state.hub.clone();

    tokio::spawn(async move {
        let outcome = drain(&subscriber, &mut mailbox, &mut writer, &mut close).await;

        match outcome {
            DrainOutcome::WriteFailed(ref e) => {
                tracing::debug!(subscriber_id = subscriber.id(), error = %e, "Write to subscriber failed");
            }
            ref other => {
                tracing::debug!(subscriber_id = subscriber.id(), outcome = ?other, "Drain finished");
            }
        }

        // Already gone if evicted; the hub ignores the repeat
        let _ = hub.unregister(&subscriber).await;

        tracing::info!(
            subscriber_id = subscriber.id(),
            namespace = %subscriber.namespace(),
            client_ip = %client_ip,
            sent = subscriber.sent_count(),
            "Subscriber disconnected"
        );

        drop(permit);
    });

    event_stream_response(body, &state.config.server_name)
}

/// Serve the hub status report
pub async fn admin_status<S: CredentialStore>(State(state): State<AppState<S>>) -> Response {
    match state.hub.snapshot().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Cannot take hub snapshot");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Serve the status page
pub async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_HTML)
}

/// Rejection sent to clients that fail authentication
pub fn invalid_auth() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONNECTION, "close"),
            (header::CONTENT_TYPE, EVENT_STREAM),
        ],
        sse_data(INVALID_AUTH_PAYLOAD),
    )
        .into_response()
}

fn event_stream_response(body: Body, server_name: &str) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    if let Ok(value) = HeaderValue::from_str(server_name) {
        headers.insert(header::SERVER, value);
    }

    response
}

/// Client address, trusting proxy headers when present
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = header_str(headers, "x-real-ip");
    if !forwarded.is_empty() {
        return forwarded;
    }

    let forwarded = header_str(headers, "x-forwarded-for");
    if !forwarded.is_empty() {
        return forwarded;
    }

    peer.map(|addr| addr.to_string()).unwrap_or_default()
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

const ADMIN_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>sse-hub admin</title>
    <style>
        body { font-family: system-ui; max-width: 960px; margin: 40px auto; padding: 0 20px; }
        table { border-collapse: collapse; width: 100%; }
        th, td { text-align: left; padding: 4px 8px; border-bottom: 1px solid #ddd; }
    </style>
</head>
<body>
    <h1>sse-hub</h1>
    <p id="summary">Loading...</p>
    <table>
        <thead>
            <tr><th>Namespace</th><th>Path</th><th>Client</th><th>User agent</th><th>Connected</th><th>Sent</th></tr>
        </thead>
        <tbody id="connections"></tbody>
    </table>
    <script>
        function cell(row, text) {
            const td = document.createElement("td");
            td.textContent = text;
            row.appendChild(td);
        }
        async function refresh() {
            const res = await fetch("/admin/status.json");
            const status = await res.json();
            document.getElementById("summary").textContent =
                status.subscriber_count + " connections, " +
                status.msgs_broadcast + " broadcasts, up " + status.uptime_secs + "s";
            const body = document.getElementById("connections");
            body.replaceChildren();
            for (const c of status.connections) {
                const row = document.createElement("tr");
                cell(row, c.namespace);
                cell(row, c.request_path);
                cell(row, c.client_ip);
                cell(row, c.user_agent);
                cell(row, new Date(c.created_at * 1000).toISOString());
                cell(row, c.msgs_sent);
                body.appendChild(row);
            }
        }
        refresh();
        setInterval(refresh, 2000);
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::Request as HttpRequest;
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::MemoryCredentialStore;
    use crate::hub::SseMessage;
    use crate::stats::HubStatus;

    fn state(config: ServerConfig) -> AppState<MemoryCredentialStore> {
        let store = MemoryCredentialStore::new();
        store.insert("laravel:api_keys:good-token", "user-1");

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        AppState {
            hub: Hub::with_config(config.hub.clone()),
            auth: Arc::new(Authenticator::with_prefix(store, config.auth_key_prefix.clone())),
            config: Arc::new(config),
            connection_semaphore,
        }
    }

    fn subscribe_request(path: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .uri(path)
            .header("X-Real-IP", "203.0.113.9")
            .header("User-Agent", "test-client/1.0");
        if let Some(token) = token {
            builder = builder.header("X-Authorization", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn wait_for_subscribers(hub: &Hub, count: usize) -> HubStatus {
        for _ in 0..100 {
            let status = hub.snapshot().await.unwrap();
            if status.subscriber_count == count {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("hub never reached {} subscribers", count);
    }

    #[tokio::test]
    async fn test_missing_auth_header() {
        let app = router(state(ServerConfig::default()));

        let response = app
            .oneshot(subscribe_request("/subscribe/rooms/1", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"data:invalid auth\n\n");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let app = router(state(ServerConfig::default()));

        let response = app
            .oneshot(subscribe_request("/subscribe/rooms/1", Some("stolen")))
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"data:invalid auth\n\n");
    }

    #[tokio::test]
    async fn test_subscribe_streams_matching_events() {
        let state = state(ServerConfig::default().server_name("edge-1"));
        let hub = state.hub.clone();
        let app = router(state);

        let response = app
            .oneshot(subscribe_request("/subscribe/rooms/1", Some("good-token")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream; charset=utf-8");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::SERVER], "edge-1");

        let status = wait_for_subscribers(&hub, 1).await;
        let conn = &status.connections[0];
        assert_eq!(conn.namespace, "/rooms/1");
        assert_eq!(conn.request_path, "/subscribe/rooms/1");
        assert_eq!(conn.client_ip, "203.0.113.9");
        assert_eq!(conn.user_agent, "test-client/1.0");

        hub.broadcast(SseMessage::new("/rooms/2", "other")).await.unwrap();
        hub.broadcast(SseMessage::new("/rooms/1/chat", "hi")).await.unwrap();

        let mut stream = response.into_body().into_data_stream();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"data:hi\n\n");

        // Client goes away: drain stops and the subscriber is unregistered
        drop(stream);
        wait_for_subscribers(&hub, 0).await;
    }

    #[tokio::test]
    async fn test_root_subscription_namespace() {
        let state = state(ServerConfig::default());
        let hub = state.hub.clone();
        let app = router(state);

        let _response = app
            .oneshot(subscribe_request("/subscribe/", Some("good-token")))
            .await
            .unwrap();

        let status = wait_for_subscribers(&hub, 1).await;
        assert_eq!(status.connections[0].namespace, "/");
    }

    #[tokio::test]
    async fn test_encoded_path_is_decoded() {
        let state = state(ServerConfig::default());
        let hub = state.hub.clone();
        let app = router(state);

        let response = app
            .oneshot(subscribe_request("/subscribe/rooms%201", Some("good-token")))
            .await
            .unwrap();

        let status = wait_for_subscribers(&hub, 1).await;
        assert_eq!(status.connections[0].namespace, "/rooms 1");
        assert_eq!(status.connections[0].request_path, "/subscribe/rooms 1");

        hub.broadcast(SseMessage::new("/rooms 1/chat", "hi")).await.unwrap();

        let mut stream = response.into_body().into_data_stream();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"data:hi\n\n");
    }

    #[tokio::test]
    async fn test_bare_prefix_redirects() {
        let state = state(ServerConfig::default());
        let hub = state.hub.clone();
        let app = router(state);

        let response = app
            .oneshot(subscribe_request("/subscribe", Some("good-token")))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(response.headers()[header::LOCATION], "/subscribe/");
        assert_eq!(hub.snapshot().await.unwrap().subscriber_count, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let state = state(ServerConfig::default().max_connections(1));
        let hub = state.hub.clone();
        let app = router(state);

        let _first = app
            .clone()
            .oneshot(subscribe_request("/subscribe/a", Some("good-token")))
            .await
            .unwrap();
        let second = app
            .oneshot(subscribe_request("/subscribe/b", Some("good-token")))
            .await
            .unwrap();

        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        wait_for_subscribers(&hub, 1).await;
    }

    #[tokio::test]
    async fn test_admin_status_json() {
        let state = state(ServerConfig::default());
        let hub = state.hub.clone();
        let app = router(state);

        let (_sub, _mailbox) = hub
            .register("/rooms", ClientInfo::new("/subscribe/rooms", "10.0.0.1", "ua"))
            .await
            .unwrap();
        hub.broadcast(SseMessage::new("/elsewhere", "x")).await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/admin/status.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["msgs_broadcast"], 1);
        assert_eq!(json["subscriber_count"], 1);
        assert_eq!(json["connections"][0]["namespace"], "/rooms");
        assert_eq!(json["connections"][0]["client_ip"], "10.0.0.1");
        assert_eq!(json["connections"][0]["msgs_sent"], 0);
    }

    #[tokio::test]
    async fn test_admin_page() {
        let app = router(state(ServerConfig::default()));

        let response = app
            .oneshot(HttpRequest::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(std::str::from_utf8(&body).unwrap().contains("/admin/status.json"));
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.1:5000");
        assert_eq!(client_ip(&headers, None), "");

        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.7");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.5"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.5");
    }
}
