//! HTTP management surface
//!
//! Thin JSON glue over the identity store's dynamic backend, plus the HTML
//! UI and the share-link response. Every `/api` response carries permissive
//! CORS headers so the UI can be hosted elsewhere.
//!
//! | Method  | Path            | Effect                                   |
//! |---------|-----------------|------------------------------------------|
//! | GET     | `/api/accounts` | List dynamically managed identities      |
//! | POST    | `/api/create`   | Insert an identity `{uuid, label?}`      |
//! | POST    | `/api/delete`   | Remove an identity by uuid               |
//! | OPTIONS | any             | CORS preflight                           |
//! | GET     | `/<hex-id>`     | `vless://` share link for the static id  |
//! | GET     | other           | The HTML UI                              |

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, HOST,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::server::GatewayState;
use super::ui::UI_HTML;
use crate::identity::ClientId;

/// One dynamically managed account as stored in the key-value backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Canonical textual identifier
    pub uuid: String,
    /// Free-form label shown in the UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Dispatch a non-upgrade request
pub(crate) async fn handle(
    req: Request<Incoming>,
    state: Arc<GatewayState>,
) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_owned();
    match (req.method().clone(), path.as_str()) {
        (Method::OPTIONS, _) => preflight(),
        (Method::GET, "/api/accounts") => list_accounts(&state).await,
        (Method::POST, "/api/create") => create_account(req, &state).await,
        (Method::POST, "/api/delete") => delete_account(req, &state).await,
        (Method::GET, p) if p.contains(state.share_hex.as_str()) => share_link(&req, &state),
        (Method::GET | Method::HEAD, _) => html_response(UI_HTML),
        _ => json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    }
}

async fn list_accounts(state: &GatewayState) -> Response<Full<Bytes>> {
    let Some(kv) = state.identity.dynamic_backend() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "dynamic account store not configured",
        );
    };

    match kv.list().await {
        Ok(entries) => {
            let mut accounts: Vec<AccountRecord> = entries
                .into_iter()
                .map(|(key, value)| {
                    serde_json::from_str(&value).unwrap_or_else(|_| AccountRecord {
                        uuid: ClientId::parse(&key)
                            .map_or(key, |id| id.to_string()),
                        label: None,
                    })
                })
                .collect();
            accounts.sort_by(|a, b| a.uuid.cmp(&b.uuid));
            json_response(StatusCode::OK, &json!({ "accounts": accounts }))
        }
        Err(e) => {
            warn!(error = %e, "account listing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "backend error")
        }
    }
}

async fn create_account(
    req: Request<Incoming>,
    state: &GatewayState,
) -> Response<Full<Bytes>> {
    let Some(kv) = state.identity.dynamic_backend().cloned() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "dynamic account store not configured",
        );
    };

    let record: AccountRecord = match read_json(req).await {
        Ok(record) => record,
        Err(response) => return *response,
    };
    let id = match ClientId::parse(&record.uuid) {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let stored = AccountRecord {
        uuid: id.to_string(),
        label: record.label,
    };
    let value = match serde_json::to_string(&stored) {
        Ok(value) => value,
        Err(e) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    match kv.put(&id.to_hex(), value).await {
        Ok(()) => {
            info!(client = %id, "account created");
            json_response(StatusCode::OK, &json!({ "ok": true, "uuid": id.to_string() }))
        }
        Err(e) => {
            warn!(client = %id, error = %e, "account creation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "backend error")
        }
    }
}

async fn delete_account(
    req: Request<Incoming>,
    state: &GatewayState,
) -> Response<Full<Bytes>> {
    let Some(kv) = state.identity.dynamic_backend().cloned() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "dynamic account store not configured",
        );
    };

    let record: AccountRecord = match read_json(req).await {
        Ok(record) => record,
        Err(response) => return *response,
    };
    let id = match ClientId::parse(&record.uuid) {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match kv.delete(&id.to_hex()).await {
        Ok(deleted) => {
            info!(client = %id, deleted, "account deletion handled");
            json_response(StatusCode::OK, &json!({ "ok": true, "deleted": deleted }))
        }
        Err(e) => {
            warn!(client = %id, error = %e, "account deletion failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "backend error")
        }
    }
}

/// The `vless://` client URI for the static identity on this host
fn share_link(req: &Request<Incoming>, state: &GatewayState) -> Response<Full<Bytes>> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map_or("gateway.invalid", strip_port);

    let uri = format!(
        "vless://{id}@{host}:443?encryption=none&security=tls&sni={host}&fp=chrome&type=ws&host={host}&path=%2F#vless-gateway",
        id = state.identity.static_id(),
    );
    text_response(StatusCode::OK, uri)
}

/// Drop a trailing `:port` from a Host header value
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split(']').next().map_or(host, |h| &host[..h.len() + 1]);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Box<Response<Full<Bytes>>>> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Box::new(json_error(StatusCode::BAD_REQUEST, &format!("unreadable body: {e}"))))?
        .to_bytes();
    serde_json::from_slice(&bytes)
        .map_err(|e| Box::new(json_error(StatusCode::BAD_REQUEST, &format!("invalid JSON: {e}"))))
}

fn preflight() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    with_cors(response)
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    with_cors(response)
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn html_response(body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
