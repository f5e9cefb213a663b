//! Request dispatch: WebSocket upgrades become tunnel sessions, everything
//! else goes to the management surface
//!
//! An upgrade is answered immediately with `101 Switching Protocols`; the
//! session itself runs in a spawned task once the protocol switch
//! completes. Errors before the switch surface as HTTP statuses; after it,
//! only through the WebSocket close code and the logs.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL, UPGRADE,
};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use super::management;
use super::server::GatewayState;
use crate::ws::{decode_early_data, WsByteStream};

/// Route one inbound request
pub(crate) async fn dispatch(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: Arc<GatewayState>,
) -> Response<Full<Bytes>> {
    if is_websocket_upgrade(req.headers()) {
        tunnel_upgrade(req, peer, state)
    } else {
        management::handle(req, state).await
    }
}

/// `Upgrade: websocket`, case-insensitive
fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Accept the WebSocket pair and hand the server side to the tunnel engine.
///
/// Any path is accepted. The `Sec-WebSocket-Protocol` value is kept for
/// early-data decoding and echoed back so clients that sent one see it
/// agreed.
fn tunnel_upgrade(
    mut req: Request<Incoming>,
    peer: SocketAddr,
    state: Arc<GatewayState>,
) -> Response<Full<Bytes>> {
    let Some(key) = req.headers().get(SEC_WEBSOCKET_KEY) else {
        return error_response(StatusCode::BAD_REQUEST, "missing Sec-WebSocket-Key");
    };
    let accept_key = derive_accept_key(key.as_bytes());

    let protocol = req.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();
    let early_header = protocol
        .as_ref()
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                debug!(peer = %peer, error = %e, "websocket upgrade failed");
                return;
            }
        };
        let socket =
            WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;

        match decode_early_data(early_header.as_deref()) {
            Ok(early_data) => {
                let stream = WsByteStream::with_early_data(socket, early_data);
                state.engine.serve(stream, peer).await;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "rejecting session: bad early data");
                let mut stream = WsByteStream::new(socket);
                stream
                    .close_with(CloseCode::Protocol, "malformed request")
                    .await;
            }
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    if let Ok(value) = HeaderValue::try_from(accept_key) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, value);
    }
    if let Some(value) = protocol {
        headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
    }
    response
}

fn error_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}
