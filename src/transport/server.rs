//! WebSocket upgrade with debugger sub-protocol negotiation.
//!
//! A client must list the debugger sub-protocol in its
//! `Sec-WebSocket-Protocol` header. The server echoes that one value back.
//! Clients that do not offer it get `400 Bad Request` and no session.
//!
//! # Handshake
//!
//! ```text
//! GET / HTTP/1.1
//! Upgrade: websocket
//! Sec-WebSocket-Protocol: other, debugger.ppsspp.org
//!
//! HTTP/1.1 101 Switching Protocols
//! Sec-WebSocket-Protocol: debugger.ppsspp.org
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sub-protocol spoken by debugger clients.
pub const DEFAULT_SUBPROTOCOL: &str = "debugger.ppsspp.org";

// ============================================================================
// Upgrade
// ============================================================================

/// Upgrades `stream` to a WebSocket, requiring `subprotocol`.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the client was refused (the
/// sub-protocol was not offered), or [`Error::WebSocket`] if the upgrade
/// failed at the I/O or HTTP level.
pub async fn accept_upgrade<S>(stream: S, subprotocol: &str) -> Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let callback = |request: &Request,
                    mut response: Response|
     -> std::result::Result<Response, ErrorResponse> {
        if !offers_subprotocol(request, subprotocol) {
            debug!(subprotocol, "Client did not offer debugger sub-protocol");
            return Err(reject(StatusCode::BAD_REQUEST, "Unsupported sub-protocol"));
        }

        let value = HeaderValue::from_str(subprotocol)
            .map_err(|_| reject(StatusCode::INTERNAL_SERVER_ERROR, "Invalid sub-protocol"))?;
        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        Ok(response)
    };

    tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|e| match e {
            WsError::Http(response) => Error::handshake(format!(
                "Upgrade refused with {}",
                response.status()
            )),
            other => Error::WebSocket(other),
        })
}

/// Returns `true` if `name` can be sent as a sub-protocol token.
#[must_use]
pub fn is_valid_subprotocol(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

// ============================================================================
// Helpers
// ============================================================================

fn offers_subprotocol(request: &Request, subprotocol: &str) -> bool {
    request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|offered| offered.trim() == subprotocol)
}

fn reject(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::duplex;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    fn client_request(protocols: Option<&str>) -> Request {
        let mut request = "ws://127.0.0.1/".into_client_request().expect("request");
        if let Some(protocols) = protocols {
            request.headers_mut().insert(
                SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_str(protocols).expect("header"),
            );
        }
        request
    }

    #[test]
    fn test_offers_subprotocol() {
        let request = client_request(Some("other, debugger.ppsspp.org"));
        assert!(offers_subprotocol(&request, DEFAULT_SUBPROTOCOL));
        assert!(!offers_subprotocol(&request, "debugger"));

        assert!(!offers_subprotocol(&client_request(None), DEFAULT_SUBPROTOCOL));
    }

    #[test]
    fn test_is_valid_subprotocol() {
        assert!(is_valid_subprotocol(DEFAULT_SUBPROTOCOL));
        assert!(!is_valid_subprotocol(""));
        assert!(!is_valid_subprotocol("a b"));
        assert!(!is_valid_subprotocol("a,b"));
    }

    #[tokio::test]
    async fn test_upgrade_accepts_offered_subprotocol() {
        let (server_io, client_io) = duplex(16 * 1024);
        let server = tokio::spawn(async move { accept_upgrade(server_io, DEFAULT_SUBPROTOCOL).await });

        let request = client_request(Some(DEFAULT_SUBPROTOCOL));
        let (_client, response) = tokio_tungstenite::client_async(request, client_io)
            .await
            .expect("client handshake");

        assert_eq!(
            response.headers().get(SEC_WEBSOCKET_PROTOCOL),
            Some(&HeaderValue::from_static(DEFAULT_SUBPROTOCOL))
        );
        assert!(server.await.expect("join").is_ok());
    }

    #[tokio::test]
    async fn test_upgrade_rejects_missing_subprotocol() {
        let (server_io, client_io) = duplex(16 * 1024);
        let server = tokio::spawn(async move { accept_upgrade(server_io, DEFAULT_SUBPROTOCOL).await });

        let client = tokio_tungstenite::client_async(client_request(None), client_io).await;
        assert!(client.is_err());

        let err = server.await.expect("join").expect_err("rejected");
        assert!(err.is_handshake_error());
    }

    #[tokio::test]
    async fn test_upgrade_peer_hangup_is_websocket_error() {
        let (server_io, client_io) = duplex(16 * 1024);
        let server = tokio::spawn(async move { accept_upgrade(server_io, DEFAULT_SUBPROTOCOL).await });

        drop(client_io);

        let err = server.await.expect("join").expect_err("no handshake");
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.is_connection_error());
        assert!(!err.is_handshake_error());
    }
}
