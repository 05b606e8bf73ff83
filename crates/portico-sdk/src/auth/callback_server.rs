//! Local HTTP callback server for interactive login
//!
//! One loopback listener serves every pending login. Requests to
//! `/callback/{id}` are dispatched to the matching registry entry; anything
//! else is answered with `400 Bad Request`.

use super::handler::{CallbackReply, CallbackRequest, HandlerError};
use super::pages;
use super::registry::PendingRegistry;
use super::types::AuthError;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::any,
    Router,
};
use futures::FutureExt;
use portico_common::auth_constants::CALLBACK_PATH_PREFIX;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// State shared by every request on the listener
#[derive(Clone)]
pub(crate) struct DispatchState {
    registry: Arc<PendingRegistry>,
    origin: String,
}

/// Build the router serving `/callback/{id}` for `addr`
pub(crate) fn router(registry: Arc<PendingRegistry>, addr: SocketAddr) -> Router {
    let state = DispatchState {
        registry,
        origin: format!("http://{addr}"),
    };

    Router::new()
        .route(&format!("{CALLBACK_PATH_PREFIX}/:id"), any(dispatch))
        .fallback(not_a_callback)
        .with_state(state)
}

/// Callback ids are upper-case hex
pub(crate) fn normalize_id(id: &str) -> String {
    id.to_ascii_uppercase()
}

async fn not_a_callback(uri: Uri) -> Response {
    debug!("Ignoring non-callback request to {}", uri.path());
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

async fn dispatch(
    State(state): State<DispatchState>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let id = normalize_id(&id);

    let Some(claimed) = state.registry.claim(&id) else {
        debug!("Callback {} is unknown, expired or already used", id);
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid login link",
            "This login link is unknown, has expired or was already used. Please start the login again.",
        );
    };
    // The claimed entry no longer has a deadline; settle it even if the
    // connection drops mid-handler.
    let _guard = SettleGuard {
        registry: state.registry.clone(),
        id: id.clone(),
    };

    let url = match Url::parse(&format!("{}{}", state.origin, uri)) {
        Ok(url) => url,
        Err(e) => {
            let message = e.to_string();
            state
                .registry
                .reject(&id, AuthError::InvalidCallbackUrl(message.clone()));
            return error_page(StatusCode::BAD_REQUEST, "Authentication failed", &message);
        }
    };

    let outcome = match claimed.handler {
        None => Ok(CallbackReply::Default),
        Some(handler) => {
            let request = CallbackRequest {
                id: id.clone(),
                method,
                url: url.clone(),
                headers,
            };
            AssertUnwindSafe(handler.handle(request))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!("Callback handler for {} panicked", id);
                    Err(HandlerError::new("Callback handler failed")
                        .with_status(StatusCode::INTERNAL_SERVER_ERROR.as_u16()))
                })
        }
    };

    match outcome {
        Ok(reply) => {
            state.registry.resolve(&id, url);
            reply.into_response()
        }
        Err(err) => {
            let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::BAD_REQUEST);
            let response = error_page(status, "Authentication failed", &err.message);
            state.registry.reject(
                &id,
                AuthError::Handler {
                    status: status.as_u16(),
                    message: err.message,
                },
            );
            response
        }
    }
}

/// Rejects a claimed entry whose dispatch ended without settling it
struct SettleGuard {
    registry: Arc<PendingRegistry>,
    id: String,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.registry.reject(&self.id, AuthError::Disconnected) {
            warn!("Browser disconnected while callback {} was handled", self.id);
        }
    }
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Html(pages::render_error(title, message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("abcd1234"), "ABCD1234");
        assert_eq!(normalize_id("ABCD1234"), "ABCD1234");
    }

    #[tokio::test]
    async fn test_guard_rejects_unsettled_claim() {
        let registry = PendingRegistry::new();
        let rx = registry
            .register("G1", None, std::time::Duration::from_secs(60), || {})
            .unwrap();
        assert!(registry.claim("G1").is_some());

        drop(SettleGuard {
            registry: registry.clone(),
            id: "G1".to_string(),
        });

        assert!(matches!(rx.await.unwrap(), Err(AuthError::Disconnected)));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_leaves_settled_entry_alone() {
        let registry = PendingRegistry::new();
        let rx = registry
            .register("G2", None, std::time::Duration::from_secs(60), || {})
            .unwrap();
        registry.claim("G2");
        let url = Url::parse("http://127.0.0.1:1/callback/G2").unwrap();
        registry.resolve("G2", url);

        drop(SettleGuard {
            registry: registry.clone(),
            id: "G2".to_string(),
        });

        assert!(rx.await.unwrap().is_ok());
    }

    #[test]
    fn test_error_page_status() {
        let response = error_page(StatusCode::FORBIDDEN, "Denied", "no");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }
}
