//! Per-login callback handlers
//!
//! A handler sees the browser request that hit `/callback/{id}` and decides
//! the HTTP response. It returns [`CallbackReply::Default`] to let the server
//! answer `200 OK`, or [`CallbackReply::Respond`] to take over the response
//! (redirect, custom page, ...). Returning an error renders an error page with
//! the error's status and rejects that login only.

use super::pages;
use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::future::Future;
use url::Url;

/// The browser request delivered to a handler
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// Normalized callback id
    pub id: String,
    pub method: Method,
    /// Full request URL as seen by the local listener
    pub url: Url,
    pub headers: HeaderMap,
}

impl CallbackRequest {
    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// What the handler wants the server to send back
pub enum CallbackReply {
    /// Server answers `200 OK` with a plain-text body
    Default,
    /// Handler-provided response
    Respond(Response),
}

impl CallbackReply {
    pub fn html(body: impl Into<String>) -> Self {
        Self::Respond(Html(body.into()).into_response())
    }

    /// `303 See Other` to `location`
    pub fn redirect(location: &str) -> Self {
        Self::Respond(Redirect::to(location).into_response())
    }

    pub(crate) fn into_response(self) -> Response {
        match self {
            Self::Default => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "OK",
            )
                .into_response(),
            Self::Respond(response) => response,
        }
    }
}

impl std::fmt::Debug for CallbackReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Respond(response) => f
                .debug_tuple("Respond")
                .field(&response.status())
                .finish(),
        }
    }
}

/// Error returned by a handler; rendered as an HTML error page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub status: u16,
    pub message: String,
}

impl HandlerError {
    /// `400 Bad Request` with `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST.as_u16(),
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Customizes the response for one pending callback
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn handle(&self, request: CallbackRequest) -> Result<CallbackReply, HandlerError>;
}

#[async_trait]
impl<F, Fut> CallbackHandler for F
where
    F: Fn(CallbackRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallbackReply, HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: CallbackRequest) -> Result<CallbackReply, HandlerError> {
        (self)(request).await
    }
}

/// Renders the "you can close this window" page
#[derive(Debug, Clone)]
pub struct SuccessPage {
    pub title: String,
    pub message: String,
}

impl Default for SuccessPage {
    fn default() -> Self {
        Self {
            title: "Authentication successful".to_string(),
            message: "You can now close this window and return to the terminal.".to_string(),
        }
    }
}

#[async_trait]
impl CallbackHandler for SuccessPage {
    async fn handle(&self, _request: CallbackRequest) -> Result<CallbackReply, HandlerError> {
        Ok(CallbackReply::html(pages::render_success(
            &self.title,
            &self.message,
        )))
    }
}

/// Sends the browser onwards once the callback arrived
#[derive(Debug, Clone)]
pub struct RedirectTo(pub String);

#[async_trait]
impl CallbackHandler for RedirectTo {
    async fn handle(&self, _request: CallbackRequest) -> Result<CallbackReply, HandlerError> {
        Ok(CallbackReply::redirect(&self.0))
    }
}

/// Fails the login when the provider reported an OAuth `error` parameter
#[derive(Debug, Clone, Default)]
pub struct OAuthErrorGuard;

#[async_trait]
impl CallbackHandler for OAuthErrorGuard {
    async fn handle(&self, request: CallbackRequest) -> Result<CallbackReply, HandlerError> {
        if let Some(error) = request.query_param("error") {
            let message = request.query_param("error_description").unwrap_or(error);
            return Err(HandlerError::new(message));
        }
        SuccessPage::default().handle(request).await
    }
}
