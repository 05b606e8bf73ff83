//! Interactive login callbacks
//!
//! This module provides the pieces every browser-based grant relies on:
//! - A registry correlating callback ids with the login waiting on them
//! - A shared loopback HTTP listener dispatching `/callback/{id}` requests
//! - Per-login handlers controlling the browser response
//! - Success and error pages

mod callback_server;
pub mod handler;
pub mod manager;
pub mod pages;
pub mod registry;
pub mod types;

pub use handler::{
    CallbackHandler, CallbackReply, CallbackRequest, HandlerError, OAuthErrorGuard, RedirectTo,
    SuccessPage,
};
pub use manager::{CallbackCanceller, CallbackServerManager, PendingCallback};
pub use registry::PendingRegistry;
pub use types::{AuthError, AuthResult};
