//! Portico SDK
//!
//! Authentication plumbing shared by every Portico grant type and command:
//!
//! - [`auth`]: a loopback callback server correlating browser redirects with
//!   the interactive login that is waiting for them
//! - [`client`]: a platform client choosing between the session cookie and
//!   the bearer token, falling back once when the session looks stale, and
//!   reporting rotated sessions
//! - [`session`]: credentials and the credential-store collaborator traits

pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use auth::{
    AuthError, AuthResult, CallbackHandler, CallbackReply, CallbackRequest, CallbackServerManager,
    HandlerError, PendingCallback,
};
pub use client::{ClientBuilder, FallbackTrigger, PlatformClient};
pub use error::{ApiError, Result};
pub use session::{
    AuthMode, MemoryCredentialStore, SessionCredentials, SessionSink, TokenProvider,
};
pub use types::{RequestOptions, RequestOutcome, ResultKey};
