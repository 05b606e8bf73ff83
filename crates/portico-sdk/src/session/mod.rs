//! Platform session credentials and their collaborators

pub mod credentials;
pub mod probe;
pub mod store;

pub use credentials::{AuthMode, CredentialResolver, SessionCredentials};
pub use probe::{PathSessionProbe, SessionProbe};
pub use store::{MemoryCredentialStore, SessionSink, TokenProvider};
