//! Authentication module: the session state machine and the durable
//! credential store behind it.
//!
//! This module provides:
//! - `CredentialStore`: file-backed storage for the bearer token and
//!   last-known user record
//! - `SessionManager`: the single source of truth for "is a user
//!   currently authenticated", driving startup restoration, login,
//!   registration, and logout

pub mod session;
pub mod store;

pub use session::{
    AuthState, SessionEvent, SessionManager, SessionSnapshot, StartupOutcome,
};
pub use store::{CredentialStore, StoreError};
