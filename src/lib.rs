//! Miqat client core - the shared, UI-free half of the Miqat prayer
//! companion app.
//!
//! This crate owns everything about "is a user logged in":
//!
//! - `auth::CredentialStore`: durable storage for the bearer token and
//!   the last-known user record
//! - `api::AuthClient`: typed requests against the Miqat API, with
//!   bearer-token injection and 401 handling on every call
//! - `auth::SessionManager`: the state machine behind login,
//!   registration, logout, and startup session restoration
//!
//! Screen layout and navigation live in the mobile shells; they consume
//! the `SessionSnapshot` stream and the five session operations.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{AuthClient, AuthError};
pub use auth::{
    AuthState, CredentialStore, SessionManager, SessionSnapshot, StartupOutcome, StoreError,
};
pub use config::Config;
pub use models::{User, UserSettings};
