//! HTTP client module for the Miqat API.
//!
//! This module provides the `AuthClient` for talking to the Miqat
//! backend. Every request funnels through one pipeline that attaches
//! the cached bearer token on the way out and reacts to a 401 on the
//! way back by purging the credential store and notifying the session
//! manager.

pub mod client;
pub mod error;

pub use client::{AuthClient, AuthPayload};
pub use error::AuthError;
