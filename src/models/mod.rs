//! Data models for Miqat entities.
//!
//! - `User`: the authenticated account record as the server reports it
//! - `UserSettings`: the partial settings update sent to the server

pub mod user;

pub use user::{User, UserSettings};
