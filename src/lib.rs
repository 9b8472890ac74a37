//! simrelay - SMS/call relay daemon
//!
//! Relays device events (SMS and call records) to one of two configured
//! HTTP backends, falling back to the other when the active one fails.
//! Backend URLs and the active selection live in a small SQLite settings
//! store and survive restarts.

pub mod api;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod fallback;
pub mod health;
pub mod relay;
pub mod settings;

pub use error::{Error, Result};
