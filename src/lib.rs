//! liaison - session and OAuth connection-state core
//!
//! This crate tracks whether the user is signed in, whether the mail and
//! messaging integrations are connected, and drives the connect, revoke and
//! callback life cycle of each integration.

pub mod app;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;

pub use app::AppContext;
