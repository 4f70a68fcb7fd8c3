// ABOUTME: Library root for bascule - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

mod atomic;

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod hooks;
pub mod notify;
pub mod output;
pub mod router;
pub mod runtime;
pub mod state;
pub mod topology;
pub mod types;
