//! Interview API Library Crate
//!
//! Configuration, REST handlers, WebSocket session logic and routing for the
//! mock-interview service. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
