//! WebSocket Session Management
//!
//! The browser hosts the speech engines; this module drives them remotely:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `ports`: Implements the dialogue's speech and cue ports as outbound messages.
//! - `session`: Manages the WebSocket connection lifecycle, from `start` to `session_ended`.

pub mod ports;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
