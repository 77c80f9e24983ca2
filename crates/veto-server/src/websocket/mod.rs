//! WebSocket connection management, message dispatch, and session fan-out.

pub mod connection;
pub mod handler;
pub mod hub;
pub mod protocol;
pub mod session;
