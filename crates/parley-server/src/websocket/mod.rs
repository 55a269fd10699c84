//! WebSocket connections, heartbeat, routing, and room fanout.

pub mod connection;
pub mod handlers;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod session;
pub mod upgrade;
