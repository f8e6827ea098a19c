//! Request handlers for the websocket transport and the admin surface

pub mod admin;
pub mod websocket;

// Re-export the websocket handler
pub use websocket::handle_ws_client;
