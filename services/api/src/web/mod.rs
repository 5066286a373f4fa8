pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

#[cfg(test)]
pub mod test_support;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use middleware::identify;
pub use rest::{chat_handler, correct_handler, detect_language_handler};
pub use ws_handler::ws_handler;
