//! API module - HTTP/WebSocket surface of the serving layer

pub mod history_api;
pub mod stream_api;
pub mod ws_api;

// Re-export API handlers
pub use history_api::{delete_history, get_history, HistoryResponse};
pub use stream_api::chat_stream;
pub use ws_api::chat_socket;
