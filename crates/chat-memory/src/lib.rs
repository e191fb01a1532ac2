pub mod api;
pub mod config;
pub mod coordinator;
pub mod llm_worker;
pub mod memory;
pub mod memory_db;
pub mod metrics;
pub mod server;
pub mod shared_state;
pub mod telemetry;

// Public API exports
pub use config::Config;
pub use coordinator::SessionMemoryCoordinator;
pub use memory::{DurableStore, FastStore, InMemoryFastStore, Record};
pub use memory_db::MemoryDatabase;
pub use server::run_server;

// API exports
pub use api::{
    history_api::{delete_history, get_history, HistoryResponse},
    stream_api::chat_stream,
    ws_api::chat_socket,
};
