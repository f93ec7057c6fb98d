//! 会话层：会话记录、存储接口、内存与 SQLite 实现

pub mod persistent;
pub mod state;
pub mod store;

#[cfg(feature = "async-sqlite")]
pub use persistent::SqliteSessionStore;
pub use state::{ControlStatus, Interrupt, LoopNode, Session, SessionId, SessionState};
pub use store::{create_session_store, MemorySessionStore, SessionStore};
