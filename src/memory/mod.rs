//! 记忆层：会话内只追加的对话历史（不持久化）

pub mod conversation;

pub use conversation::{ConversationHistory, HistoryError, Part, Role, Turn};
