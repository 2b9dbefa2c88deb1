//! Agent 错误类型
//!
//! 工具层的失败一律是数据（ToolResult 中的 "error" 字段），不会出现在这里；
//! 这里只有让当前 cycle 终止的错误（传输、取消、轮次上限）与启动期的致命错误。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::HistoryError;

/// 一次 cycle 或启动过程中的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Cancelled by user")]
    Cancelled,

    /// 工具往返次数超过上限（防止模型无限请求工具）
    #[error("Tool round-trip limit reached ({0})")]
    RoundTripLimit(usize),

    #[error("History rejected: {0}")]
    History(#[from] HistoryError),

    #[error("Stream ended without a result")]
    StreamClosed,

    #[error("Tool task failed: {0}")]
    ToolTask(String),

    #[error("Workspace root {path:?} is unusable: {reason}")]
    Workspace { path: PathBuf, reason: String },

    #[error("Config error: {0}")]
    ConfigError(String),
}
