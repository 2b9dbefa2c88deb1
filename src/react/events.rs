//! 事件定义
//!
//! - StreamEvent：流式驱动 -> 调度循环（有界队列内传递）
//! - AgentEvent：调度循环 -> 展示层（可序列化为 JSON 供前端展示）

use serde::Serialize;
use serde_json::{Map, Value};

use crate::llm::LlmError;
use crate::memory::Turn;

/// 模型请求的一次工具调用；index 为本批次内的上报顺序
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Map<String, Value>,
    pub index: usize,
}

/// 一次流结束时的结果
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// 没有工具调用：最终回答与推理文本
    Message { text: String, thinking: String },
    /// 有工具调用：history 为「输入历史 + 模型的函数调用 Turn」的提案，需由调度方提交
    ToolCalls {
        calls: Vec<ToolCall>,
        history: Vec<Turn>,
        thinking: String,
    },
}

/// 流式驱动发出的事件；Done / Error 恰好出现一次且位于末尾
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(String),
    Done(StreamOutcome),
    Error(LlmError),
}

/// 展示层事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 回答的一小段（实时展示）
    Chunk { text: String },
    /// 正在执行的一批工具
    ToolsRunning { tools: Vec<String> },
    /// 本轮结束：最终回答、推理文本、本轮用过的全部工具
    Finalized {
        text: String,
        thinking: String,
        tools_used: Vec<String>,
    },
    /// 本轮因传输错误、取消或轮次上限而终止
    Error { text: String },
    /// 上一轮尚未结束，新的输入被拒绝
    Busy,
    /// 模型或推理开关已更新（下一轮生效）
    SettingsChanged { model: String, include_thoughts: bool },
}
