//! LLM 客户端抽象
//!
//! 后端（Gemini / Scripted）实现 LlmClient::stream_generate：给定完整请求，返回「部分响应」流，
//! 每个元素是一个候选内容片段中的 Parts。流中的 Err 表示传输层失败，消费者应立即终止本轮。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::{Part, Turn};
use crate::tools::ToolDeclaration;

/// 传输 / 后端错误：对当前 cycle 致命，但不影响会话
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    /// 提示被供应商安全策略拦截（无候选返回）
    #[error("Prompt blocked: {0}")]
    Blocked(String),
}

/// 生成参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConfig {
    /// 是否请求模型返回推理过程（thought parts）
    pub include_thoughts: bool,
}

/// 一次流式生成请求；history 是快照，后端不会修改它
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    pub history: Vec<Turn>,
    pub tools: Vec<ToolDeclaration>,
    pub config: GenerationConfig,
}

/// 部分响应流：每项为一次增量中携带的 Parts
pub type PartStream = Pin<Box<dyn Stream<Item = Result<Vec<Part>, LlmError>> + Send>>;

/// LLM 客户端 trait：只有流式生成一种调用方式
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<PartStream, LlmError>;
}
