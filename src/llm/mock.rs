//! 脚本化 LLM 客户端（用于测试，无需 API）
//!
//! 每次 stream_generate 依次弹出一段预先写好的脚本：脚本是部分响应的序列，
//! 可在任意位置插入 Err 模拟传输中断；同时记录收到的请求，便于断言历史内容。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{Map, Value};

use crate::llm::{GenerateRequest, LlmClient, LlmError, PartStream};
use crate::memory::Part;

/// 一段脚本：每项为一次增量
pub type Script = Vec<Result<Vec<Part>, LlmError>>;

/// 按顺序回放脚本的客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerateRequest>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    /// 每个增量之间的延迟（模拟慢速网络）
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// 已收到的请求快照
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.scripts.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// 构造函数调用 Part 的便捷函数
pub fn function_call(name: &str, args: Value, signature: Option<&str>) -> Part {
    let args = match args {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    Part::FunctionCall {
        name: name.to_string(),
        args,
        signature: signature.map(String::from),
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<PartStream, LlmError> {
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(request.clone());
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))?;

        let delay = self.chunk_delay;
        let stream = stream::iter(script).then(move |item| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }
}
