//! 流式驱动
//!
//! Idle -> Streaming -> {Done | Error}。在后台任务中调用 LlmClient::stream_generate，
//! 把部分响应拆成三类：函数调用（原样累积，保留续接令牌）、推理文本（只累积不推送）、
//! 普通文本（累积并立即作为 Chunk 推送）。流结束时恰好发出一个 Done；
//! 任何传输错误立即发出 Error 并结束，不重试。
//! 事件经有界队列送出，消费者跟不上时 send 会挂起（背压）。

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::llm::{GenerateRequest, LlmClient};
use crate::memory::{Part, Role, Turn};
use crate::react::events::{StreamEvent, StreamOutcome, ToolCall};

/// 单次流的累积状态
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    answer: String,
    thinking: String,
    calls: Vec<ToolCall>,
    call_parts: Vec<Part>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 吸收一次增量，返回需要立即展示的文本片段
    pub fn absorb(&mut self, parts: Vec<Part>) -> Vec<String> {
        let mut chunks = Vec::new();
        for part in parts {
            match part {
                Part::Text(t) => {
                    if t.is_empty() {
                        continue;
                    }
                    self.answer.push_str(&t);
                    chunks.push(t);
                }
                Part::Thought(t) => self.thinking.push_str(&t),
                Part::FunctionCall { .. } => {
                    if let Part::FunctionCall { name, args, .. } = &part {
                        self.calls.push(ToolCall {
                            name: name.clone(),
                            args: args.clone(),
                            index: self.calls.len(),
                        });
                    }
                    self.call_parts.push(part);
                }
                Part::FunctionResponse { name, .. } => {
                    tracing::warn!(tool = %name, "model emitted a function response part, ignored");
                }
            }
        }
        chunks
    }

    /// 流正常结束：有函数调用时基于输入历史的副本构造提案
    pub fn finish(self, mut history: Vec<Turn>) -> StreamOutcome {
        if self.calls.is_empty() {
            return StreamOutcome::Message {
                text: self.answer,
                thinking: self.thinking,
            };
        }
        let mut parts = Vec::with_capacity(self.call_parts.len() + 1);
        if !self.answer.is_empty() {
            parts.push(Part::Text(self.answer));
        }
        parts.extend(self.call_parts);
        history.push(Turn {
            role: Role::Model,
            parts,
        });
        StreamOutcome::ToolCalls {
            calls: self.calls,
            history,
            thinking: self.thinking,
        }
    }
}

/// 后台生产者：跑完一次流并把事件推入队列；消费者提前离开时静默退出
pub async fn run_stream(
    llm: Arc<dyn LlmClient>,
    request: GenerateRequest,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut stream = match llm.stream_generate(&request).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "stream request failed");
            let _ = tx.send(StreamEvent::Error(e)).await;
            return;
        }
    };

    let mut acc = StreamAccumulator::new();
    while let Some(item) = stream.next().await {
        let parts = match item {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "stream aborted");
                let _ = tx.send(StreamEvent::Error(e)).await;
                return;
            }
        };
        for chunk in acc.absorb(parts) {
            if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                tracing::debug!("stream consumer dropped");
                return;
            }
        }
    }

    let outcome = acc.finish(request.history);
    let _ = tx.send(StreamEvent::Done(outcome)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::function_call;
    use crate::llm::{GenerationConfig, LlmError, ScriptedLlmClient};
    use serde_json::json;

    fn request(history: Vec<Turn>) -> GenerateRequest {
        GenerateRequest {
            model: "test-model".into(),
            system_instruction: String::new(),
            history,
            tools: Vec::new(),
            config: GenerationConfig::default(),
        }
    }

    async fn collect(llm: ScriptedLlmClient, history: Vec<Turn>) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(2);
        let handle = tokio::spawn(run_stream(Arc::new(llm), request(history), tx));
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        handle.await.unwrap();
        events
    }

    #[tokio::test]
    async fn test_text_is_streamed_and_thinking_withheld() {
        let llm = ScriptedLlmClient::new(vec![vec![
            Ok(vec![Part::Thought("let me think".into())]),
            Ok(vec![Part::text("Hel")]),
            Ok(vec![Part::text("lo"), Part::Thought(" more".into())]),
        ]]);
        let events = collect(llm, vec![Turn::user("hi")]).await;

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], StreamEvent::Chunk(t) if t == "Hel"));
        assert!(matches!(&events[1], StreamEvent::Chunk(t) if t == "lo"));
        match &events[2] {
            StreamEvent::Done(StreamOutcome::Message { text, thinking }) => {
                assert_eq!(text, "Hello");
                assert_eq!(thinking, "let me think more");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_function_calls_build_proposed_history() {
        let call = function_call("read_file", json!({"path": "a.txt"}), Some("opaque-sig"));
        let llm = ScriptedLlmClient::new(vec![vec![
            Ok(vec![Part::text("Checking.")]),
            Ok(vec![call.clone()]),
            Ok(vec![function_call("list_directory", json!({}), None)]),
        ]]);
        let input = vec![Turn::user("what is in a.txt?")];
        let events = collect(llm, input.clone()).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Done(StreamOutcome::ToolCalls { calls, history, .. }) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "read_file");
                assert_eq!(calls[0].index, 0);
                assert_eq!(calls[1].name, "list_directory");
                assert_eq!(calls[1].index, 1);

                assert_eq!(history.len(), 2);
                assert_eq!(history[0], input[0]);
                let model = &history[1];
                assert_eq!(model.role, Role::Model);
                assert_eq!(model.parts[0], Part::text("Checking."));
                assert_eq!(model.parts[1], call);
                assert_eq!(model.parts.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_only_turn_has_no_empty_text_part() {
        let llm = ScriptedLlmClient::new(vec![vec![Ok(vec![function_call(
            "glob_search",
            json!({"pattern": "*.rs"}),
            None,
        )])]]);
        let events = collect(llm, vec![Turn::user("find rust files")]).await;
        match &events[0] {
            StreamEvent::Done(StreamOutcome::ToolCalls { history, .. }) => {
                assert_eq!(history[1].parts.len(), 1);
                assert!(history[1].parts[0].is_function_call());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_terminates_without_done() {
        let llm = ScriptedLlmClient::new(vec![vec![
            Ok(vec![Part::text("partial")]),
            Err(LlmError::Transport("connection reset".into())),
            Ok(vec![Part::text("never seen")]),
        ]]);
        let events = collect(llm, vec![Turn::user("hi")]).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Chunk(_)));
        assert!(matches!(
            &events[1],
            StreamEvent::Error(LlmError::Transport(m)) if m == "connection reset"
        ));
    }

    #[tokio::test]
    async fn test_request_failure_is_single_error() {
        let llm = ScriptedLlmClient::new(vec![]);
        let events = collect(llm, vec![Turn::user("hi")]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(_)));
    }
}
