//! Agent 主循环（cycle）
//!
//! 用户输入 -> 流式生成 -> 若有函数调用则按上报顺序逐个执行工具、把结果作为一个 user Turn 追加 -> 再次生成，
//! 直到模型给出不含函数调用的回答。
//!
//! 历史规则：cycle 开始时用户 Turn 立即写入正式历史；cycle 内产生的 model / tool Turn 先暂存在工作副本中，
//! 只在 Finalized 时一次性提交。失败或取消的 cycle 只留下那条用户 Turn。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{GenerateRequest, GenerationConfig, LlmClient};
use crate::memory::{ConversationHistory, Part, Role, Turn};
use crate::react::driver::run_stream;
use crate::react::events::{AgentEvent, StreamEvent, StreamOutcome, ToolCall};
use crate::tools::{all_tools, ToolDeclaration, ToolExecutor};

/// 可在 cycle 之间修改的运行参数
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub system_instruction: String,
    pub include_thoughts: bool,
    /// 单个 cycle 内允许的工具往返次数
    pub max_round_trips: usize,
    /// 驱动 -> 循环的有界队列容量
    pub event_queue_capacity: usize,
}

impl AgentSettings {
    pub fn new(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
            include_thoughts: false,
            max_round_trips: 25,
            event_queue_capacity: 10,
        }
    }
}

/// 一个 cycle 的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct FinalMessage {
    pub text: String,
    pub thinking: String,
    /// 本 cycle 内执行过的全部工具名（执行顺序，可重复）
    pub tools_used: Vec<String>,
}

pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    tools: Vec<ToolDeclaration>,
    settings: AgentSettings,
    history: ConversationHistory,
}

impl AgentLoop {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>, settings: AgentSettings) -> Self {
        Self {
            llm,
            executor,
            tools: all_tools(),
            settings,
            history: ConversationHistory::new(),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// 下一个 cycle 生效
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.settings.model = model.into();
    }

    /// 下一个 cycle 生效
    pub fn set_include_thoughts(&mut self, on: bool) {
        self.settings.include_thoughts = on;
    }

    /// 跑完一个 cycle；Finalized / Error 事件恰好发出其一
    pub async fn run_cycle(
        &mut self,
        input: &str,
        events: &mpsc::UnboundedSender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<FinalMessage, AgentError> {
        self.history.push(Turn::user(input));
        tracing::info!(
            model = %self.settings.model,
            history_len = self.history.len(),
            "cycle started"
        );

        let result = self.drive(events, &cancel).await;
        match &result {
            Ok(msg) => {
                tracing::info!(tools_used = ?msg.tools_used, "cycle finalized");
                let _ = events.send(AgentEvent::Finalized {
                    text: msg.text.clone(),
                    thinking: msg.thinking.clone(),
                    tools_used: msg.tools_used.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, history_len = self.history.len(), "cycle failed");
                let _ = events.send(AgentEvent::Error {
                    text: e.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &mut self,
        events: &mpsc::UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<FinalMessage, AgentError> {
        let mut transcript = self.history.clone();
        let mut tools_used = Vec::new();
        let mut round_trips = 0usize;

        loop {
            match self.stream_once(transcript.snapshot(), events, cancel).await? {
                StreamOutcome::Message { text, thinking } => {
                    transcript.push(Turn::model(text.clone()));
                    let appended = self.history.commit(transcript.snapshot())?;
                    tracing::debug!(appended, "transcript published");
                    return Ok(FinalMessage {
                        text,
                        thinking,
                        tools_used,
                    });
                }
                StreamOutcome::ToolCalls { calls, history, .. } => {
                    if round_trips >= self.settings.max_round_trips {
                        return Err(AgentError::RoundTripLimit(self.settings.max_round_trips));
                    }
                    round_trips += 1;
                    transcript.commit(history)?;

                    let names: Vec<String> = calls.iter().map(|c| c.name.clone()).collect();
                    let _ = events.send(AgentEvent::ToolsRunning {
                        tools: names.clone(),
                    });
                    let parts = self.dispatch(calls, cancel).await?;
                    tools_used.extend(names);
                    transcript.push(Turn {
                        role: Role::User,
                        parts,
                    });
                }
            }
        }
    }

    /// 一次流式生成：后台任务生产，这里消费并把 Chunk 转给展示层
    async fn stream_once(
        &self,
        history: Vec<Turn>,
        events: &mpsc::UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, AgentError> {
        let request = GenerateRequest {
            model: self.settings.model.clone(),
            system_instruction: self.settings.system_instruction.clone(),
            history,
            tools: self.tools.clone(),
            config: GenerationConfig {
                include_thoughts: self.settings.include_thoughts,
            },
        };

        let (tx, mut rx) = mpsc::channel(self.settings.event_queue_capacity.max(1));
        let producer = tokio::spawn(run_stream(Arc::clone(&self.llm), request, tx));

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    producer.abort();
                    return Err(AgentError::Cancelled);
                }
                ev = rx.recv() => ev,
            };
            match event {
                Some(StreamEvent::Chunk(text)) => {
                    let _ = events.send(AgentEvent::Chunk { text });
                }
                Some(StreamEvent::Done(outcome)) => return Ok(outcome),
                Some(StreamEvent::Error(e)) => return Err(AgentError::Llm(e)),
                None => return Err(AgentError::StreamClosed),
            }
        }
    }

    /// 按上报顺序逐个执行；结果顺序与调用顺序一致
    async fn dispatch(
        &self,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Part>, AgentError> {
        let mut parts = Vec::with_capacity(calls.len());
        for ToolCall { name, args, index } in calls {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::debug!(tool = %name, index, "dispatching tool call");
            let executor = Arc::clone(&self.executor);
            let (name, result) = tokio::task::spawn_blocking(move || {
                let result = executor.execute(&name, &args);
                (name, result)
            })
            .await
            .map_err(|e| AgentError::ToolTask(e.to_string()))?;

            parts.push(Part::FunctionResponse {
                name,
                response: result.into_map(),
            });
        }
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::function_call;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::tools::ExecutorConfig;
    use serde_json::json;
    use std::time::Duration;

    fn agent(dir: &std::path::Path, llm: Arc<ScriptedLlmClient>, max_round_trips: usize) -> AgentLoop {
        let executor = ToolExecutor::new(ExecutorConfig::new(dir)).unwrap();
        let mut settings = AgentSettings::new("test-model", "system");
        settings.max_round_trips = max_round_trips;
        AgentLoop::new(llm, Arc::new(executor), settings)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn test_plain_answer_commits_user_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(vec![vec![
            Ok(vec![Part::Thought("hmm".into())]),
            Ok(vec![Part::text("Hi "), Part::text("there")]),
        ]]));
        let mut agent = agent(dir.path(), llm.clone(), 25);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let msg = agent.run_cycle("hello", &tx, CancellationToken::new()).await.unwrap();
        assert_eq!(msg.text, "Hi there");
        assert_eq!(msg.thinking, "hmm");
        assert!(msg.tools_used.is_empty());

        let turns = agent.history().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::user("hello"));
        assert_eq!(turns[1], Turn::model("Hi there"));

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&AgentEvent::Finalized {
                text: "Hi there".into(),
                thinking: "hmm".into(),
                tools_used: vec![],
            })
        );
        assert_eq!(events.iter().filter(|e| matches!(e, AgentEvent::Chunk { .. })).count(), 2);
        assert!(llm.requests()[0].tools.len() == 6);
    }

    #[tokio::test]
    async fn test_tools_used_accumulates_across_rounds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            vec![Ok(vec![function_call("list_directory", json!({}), None)])],
            vec![Ok(vec![function_call("read_file", json!({"path": "a.txt"}), None)])],
            vec![Ok(vec![Part::text("a.txt says alpha")])],
        ]));
        let mut agent = agent(dir.path(), llm.clone(), 25);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let msg = agent.run_cycle("read it", &tx, CancellationToken::new()).await.unwrap();
        assert_eq!(msg.tools_used, vec!["list_directory", "read_file"]);
        // user, model(fc), user(fr), model(fc), user(fr), model
        assert_eq!(agent.history().len(), 6);

        let running: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::ToolsRunning { tools } => Some(tools),
                _ => None,
            })
            .collect();
        assert_eq!(running, vec![vec!["list_directory".to_string()], vec!["read_file".to_string()]]);
        assert_eq!(llm.requests()[2].history.len(), 5);
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_only_user_turn() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            vec![Ok(vec![function_call("list_directory", json!({}), None)])],
            vec![
                Ok(vec![Part::text("partial")]),
                Err(LlmError::Transport("reset".into())),
            ],
        ]));
        let mut agent = agent(dir.path(), llm, 25);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = agent.run_cycle("go", &tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::Transport(_))));
        assert_eq!(agent.history().turns(), &[Turn::user("go")]);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(AgentEvent::Error { .. })));
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Finalized { .. })));
    }

    #[tokio::test]
    async fn test_round_trip_limit() {
        let dir = tempfile::tempdir().unwrap();
        let call = || vec![Ok(vec![function_call("list_directory", json!({}), None)])];
        let llm = Arc::new(ScriptedLlmClient::new(vec![call(), call(), call()]));
        let mut agent = agent(dir.path(), llm.clone(), 2);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = agent.run_cycle("loop", &tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::RoundTripLimit(2)));
        assert_eq!(agent.history().len(), 1);
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_stream() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            ScriptedLlmClient::new(vec![vec![
                Ok(vec![Part::text("slow")]),
                Ok(vec![Part::text("er")]),
            ]])
            .with_chunk_delay(Duration::from_secs(30)),
        );
        let mut agent = agent(dir.path(), llm, 25);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = agent.run_cycle("wait", &tx, cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_apply_to_next_request() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            vec![Ok(vec![Part::text("one")])],
            vec![Ok(vec![Part::text("two")])],
        ]));
        let mut agent = agent(dir.path(), llm.clone(), 25);
        let (tx, _rx) = mpsc::unbounded_channel();

        agent.run_cycle("first", &tx, CancellationToken::new()).await.unwrap();
        agent.set_model("gemini-2.5-pro");
        agent.set_include_thoughts(true);
        agent.run_cycle("second", &tx, CancellationToken::new()).await.unwrap();

        let reqs = llm.requests();
        assert_eq!(reqs[0].model, "test-model");
        assert!(!reqs[0].config.include_thoughts);
        assert_eq!(reqs[1].model, "gemini-2.5-pro");
        assert!(reqs[1].config.include_thoughts);
        assert_eq!(reqs[1].history.len(), 3);
    }
}
