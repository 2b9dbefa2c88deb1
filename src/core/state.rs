//! 状态定义：UiState 投影
//!
//! UI 只持有轻量的 UiState（阶段、消息列表、流式缓冲、错误、当前设置）；
//! 每个 AgentEvent 通过 apply 折叠进来，渲染层只读。

use serde::Serialize;

use crate::react::AgentEvent;

/// Agent 阶段（UI 投影用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Idle,
    Streaming,
    ToolExecuting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Speaker {
    User,
    Assistant,
}

/// 一条已完成的展示消息
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayMessage {
    pub speaker: Speaker,
    pub content: String,
    pub thinking: String,
    pub tools_used: Vec<String>,
}

impl DisplayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
            thinking: String::new(),
            tools_used: Vec::new(),
        }
    }
}

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: AgentPhase,
    pub messages: Vec<DisplayMessage>,
    /// 当前 cycle 已收到的回答片段
    pub stream_buffer: String,
    pub active_tools: Vec<String>,
    pub error_message: Option<String>,
    /// 一次性提示（如 Busy），下一次提交时清除
    pub notice: Option<String>,
    pub model: String,
    pub include_thoughts: bool,
    /// 纯 UI 开关：是否展示推理文本
    pub show_thinking: bool,
}

impl UiState {
    pub fn new(model: impl Into<String>, include_thoughts: bool) -> Self {
        Self {
            phase: AgentPhase::Idle,
            messages: Vec::new(),
            stream_buffer: String::new(),
            active_tools: Vec::new(),
            error_message: None,
            notice: None,
            model: model.into(),
            include_thoughts,
            show_thinking: true,
        }
    }

    pub fn input_locked(&self) -> bool {
        self.phase != AgentPhase::Idle
    }

    /// 用户提交：立即显示输入并进入等待
    pub fn submit(&mut self, text: &str) {
        self.messages.push(DisplayMessage::user(text));
        self.phase = AgentPhase::Streaming;
        self.stream_buffer.clear();
        self.active_tools.clear();
        self.error_message = None;
        self.notice = None;
    }

    pub fn apply(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Chunk { text } => {
                self.phase = AgentPhase::Streaming;
                self.active_tools.clear();
                self.stream_buffer.push_str(&text);
            }
            AgentEvent::ToolsRunning { tools } => {
                // 函数调用前的文本属于中间过程，不单独成消息
                self.stream_buffer.clear();
                self.active_tools = tools;
                self.phase = AgentPhase::ToolExecuting;
            }
            AgentEvent::Finalized {
                text,
                thinking,
                tools_used,
            } => {
                let content = if text.is_empty() {
                    std::mem::take(&mut self.stream_buffer)
                } else {
                    text
                };
                self.messages.push(DisplayMessage {
                    speaker: Speaker::Assistant,
                    content,
                    thinking,
                    tools_used,
                });
                self.reset_cycle();
            }
            AgentEvent::Error { text } => {
                self.error_message = Some(text);
                self.reset_cycle();
            }
            AgentEvent::Busy => {
                self.notice = Some("上一条请求尚未完成".to_string());
            }
            AgentEvent::SettingsChanged {
                model,
                include_thoughts,
            } => {
                self.model = model;
                self.include_thoughts = include_thoughts;
            }
        }
    }

    fn reset_cycle(&mut self) {
        self.phase = AgentPhase::Idle;
        self.stream_buffer.clear();
        self.active_tools.clear();
    }
}
