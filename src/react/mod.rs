//! 认知层：流式驱动、Agent 主循环、事件定义、系统提示词

pub mod driver;
pub mod events;
pub mod loop_;
pub mod prompt;

pub use driver::{run_stream, StreamAccumulator};
pub use events::{AgentEvent, StreamEvent, StreamOutcome, ToolCall};
pub use loop_::{AgentLoop, AgentSettings, FinalMessage};
pub use prompt::{load_system_prompt, DEFAULT_SYSTEM_PROMPT};
