//! LLM 层：流式客户端抽象与实现（Gemini / Scripted）

pub mod gemini;
pub mod mock;
pub mod traits;

pub use gemini::{GeminiClient, GEMINI_BASE_URL};
pub use mock::ScriptedLlmClient;
pub use traits::{GenerateRequest, GenerationConfig, LlmClient, LlmError, PartStream};
