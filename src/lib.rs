//! forager - 终端编码智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、UI 状态投影、会话监管、编排循环
//! - **llm**: 流式 LLM 客户端抽象与实现（Gemini / Scripted）
//! - **memory**: 对话历史（只追加，提交时校验前缀）
//! - **react**: 流式驱动、Agent 主循环、事件、系统提示词
//! - **tools**: 工具声明、路径沙箱与执行器
//! - **ui**: Ratatui TUI 界面

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod react;
pub mod tools;
pub mod ui;
