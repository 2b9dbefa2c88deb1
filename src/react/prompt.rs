//! 系统提示词：内置 config/prompts/system.txt，可由 app.system_prompt_file 覆盖

use std::path::Path;

use crate::core::AgentError;

pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../../config/prompts/system.txt");

/// 读取系统提示词；指定了文件但读不到时报错，而不是静默回落
pub fn load_system_prompt(path: Option<&Path>) -> Result<String, AgentError> {
    let Some(path) = path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        AgentError::ConfigError(format!("system prompt {}: {}", path.display(), e))
    })?;
    Ok(text.trim().to_string())
}
