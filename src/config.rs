//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__LLM__MODEL=gemini-2.5-pro`）。
//! 任何缺失的键都回落到这里的默认值。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::tools::ExecutorConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "FORAGER";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub agent: AgentSection,
}

/// [app] 段：工作目录、日志文件、系统提示词文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 沙箱根目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    /// TUI 占用终端，日志写入文件
    pub log_file: PathBuf,
    /// 覆盖内置系统提示词
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            log_file: default_log_file(),
            system_prompt_file: None,
        }
    }
}

fn default_log_file() -> PathBuf {
    std::env::temp_dir().join("forager.log")
}

/// [llm] 段：模型与后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    /// Ctrl+G 在这些模型间循环
    pub models: Vec<String>,
    /// 未设置时用官方端点
    pub base_url: Option<String>,
    pub include_thoughts: bool,
    pub connect_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            models: default_models(),
            base_url: None,
            include_thoughts: false,
            connect_timeout_secs: 30,
        }
    }
}

impl LlmSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_models() -> Vec<String> {
    [
        "gemini-2.0-flash",
        "gemini-2.5-flash",
        "gemini-2.5-pro",
        "gemini-3-flash-preview",
        "gemini-3-pro-preview",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [tools] 段：读写大小上限、glob 结果上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub max_read_bytes: u64,
    pub max_write_bytes: u64,
    pub max_glob_matches: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            max_read_bytes: ExecutorConfig::DEFAULT_MAX_READ_BYTES,
            max_write_bytes: ExecutorConfig::DEFAULT_MAX_WRITE_BYTES,
            max_glob_matches: ExecutorConfig::DEFAULT_MAX_GLOB_MATCHES,
        }
    }
}

/// [agent] 段：循环上限与流事件队列容量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单个 cycle 内允许的工具往返次数
    pub max_round_trips: usize,
    pub event_queue_capacity: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_round_trips: 25,
            event_queue_capacity: 10,
        }
    }
}

impl AppConfig {
    /// 沙箱根：配置 > 当前目录
    pub fn workspace_root(&self) -> std::io::Result<PathBuf> {
        match &self.app.workspace_root {
            Some(p) => Ok(p.clone()),
            None => std::env::current_dir(),
        }
    }

    pub fn executor_config(&self, root: PathBuf) -> ExecutorConfig {
        ExecutorConfig::new(root)
            .with_max_read_bytes(self.tools.max_read_bytes)
            .with_max_write_bytes(self.tools.max_write_bytes)
            .with_max_glob_matches(self.tools.max_glob_matches)
    }
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
