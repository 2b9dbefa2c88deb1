//! 工具执行器
//!
//! execute(tool_name, args) 总是返回 ToolResult：缺参、越界、文件过大、二进制、替换不唯一等
//! 用户可见的问题都以 `"error"` 字段表示，交还给模型自行调整，不会中断 Agent 循环。
//! 执行器无锁、无跨调用状态；同一文件上的并发调用需由调用方串行化。
//! 每次调用输出结构化审计日志（JSON）。

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::catalog::{
    CREATE_DIRECTORY, EDIT_FILE, GLOB_SEARCH, LIST_DIRECTORY, READ_FILE, WRITE_FILE,
};
use crate::tools::SafeFs;

/// 二进制嗅探读取的字节数
const BINARY_SNIFF_BYTES: usize = 512;

/// 工具结果：键随工具而变的 JSON 对象；出现 "error" 键即表示失败
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ToolResult(Map<String, Value>);

impl ToolResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new().with("error", message.into())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.0.contains_key("error")
    }

    pub fn error_message(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// 执行器配置：构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub root: PathBuf,
    pub max_read_bytes: u64,
    /// 写入上限单独配置，默认比读取上限宽松
    pub max_write_bytes: u64,
    pub max_glob_matches: usize,
}

impl ExecutorConfig {
    pub const DEFAULT_MAX_READ_BYTES: u64 = 100 * 1024;
    pub const DEFAULT_MAX_WRITE_BYTES: u64 = Self::DEFAULT_MAX_READ_BYTES * 10;
    pub const DEFAULT_MAX_GLOB_MATCHES: usize = 100;

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_read_bytes: Self::DEFAULT_MAX_READ_BYTES,
            max_write_bytes: Self::DEFAULT_MAX_WRITE_BYTES,
            max_glob_matches: Self::DEFAULT_MAX_GLOB_MATCHES,
        }
    }

    pub fn with_max_read_bytes(mut self, n: u64) -> Self {
        self.max_read_bytes = n;
        self
    }

    pub fn with_max_write_bytes(mut self, n: u64) -> Self {
        self.max_write_bytes = n;
        self
    }

    pub fn with_max_glob_matches(mut self, n: usize) -> Self {
        self.max_glob_matches = n;
        self
    }
}

/// 沙箱工具执行器
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    fs: SafeFs,
    config: ExecutorConfig,
}

impl ToolExecutor {
    /// 根目录无法解析时返回致命错误
    pub fn new(config: ExecutorConfig) -> Result<Self, AgentError> {
        let fs = SafeFs::new(&config.root)?;
        let config = ExecutorConfig {
            root: fs.root().to_path_buf(),
            ..config
        };
        Ok(Self { fs, config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.fs.root()
    }

    /// 按名称执行工具；输出 JSON 审计日志
    pub fn execute(&self, tool_name: &str, args: &Map<String, Value>) -> ToolResult {
        let start = Instant::now();
        let result = match tool_name {
            READ_FILE => self.read_file(args),
            LIST_DIRECTORY => self.list_directory(args),
            GLOB_SEARCH => self.glob_search(args),
            WRITE_FILE => self.write_file(args),
            EDIT_FILE => self.edit_file(args),
            CREATE_DIRECTORY => self.create_directory(args),
            other => ToolResult::error(format!("unknown tool: {other}")),
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": !result.is_error(),
            "error": result.error_message(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "tool");
        result
    }

    fn read_file(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(raw) = non_empty_arg(args, "path") else {
            return ToolResult::error("path is required");
        };
        let path = match self.fs.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::error(format!("file not found: {raw}"))
            }
            Err(e) => return ToolResult::error(e.to_string()),
        };
        if meta.is_dir() {
            return ToolResult::error("path is a directory, use list_directory instead");
        }

        let size = meta.len();
        let display = path.display().to_string();
        if size > self.config.max_read_bytes {
            return ToolResult::error(format!(
                "file too large: {} bytes (max {} bytes)",
                size, self.config.max_read_bytes
            ))
            .with("path", display)
            .with("size", size);
        }

        if looks_binary(&path) {
            return ToolResult::error("file appears to be binary")
                .with("path", display)
                .with("size", size);
        }

        match std::fs::read(&path) {
            Ok(bytes) => ToolResult::new()
                .with("path", display)
                .with("content", String::from_utf8_lossy(&bytes).into_owned())
                .with("size", size),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    fn list_directory(&self, args: &Map<String, Value>) -> ToolResult {
        let raw = non_empty_arg(args, "path").unwrap_or(".");
        let path = match self.fs.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match std::fs::metadata(&path) {
            Ok(m) if !m.is_dir() => return ToolResult::error("path is not a directory"),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::error(format!("directory not found: {raw}"))
            }
            Err(e) => return ToolResult::error(e.to_string()),
        }

        let entries = match std::fs::read_dir(&path) {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let mut items = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => return ToolResult::error(e.to_string()),
            };
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            items.push(name);
        }
        items.sort();

        let count = items.len();
        ToolResult::new()
            .with("path", path.display().to_string())
            .with("items", items)
            .with("count", count)
    }

    fn glob_search(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(pattern) = non_empty_arg(args, "pattern") else {
            return ToolResult::error("pattern is required");
        };
        if let Err(e) = glob::Pattern::new(pattern) {
            return ToolResult::error(format!("invalid pattern: {e}"));
        }
        // 模式只能相对根展开
        let pattern_path = Path::new(pattern);
        if pattern_path.is_absolute()
            || pattern_path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return ToolResult::error("path is outside allowed directory");
        }

        let root = glob::Pattern::escape(&self.fs.root().to_string_lossy());
        let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
        let paths = match glob::glob(&full) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid pattern: {e}")),
        };

        // glob 会穿过符号链接目录，每个结果都要重新做越界校验
        let mut matches: Vec<String> = paths
            .filter_map(|entry| match entry {
                Ok(p) => {
                    let contained = p.to_str().is_some_and(|s| self.fs.resolve(s).is_ok());
                    if !contained {
                        tracing::debug!(path = %p.display(), "glob match outside root dropped");
                        return None;
                    }
                    self.fs.relative(&p).filter(|rel| !rel.is_empty())
                }
                Err(e) => {
                    tracing::debug!(error = %e, "glob entry skipped");
                    None
                }
            })
            .collect();
        matches.sort();

        let truncated = matches.len() > self.config.max_glob_matches;
        if truncated {
            matches.truncate(self.config.max_glob_matches);
        }
        let count = matches.len();
        ToolResult::new()
            .with("pattern", pattern)
            .with("matches", matches)
            .with("count", count)
            .with("truncated", truncated)
    }

    fn write_file(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(raw) = non_empty_arg(args, "path") else {
            return ToolResult::error("path is required");
        };
        let Some(content) = str_arg(args, "content") else {
            return ToolResult::error("content is required");
        };
        let path = match self.fs.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let size = content.len() as u64;
        if size > self.config.max_write_bytes {
            return ToolResult::error(format!(
                "content too large: {} bytes (max {} bytes)",
                size, self.config.max_write_bytes
            ));
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::error(format!("failed to create directory: {e}"));
            }
        }
        if let Err(e) = std::fs::write(&path, content) {
            return ToolResult::error(e.to_string());
        }

        ToolResult::new()
            .with("path", path.display().to_string())
            .with("size", size)
            .with("success", true)
    }

    fn edit_file(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(raw) = non_empty_arg(args, "path") else {
            return ToolResult::error("path is required");
        };
        let Some(old_string) = str_arg(args, "old_string") else {
            return ToolResult::error("old_string is required");
        };
        let Some(new_string) = str_arg(args, "new_string") else {
            return ToolResult::error("new_string is required");
        };
        let path = match self.fs.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let display = path.display().to_string();

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::error(format!("file not found: {raw}"))
            }
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if old_string.is_empty() {
            return ToolResult::error("old_string must not be empty").with("path", display);
        }
        let occurrences = content.matches(old_string).count();
        if occurrences == 0 {
            return ToolResult::error("old_string not found in file").with("path", display);
        }
        if occurrences > 1 {
            return ToolResult::error(format!(
                "old_string found {occurrences} times in file, must be unique"
            ))
            .with("path", display)
            .with("occurrences", occurrences);
        }

        let new_content = content.replacen(old_string, new_string, 1);
        if let Err(e) = std::fs::write(&path, &new_content) {
            return ToolResult::error(e.to_string());
        }

        ToolResult::new()
            .with("path", display)
            .with("size", new_content.len())
            .with("success", true)
    }

    fn create_directory(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(raw) = non_empty_arg(args, "path") else {
            return ToolResult::error("path is required");
        };
        let path = match self.fs.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        if let Err(e) = std::fs::create_dir_all(&path) {
            return ToolResult::error(e.to_string());
        }
        ToolResult::new()
            .with("path", path.display().to_string())
            .with("success", true)
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn non_empty_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    str_arg(args, key).filter(|s| !s.is_empty())
}

/// 前 512 字节中含 NUL 即视为二进制；读不到时按文本处理，交给后续读取报错
fn looks_binary(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    let mut buf = Vec::with_capacity(BINARY_SNIFF_BYTES);
    if file
        .take(BINARY_SNIFF_BYTES as u64)
        .read_to_end(&mut buf)
        .is_err()
    {
        return false;
    }
    buf.contains(&0)
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
