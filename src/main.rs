//! forager - 终端编码智能体
//!
//! 入口：解析参数、检查 API Key、加载配置、初始化日志（写入文件，终端留给 TUI）、
//! 创建 Gemini 客户端与 Agent 编排器，并运行 TUI 主循环。

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use forager::{
    config::{load_config, AppConfig},
    core::{create_agent, UiState},
    llm::GeminiClient,
    ui::run_app,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, PartialEq)]
enum CliAction {
    Run { config: Option<PathBuf> },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<CliAction, String> {
    let mut config = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" | "-v" | "version" => return Ok(CliAction::Version),
            "--help" | "-h" | "help" => return Ok(CliAction::Help),
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(CliAction::Run { config })
}

fn usage(models: &[String]) -> String {
    format!(
        "{NAME} {VERSION} - a terminal coding agent backed by Gemini

Usage:
  {NAME} [--config <file>]
  {NAME} --version | -v
  {NAME} --help | -h

Environment:
  GOOGLE_API_KEY    API key (required; GEMINI_API_KEY is accepted as a fallback)
  FORAGER__*        overrides config keys, e.g. FORAGER__LLM__MODEL=gemini-2.5-pro
  RUST_LOG          log filter (default forager=info)

Models (Ctrl+G cycles):
  {}

Keys:
  Enter    send           Ctrl+C   cancel current request
  Ctrl+T   toggle thinking          Ctrl+G   next model
  Ctrl+H / F2  show/hide thinking text  Esc  quit
",
        models.join("\n  ")
    )
}

fn api_key() -> Option<String> {
    ["GOOGLE_API_KEY", "GEMINI_API_KEY"]
        .into_iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

fn init_tracing(cfg: &AppConfig) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.app.log_file)
        .with_context(|| format!("Failed to open log file {}", cfg.app.log_file.display()))?;

    // 日志：默认 forager=info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forager=info")))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match parse_args(&args) {
        Ok(CliAction::Version) => {
            println!("{NAME} {VERSION}");
            return Ok(());
        }
        Ok(CliAction::Help) => {
            print!("{}", usage(&AppConfig::default().llm.models));
            return Ok(());
        }
        Ok(CliAction::Run { config }) => config,
        Err(e) => {
            eprintln!("{e}\n\n{}", usage(&AppConfig::default().llm.models));
            std::process::exit(2);
        }
    };

    let Some(key) = api_key() else {
        eprintln!("Error: GOOGLE_API_KEY environment variable is not set");
        eprintln!("Get an API key at https://aistudio.google.com/apikey");
        std::process::exit(1);
    };

    let cfg = load_config(config_path).context("Failed to load config")?;
    init_tracing(&cfg)?;
    tracing::info!(version = VERSION, model = %cfg.llm.model, "starting");

    let llm = GeminiClient::new(key, cfg.llm.base_url.as_deref(), cfg.llm.connect_timeout())
        .context("Failed to create Gemini client")?;

    let (cmd_tx, event_rx) = match create_agent(&cfg, Arc::new(llm)) {
        Ok(channels) => channels,
        Err(e) => {
            tracing::error!(error = %e, "agent setup failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let state = UiState::new(cfg.llm.model.clone(), cfg.llm.include_thoughts);
    run_app(state, event_rx, cmd_tx)
        .await
        .context("App run failed")?;

    tracing::info!("bye");
    Ok(())
}
