//! Agent 编排器：主控循环
//!
//! 负责：根据配置创建工具执行器与 AgentLoop，建立 cmd / event 两条通道，
//! 并在后台任务中消费用户命令（Submit / Cancel / CycleModel / ToggleThinking / Quit）。
//! cycle 在独立任务中运行，编排器在此期间继续接收命令：新的 Submit 以 Busy 拒绝，
//! 设置变更先记下、cycle 结束后生效，Cancel 取消当前 cycle，Quit 取消后退出。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::config::AppConfig;
use crate::core::{AgentError, SessionSupervisor};
use crate::llm::LlmClient;
use crate::react::{load_system_prompt, AgentEvent, AgentLoop, AgentSettings};
use crate::tools::ToolExecutor;

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 提交用户输入，开始一个 cycle
    Submit(String),
    /// 取消当前 cycle
    Cancel,
    /// 切换到列表中的下一个模型
    CycleModel,
    /// 开关推理过程
    ToggleThinking,
    /// 退出应用
    Quit,
}

/// 列表中 current 之后的模型；current 不在列表中时取第一个
pub fn next_model(models: &[String], current: &str) -> String {
    match models.iter().position(|m| m == current) {
        Some(i) => models[(i + 1) % models.len()].clone(),
        None => models
            .first()
            .cloned()
            .unwrap_or_else(|| current.to_string()),
    }
}

/// 根据配置创建 Agent 运行时：返回命令发送端、事件接收端
pub fn create_agent(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<(mpsc::UnboundedSender<Command>, mpsc::UnboundedReceiver<AgentEvent>), AgentError> {
    let root = cfg.workspace_root().map_err(|e| AgentError::Workspace {
        path: ".".into(),
        reason: e.to_string(),
    })?;
    let executor = ToolExecutor::new(cfg.executor_config(root))?;
    tracing::info!(root = %executor.root().display(), "tool executor ready");

    let system_prompt = load_system_prompt(cfg.app.system_prompt_file.as_deref())?;
    let settings = AgentSettings {
        model: cfg.llm.model.clone(),
        system_instruction: system_prompt,
        include_thoughts: cfg.llm.include_thoughts,
        max_round_trips: cfg.agent.max_round_trips,
        event_queue_capacity: cfg.agent.event_queue_capacity,
    };
    let agent = AgentLoop::new(llm, Arc::new(executor), settings);

    let (cmd_tx, event_rx, _task) = spawn_agent(agent, cfg.llm.models.clone());
    Ok((cmd_tx, event_rx))
}

/// 在后台任务中运行编排循环
pub fn spawn_agent(
    agent: AgentLoop,
    models: Vec<String>,
) -> (
    mpsc::UnboundedSender<Command>,
    mpsc::UnboundedReceiver<AgentEvent>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AgentEvent>();
    let task = tokio::spawn(run_orchestrator(agent, models, cmd_rx, event_tx));
    (cmd_tx, event_rx, task)
}

async fn join_cycle(running: &mut Option<JoinHandle<AgentLoop>>) -> Result<AgentLoop, JoinError> {
    match running {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// 空闲时立即应用到 AgentLoop；忙碌时由 cycle 结束后统一应用
fn publish_settings(
    idle: Option<&mut AgentLoop>,
    model: &str,
    include_thoughts: bool,
    event_tx: &mpsc::UnboundedSender<AgentEvent>,
) {
    if let Some(agent) = idle {
        agent.set_model(model);
        agent.set_include_thoughts(include_thoughts);
    }
    tracing::info!(model = %model, include_thoughts, "settings changed");
    let _ = event_tx.send(AgentEvent::SettingsChanged {
        model: model.to_string(),
        include_thoughts,
    });
}

async fn run_orchestrator(
    agent: AgentLoop,
    models: Vec<String>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<AgentEvent>,
) {
    let mut supervisor = SessionSupervisor::new();
    // 期望的设置；空闲时立即应用，忙碌时等 cycle 结束再应用
    let mut model = agent.settings().model.clone();
    let mut include_thoughts = agent.settings().include_thoughts;
    let mut idle = Some(agent);
    let mut running: Option<JoinHandle<AgentLoop>> = None;

    loop {
        tokio::select! {
            // 先收回已结束的 cycle，再处理排在后面的命令
            biased;
            joined = join_cycle(&mut running), if running.is_some() => {
                running = None;
                supervisor.end_cycle();
                match joined {
                    Ok(mut agent) => {
                        agent.set_model(model.clone());
                        agent.set_include_thoughts(include_thoughts);
                        idle = Some(agent);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "cycle task panicked");
                        let _ = event_tx.send(AgentEvent::Error { text: e.to_string() });
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };  // cmd_tx 已关闭
                match cmd {
                    Command::Submit(input) => {
                        let Some(mut agent) = idle.take() else {
                            tracing::debug!("submit rejected while busy");
                            let _ = event_tx.send(AgentEvent::Busy);
                            continue;
                        };
                        let token = supervisor.begin_cycle();
                        let events = event_tx.clone();
                        running = Some(tokio::spawn(async move {
                            // 结果已通过 Finalized / Error 事件送达
                            let _ = agent.run_cycle(&input, &events, token).await;
                            agent
                        }));
                    }
                    Command::Cancel => {
                        if supervisor.cancel() {
                            tracing::info!("cycle cancelled by user");
                        }
                    }
                    Command::CycleModel => {
                        model = next_model(&models, &model);
                        publish_settings(idle.as_mut(), &model, include_thoughts, &event_tx);
                    }
                    Command::ToggleThinking => {
                        include_thoughts = !include_thoughts;
                        publish_settings(idle.as_mut(), &model, include_thoughts, &event_tx);
                    }
                    Command::Quit => {
                        supervisor.shutdown();
                        if let Some(handle) = running.take() {
                            let _ = handle.await;
                        }
                        break;
                    }
                }
            }
        }
    }
}
