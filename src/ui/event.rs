//! 事件处理
//!
//! 轮询 crossterm 键盘事件：Ctrl+C / Ctrl+T / Ctrl+G / Esc / Ctrl+Q 转为 Command 发给编排器，
//! Ctrl+H / F2 只切换本地的推理显示，其余按键交给 run_app 拼 input_buffer，Enter 时 send_submit。

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::core::Command;

/// 应用事件：来自快捷键的 Command、本地开关或原始 KeyEvent
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Command(Command),
    ToggleThinkingView,
    Key(KeyEvent),
}

/// 按键 -> 应用事件
pub fn map_key(key: KeyEvent) -> AppEvent {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => AppEvent::Command(Command::Cancel),
        KeyCode::Char('t') if ctrl => AppEvent::Command(Command::ToggleThinking),
        KeyCode::Char('g') if ctrl => AppEvent::Command(Command::CycleModel),
        KeyCode::Char('h') if ctrl => AppEvent::ToggleThinkingView,
        // 多数终端把 Ctrl+H 报告为 Backspace，F2 作为可达的备选
        KeyCode::F(2) => AppEvent::ToggleThinkingView,
        KeyCode::Char('q') if ctrl => AppEvent::Command(Command::Quit),
        KeyCode::Esc => AppEvent::Command(Command::Quit),
        _ => AppEvent::Key(key),
    }
}

/// 事件处理器：持有 cmd_tx，poll 时读键盘并返回 AppEvent，快捷键命令直接转发
pub struct EventHandler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EventHandler {
    pub fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let ev = map_key(key);
                    if let AppEvent::Command(cmd) = &ev {
                        self.send(cmd.clone());
                    }
                    return Ok(Some(ev));
                }
            }
        }
        Ok(None)
    }

    pub fn send(&self, cmd: Command) {
        let _ = self.cmd_tx.send(cmd);
    }

    pub fn send_submit(&self, input: String) {
        self.send(Command::Submit(input));
    }
}
