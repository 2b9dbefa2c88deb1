//! TUI 应用主循环
//!
//! 进入全屏/原始模式，每帧先把编排器发来的 AgentEvent 全部折叠进 UiState，再轮询键盘，
//! 将用户输入与快捷键转为 Command 发送给编排器，最后用 draw 渲染 UiState 与输入缓冲。

use std::io::{self, Stdout};

use anyhow::Context;
use crossterm::event::KeyCode;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::core::{Command, UiState};
use crate::react::AgentEvent;
use crate::ui::event::{AppEvent, EventHandler};
use crate::ui::render::draw;

/// 输入这些词也会退出
fn is_exit_word(input: &str) -> bool {
    matches!(
        input.to_lowercase().as_str(),
        "/exit" | "exit" | "/quit" | "quit"
    )
}

/// 运行 TUI：启用原始模式与全屏，循环 drain 事件 + poll 键盘 + 渲染，退出时恢复终端
pub async fn run_app(
    mut state: UiState,
    mut event_rx: mpsc::UnboundedReceiver<AgentEvent>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) -> anyhow::Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut state, &mut event_rx, cmd_tx).await;

    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state: &mut UiState,
    event_rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) -> anyhow::Result<()> {
    let event_handler = EventHandler::new(cmd_tx);
    let mut input_buffer = String::new();
    let mut conversation_scroll = usize::MAX;
    let mut last_len = (0usize, 0usize);

    loop {
        loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply(ev),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("agent task ended, leaving UI");
                    return Ok(());
                }
            }
        }

        // 有新内容时自动滚到底部
        let len = (state.messages.len(), state.stream_buffer.len());
        if len != last_len {
            last_len = len;
            conversation_scroll = usize::MAX;
        }

        if let Some(ev) = event_handler.poll()? {
            match ev {
                AppEvent::Command(Command::Quit) => break,
                AppEvent::Command(_) => {}
                AppEvent::ToggleThinkingView => state.show_thinking = !state.show_thinking,
                AppEvent::Key(key) => match key.code {
                    // 进行中的 cycle 未结束前不提交，输入保留
                    KeyCode::Enter if !state.input_locked() => {
                        let input = input_buffer.trim().to_string();
                        input_buffer.clear();
                        if is_exit_word(&input) {
                            event_handler.send(Command::Quit);
                            break;
                        }
                        if !input.is_empty() {
                            state.submit(&input);
                            event_handler.send_submit(input);
                        }
                    }
                    KeyCode::Backspace => {
                        input_buffer.pop();
                    }
                    KeyCode::Char(c) => input_buffer.push(c),
                    KeyCode::Up => conversation_scroll = conversation_scroll.saturating_sub(1),
                    KeyCode::Down => conversation_scroll = conversation_scroll.saturating_add(1),
                    KeyCode::PageUp => conversation_scroll = conversation_scroll.saturating_sub(10),
                    KeyCode::PageDown => conversation_scroll = conversation_scroll.saturating_add(10),
                    KeyCode::Home => conversation_scroll = 0,
                    KeyCode::End => conversation_scroll = usize::MAX,
                    _ => {}
                },
            }
        }

        let mut scroll_info = (0usize, 0usize);
        terminal.draw(|f| {
            draw(f, state, &input_buffer, conversation_scroll, &mut scroll_info);
        })?;
        let (total_lines, viewport_height) = scroll_info;
        conversation_scroll = conversation_scroll.min(total_lines.saturating_sub(viewport_height));

        tokio::task::yield_now().await;
    }
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
