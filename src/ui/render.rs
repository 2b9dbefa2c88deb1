//! 界面渲染
//!
//! 根据 UiState 与 input_buffer 绘制：标题栏显示模型、推理开关与阶段，
//! 主体为对话（推理文本、用过的工具、回答，按宽度换行）以及进行中的流式回答，底部为输入框与快捷键提示。

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::core::{AgentPhase, DisplayMessage, Speaker, UiState};

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        lines.push(line);
    }
    lines
}

fn push_block(lines: &mut Vec<Line<'static>>, prefix: &'static str, style: Style, body: &str, width: usize) {
    for (i, line) in wrap_text(body, width).into_iter().enumerate() {
        let pref = if i == 0 { prefix } else { "    " };
        lines.push(Line::from(vec![
            Span::styled(pref, style.add_modifier(Modifier::BOLD)),
            Span::styled(line, style),
        ]));
    }
}

fn message_lines(lines: &mut Vec<Line<'static>>, m: &DisplayMessage, show_thinking: bool, width: usize) {
    match m.speaker {
        Speaker::User => push_block(lines, "You ", Style::default().fg(Color::Cyan), &m.content, width),
        Speaker::Assistant => {
            if show_thinking && !m.thinking.is_empty() {
                let style = Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC);
                push_block(lines, "思考 ", style, m.thinking.trim(), width);
            }
            if !m.tools_used.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("    工具: {}", m.tools_used.join(", ")),
                    Style::default().fg(Color::Yellow),
                )));
            }
            push_block(lines, "AI  ", Style::default().fg(Color::Green), &m.content, width);
        }
    }
}

/// 绘制一帧：上方对话区（标题 + 历史 + 滚动条），下方输入区；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    state: &UiState,
    input_buffer: &str,
    conversation_scroll: usize,
    out: &mut (usize, usize),
) {
    let input_height = 5u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(input_height)])
        .split(f.area());

    let conv_area = chunks[0];
    let content_width = conv_area.width.saturating_sub(2).saturating_sub(1) as usize; // 边框 + 滚动条
    let width = content_width.max(20).saturating_sub(4);

    let phase_str = match state.phase {
        AgentPhase::Idle => "空闲",
        AgentPhase::Streaming => "输出中…",
        AgentPhase::ToolExecuting => "执行工具…",
    };
    let thinking_str = if state.include_thoughts { "开" } else { "关" };
    let title = format!(
        " forager │ {} │ 推理: {} │ {} ",
        state.model, thinking_str, phase_str
    );
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let mut text_lines: Vec<Line> = Vec::new();
    for (idx, m) in state.messages.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(Span::raw("")));
        }
        message_lines(&mut text_lines, m, state.show_thinking, width);
    }

    // 进行中的 cycle
    if state.input_locked() {
        text_lines.push(Line::from(Span::raw("")));
        if !state.active_tools.is_empty() {
            text_lines.push(Line::from(Span::styled(
                format!("    正在使用工具: {}", state.active_tools.join(", ")),
                Style::default().fg(Color::Yellow),
            )));
        } else if state.stream_buffer.is_empty() {
            text_lines.push(Line::from(Span::styled(
                "    思考中…",
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            let body = format!("{}▌", state.stream_buffer);
            push_block(&mut text_lines, "AI  ", Style::default().fg(Color::Green), &body, width);
        }
    }

    let content_height = conv_area.height.saturating_sub(2) as usize; // 边框
    let total_lines = text_lines.len();
    let max_scroll = total_lines.saturating_sub(content_height);
    let scroll_offset = conversation_scroll.min(max_scroll);

    let inner = block.inner(conv_area);
    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, conv_area);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }

    let input_prompt = if let Some(err) = &state.error_message {
        format!(" 错误: {} ", err.chars().take(60).collect::<String>())
    } else if let Some(notice) = &state.notice {
        format!(" {} ", notice)
    } else if state.input_locked() {
        " 等待回复… (Ctrl+C 取消) ".to_string()
    } else {
        " 输入 ".to_string()
    };

    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };

    let hint = " Enter 发送 │ ↑↓ 滚动 │ Ctrl+T 推理 │ Ctrl+G 模型 │ Ctrl+H/F2 显示推理 │ Ctrl+C 取消 │ Esc 退出 ";
    let input_block = Block::default()
        .title(input_prompt)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(input_buffer)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if state.input_locked() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });

    f.render_widget(input, chunks[1]);

    out.0 = total_lines;
    out.1 = content_height;
}
