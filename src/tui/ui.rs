//! UI rendering for the debugger.

use super::app::{DebuggerApp, Mode};
use crate::asm::disasm::view;
use crate::cpu::CpuState;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(frame.area());

    // Left side: memory, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_memory(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: output, prompt and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(6),
        ])
        .split(chunks[1]);

    draw_output(frame, right_chunks[0], app);
    draw_prompt(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw memory as a table of word views, following the selection.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let arch = app.cpu.arch();
    let visible_rows = (area.height as usize).saturating_sub(2).max(1);
    let start = app.selected.saturating_sub(visible_rows / 2);
    let end = (start + visible_rows).min(app.cpu.mem.len());

    let items: Vec<ListItem> = app
        .cpu
        .mem
        .dump(start, end - start.min(end))
        .into_iter()
        .map(|(idx, word)| {
            let v = view(word, &arch);
            let addr = idx as u64;
            let is_pc = addr == app.cpu.regs.pc;
            let marker = if is_pc { "▶" } else { " " };
            let bp = if app.breakpoints.contains(&addr) { "●" } else { " " };
            let instr = match v.mnemonic {
                Some(m) => format!("{} {}", m, v.address),
                None => "???".to_string(),
            };
            let text = format!(
                "{}{} {:04}: {} {:<10} {:>6} {}",
                bp, marker, idx, v.raw_bits, instr, v.hex, v.decimal
            );

            let style = if is_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if idx == app.selected {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else if app.breakpoints.contains(&addr) {
                Style::default().fg(Color::Red)
            } else if word != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Memory ({} words) ", app.cpu.mem.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw register state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let arch = app.cpu.arch();
    let width = arch.word_width() as usize;
    let state_style = match app.cpu.state() {
        CpuState::Running => Style::default().fg(Color::Green),
        CpuState::Idle => Style::default().fg(Color::White),
        CpuState::Halted => Style::default().fg(Color::Red),
    };

    let content = vec![
        Line::from(vec![
            Span::raw("PC:  "),
            Span::styled(format!("{}", app.cpu.regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw(format!("   {}", app.selected_disassembly())),
        ]),
        Line::from(vec![
            Span::raw("ACC: "),
            Span::styled(
                format!("{:0width$b}", app.cpu.regs.acc_bits(arch.word_width()), width = width),
                Style::default().fg(Color::White),
            ),
            Span::raw(format!(" = {}", app.cpu.regs.acc)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", app.cpu.state()), state_style),
            Span::raw(format!("   {} Hz   {}", app.cpu.frequency(), arch)),
        ]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the program output, most recent lines last.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let lines: Vec<&str> = app.cpu.output().lines().collect();
    let skip = lines.len().saturating_sub(visible_rows);
    let items: Vec<ListItem> = lines[skip..].iter().map(|l| ListItem::new(*l)).collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Output ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Draw the line being typed, if any.
fn draw_prompt(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let (title, style) = match app.mode {
        Mode::Normal => (" Input ", Style::default().fg(Color::DarkGray)),
        Mode::Input(_) => (" Input ", Style::default().fg(Color::Yellow)),
        Mode::Edit => (" Edit ", Style::default().fg(Color::Yellow)),
        Mode::Resize => (" Resize ", Style::default().fg(Color::Yellow)),
    };
    let text = if app.mode == Mode::Normal {
        String::new()
    } else {
        format!("{}_", app.line)
    };

    let prompt = Paragraph::new(text)
        .style(style)
        .block(Block::default().title(title).borders(Borders::ALL));

    frame.render_widget(prompt, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run/Stop  x: Reset  n: New"),
        Line::from("b: Breakpoint  e: Edit  a: Add rows  c: Resize"),
        Line::from("+/-: Speed  w: Save  ↑↓: Select  q: Quit"),
        Line::from("Enter: Submit  Esc: Cancel"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}
