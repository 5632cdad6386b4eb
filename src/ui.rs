use std::mem;

use ratatui::prelude::*;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Clear, Padding, Paragraph};

use crate::app::{App, Focus, Overlay};
use crate::assistant::{Fragment, Role, Turn, TurnKind, format_response};
use crate::editor::{Marker, Severity};
use crate::terminal::{ConnectionState, SpanClass, StyledSpan};
use crate::theme::Theme;

const TEXT_PADDING: u16 = 1;
const STATUS_HEIGHT: u16 = 3;
const TAB_BAR_HEIGHT: u16 = 1;
const PANE_TITLE_HEIGHT: u16 = 1;
const MAX_PROBLEM_ROWS: u16 = 5;
const ASSISTANT_WIDTH_PERCENT: u16 = 38;
const TERMINAL_HEIGHT_PERCENT: u16 = 35;
const DIALOG_WIDTH: u16 = 56;
const ACTIVE_TITLE_BG: Color = Color::Rgb(90, 145, 200);
const ACTIVE_TITLE_FG: Color = Color::Black;
const STATUS_HELP_TEXT: &str = "F5 run | Ctrl+N new | Ctrl+W close | F2 rename | F4 language | F3 AI | F6 focus | Ctrl+Q quit";
const EMPTY_EDITOR_TEXT: &str = "No open tabs. Press Ctrl+N to create one.";
const LOADING_EDITOR_TEXT: &str = "Loading editor...";
const TERMINAL_INPUT_HINT: &str = "Input is available while a program is running";

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let [tabs, body, status] = Layout::vertical([
        Constraint::Length(TAB_BAR_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .areas(frame.area());

    render_tab_bar(frame, tabs, app, theme);

    let main = if app.assistant().panel_open() {
        let [main, side] = Layout::horizontal([
            Constraint::Percentage(100 - ASSISTANT_WIDTH_PERCENT),
            Constraint::Percentage(ASSISTANT_WIDTH_PERCENT),
        ])
        .areas(body);
        render_assistant_pane(frame, side, app, theme);
        main
    } else {
        body
    };

    let problems_height = if app.problems().is_visible() {
        let rows = u16::try_from(app.problems().count().max(1)).unwrap_or(MAX_PROBLEM_ROWS);
        rows.min(MAX_PROBLEM_ROWS) + PANE_TITLE_HEIGHT
    } else {
        0
    };
    let [editor, problems, terminal] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(problems_height),
        Constraint::Percentage(TERMINAL_HEIGHT_PERCENT),
    ])
    .areas(main);

    render_editor_pane(frame, editor, app, theme);
    if problems_height > 0 {
        render_problems_pane(frame, problems, app, theme);
    }
    render_terminal_pane(frame, terminal, app, theme);

    frame.render_widget(
        Paragraph::new(status_line_text(app))
            .style(Style::default().bg(theme.status_bg).fg(theme.active_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.status_bg))
                    .padding(Padding::horizontal(TEXT_PADDING)),
            ),
        status,
    );

    if let Some(overlay) = app.overlay() {
        render_overlay(frame, body, overlay, theme);
    }
}

fn render_tab_bar(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let selector = language_selector_text(app);
    let selector_width = u16::try_from(selector.chars().count()).unwrap_or(area.width);
    let [tabs_area, selector_area] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(selector_width)]).areas(area);

    let inactive_bg = title_bar_bg(theme.tab_bg, false);
    let mut spans = Vec::new();
    for session in app.sessions().sessions() {
        let active = app.sessions().active_id() == Some(session.id());
        let style = if active {
            Style::default()
                .bg(ACTIVE_TITLE_BG)
                .fg(ACTIVE_TITLE_FG)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().bg(inactive_bg).fg(theme.muted_fg)
        };
        let dirty = if session.is_dirty() { " ●" } else { "" };
        spans.push(Span::styled(
            format!(" {} {}{dirty} ", session.language().icon(), session.name()),
            style,
        ));
        spans.push(Span::styled(" ", Style::default().bg(theme.tab_bg)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.tab_bg)),
        tabs_area,
    );
    frame.render_widget(
        Paragraph::new(selector)
            .alignment(Alignment::Right)
            .style(Style::default().bg(inactive_bg).fg(theme.text_fg)),
        selector_area,
    );
}

fn language_selector_text(app: &App) -> String {
    let provider = app.assistant().provider().label();
    match app.sessions().active() {
        Some(session) => format!(" [{} ▾] {provider} ", session.language()),
        None => format!(" {provider} "),
    }
}

fn render_editor_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.editor_bg)),
        area,
    );
    let Some(session) = app.sessions().active() else {
        let hint = if app.sessions().has_pending() {
            LOADING_EDITOR_TEXT
        } else {
            EMPTY_EDITOR_TEXT
        };
        frame.render_widget(
            Paragraph::new(hint)
                .alignment(Alignment::Center)
                .style(Style::default().bg(theme.editor_bg).fg(theme.muted_fg))
                .block(Block::default().padding(Padding::uniform(TEXT_PADDING))),
            area,
        );
        return;
    };
    if area.width < 2 || area.height < 1 {
        return;
    }

    let code = session.code();
    let lines: Vec<&str> = code.split('\n').collect();
    let markers: &[Marker] = if app.problems().source() == Some(session.id()) {
        app.problems().markers()
    } else {
        &[]
    };
    let (caret_line, caret_col) = session.buffer().caret();
    let caret_row = caret_line.saturating_sub(1) as usize;
    let caret_col = caret_col.saturating_sub(1) as usize;

    let gutter_width = lines.len().to_string().len().max(3) + 1;
    let text_width = (area.width as usize).saturating_sub(gutter_width).max(1);
    let height = area.height as usize;
    let top = caret_row.saturating_sub(height.saturating_sub(1));
    let left = caret_col.saturating_sub(text_width.saturating_sub(1));

    let rendered: Vec<Line<'static>> = lines
        .iter()
        .enumerate()
        .skip(top)
        .take(height)
        .map(|(index, line)| {
            let number_style = gutter_style(markers, index + 1, theme);
            let visible: String = line.chars().skip(left).take(text_width).collect();
            Line::from(vec![
                Span::styled(
                    format!("{:>width$} ", index + 1, width = gutter_width - 1),
                    number_style,
                ),
                Span::styled(visible, Style::default().fg(theme.text_fg)),
            ])
        })
        .collect();
    frame.render_widget(
        Paragraph::new(Text::from(rendered)).style(Style::default().bg(theme.editor_bg)),
        area,
    );

    if app.focus == Focus::Editor && app.overlay().is_none() {
        frame.set_cursor_position(clamp_to_area(
            area,
            gutter_width + caret_col - left,
            caret_row - top,
        ));
    }
}

/// Cell at offset (`column`, `row`) inside `area`, pinned to its last cell.
fn clamp_to_area(area: Rect, column: usize, row: usize) -> (u16, u16) {
    let column = u16::try_from(column)
        .unwrap_or(u16::MAX)
        .min(area.width.saturating_sub(1));
    let row = u16::try_from(row)
        .unwrap_or(u16::MAX)
        .min(area.height.saturating_sub(1));
    (area.x + column, area.y + row)
}

fn gutter_style(markers: &[Marker], line: usize, theme: &Theme) -> Style {
    let on_line = |severity| {
        markers
            .iter()
            .any(|marker| marker.line as usize == line && marker.severity == severity)
    };
    if on_line(Severity::Error) {
        Style::default().fg(theme.error_fg)
    } else if on_line(Severity::Warning) {
        Style::default().fg(theme.warning_fg)
    } else {
        Style::default().fg(theme.muted_fg)
    }
}

fn render_problems_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let active = app.focus == Focus::Problems;
    let [title_area, content] = Layout::vertical([
        Constraint::Length(PANE_TITLE_HEIGHT),
        Constraint::Min(0),
    ])
    .areas(area);
    render_pane_title(
        frame,
        title_area,
        &format!("Problems ({})", app.problems().count()),
        theme.terminal_bg,
        active,
        theme,
    );

    let problems = app.problems();
    let selected = problems.selected();
    let visible_rows = content.height as usize;
    let first = (selected + 1).saturating_sub(visible_rows.max(1));
    let lines: Vec<Line<'static>> = problems
        .display_lines()
        .into_iter()
        .enumerate()
        .skip(first)
        .take(visible_rows)
        .map(|(index, text)| {
            let mut style = match problems.markers().get(index).map(|m| m.severity) {
                Some(Severity::Error) => Style::default().fg(theme.error_fg),
                Some(Severity::Warning) => Style::default().fg(theme.warning_fg),
                None => Style::default().fg(theme.muted_fg),
            };
            if active && index == selected && problems.count() > 0 {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(Span::styled(format!(" {text}"), style))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(Text::from(lines)).style(Style::default().bg(theme.terminal_bg)),
        content,
    );
}

fn render_terminal_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let terminal = app.terminal();
    let input_active = app.focus == Focus::TerminalInput;
    let [title_area, output_area, input_area] = Layout::vertical([
        Constraint::Length(PANE_TITLE_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);
    let title = if terminal.input_enabled() {
        "Terminal (running)"
    } else {
        "Terminal"
    };
    render_pane_title(frame, title_area, title, theme.terminal_bg, input_active, theme);

    let lines = wrap_lines(
        transcript_lines(terminal.transcript(), theme),
        output_area.width.saturating_sub(TEXT_PADDING * 2),
    );
    let offset = tail_offset(lines.len(), output_area.height, app.terminal_scroll());
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .scroll((offset, 0))
            .style(Style::default().bg(theme.terminal_bg).fg(theme.text_fg))
            .block(Block::default().padding(Padding::horizontal(TEXT_PADDING))),
        output_area,
    );

    let (prompt, style) = if terminal.input_enabled() {
        (
            format!("> {}", terminal.input().text()),
            Style::default().bg(theme.input_bg).fg(theme.text_fg),
        )
    } else {
        (
            TERMINAL_INPUT_HINT.to_string(),
            Style::default().bg(theme.input_bg).fg(theme.muted_fg),
        )
    };
    frame.render_widget(
        Paragraph::new(prompt)
            .style(style)
            .block(Block::default().padding(Padding::horizontal(TEXT_PADDING))),
        input_area,
    );
    if input_active && terminal.input_enabled() && app.overlay().is_none() {
        place_line_cursor(frame, input_area, 2 + terminal.input().cursor());
    }
}

fn render_assistant_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let assistant = app.assistant();
    let active = app.focus == Focus::AiInput;
    let [title_area, messages_area, input_area] = Layout::vertical([
        Constraint::Length(PANE_TITLE_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);
    render_pane_title(
        frame,
        title_area,
        &format!("AI Assistant ({})", assistant.provider().label()),
        theme.ai_bg,
        active,
        theme,
    );

    let mut lines = Vec::new();
    for turn in assistant.turns() {
        lines.extend(turn_lines(turn, app.ticks, theme));
        lines.push(Line::default());
    }
    let lines = wrap_lines(lines, messages_area.width.saturating_sub(TEXT_PADDING * 2));
    let offset = tail_offset(lines.len(), messages_area.height, app.assistant_scroll());
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .scroll((offset, 0))
            .style(Style::default().bg(theme.ai_bg).fg(theme.text_fg))
            .block(Block::default().padding(Padding::horizontal(TEXT_PADDING))),
        messages_area,
    );

    frame.render_widget(
        Paragraph::new(format!("Ask: {}", assistant.input().text()))
            .style(Style::default().bg(theme.input_bg).fg(theme.text_fg))
            .block(Block::default().padding(Padding::horizontal(TEXT_PADDING))),
        input_area,
    );
    if active && app.overlay().is_none() {
        place_line_cursor(frame, input_area, 5 + assistant.input().cursor());
    }
}

fn render_pane_title(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    base: Color,
    active: bool,
    theme: &Theme,
) {
    let bg = title_bar_bg(base, active);
    let fg = if active {
        ACTIVE_TITLE_FG
    } else {
        theme.muted_fg
    };
    frame.render_widget(
        Paragraph::new(title.to_string())
            .style(Style::default().bg(bg).fg(fg))
            .block(Block::default().padding(Padding::horizontal(TEXT_PADDING))),
        area,
    );
}

fn place_line_cursor(frame: &mut Frame, area: Rect, column: usize) {
    let inner_width = area.width.saturating_sub(TEXT_PADDING * 2);
    if inner_width == 0 {
        return;
    }
    let column = u16::try_from(column).unwrap_or(u16::MAX);
    frame.set_cursor_position((
        area.x + TEXT_PADDING + column.min(inner_width - 1),
        area.y,
    ));
}

fn status_line_text(app: &App) -> String {
    let mut parts = Vec::new();
    if let Some(session) = app.sessions().active() {
        let (line, column) = session.buffer().caret();
        parts.push(format!("Ln {line}, Col {column}"));
    }
    parts.push(connection_label(app.terminal().connection()));
    let assistant = app.assistant();
    if assistant.is_busy() {
        parts.push(format!(
            "{} {}",
            assistant.provider().label(),
            busy_dots(app.ticks)
        ));
    } else {
        parts.push(assistant.provider().label().to_string());
    }
    parts.push(STATUS_HELP_TEXT.to_string());
    parts.join(" | ")
}

fn connection_label(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Connecting => "Connecting...".to_string(),
        ConnectionState::Connected => "Connected".to_string(),
        ConnectionState::Disconnected(reason) => format!("Disconnected: {reason}"),
    }
}

fn busy_dots(ticks: u64) -> &'static str {
    const FRAMES: [&str; 6] = ["[   ]", "[.  ]", "[.. ]", "[...]", "[ ..]", "[  .]"];
    FRAMES[((ticks / 2) as usize) % FRAMES.len()]
}

fn render_overlay(frame: &mut Frame, area: Rect, overlay: &Overlay, theme: &Theme) {
    match overlay {
        Overlay::Alert(message) => render_dialog(
            frame,
            area,
            vec![
                Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(theme.warning_fg),
                )),
                Line::from(Span::styled("[Enter] OK", Style::default().fg(theme.muted_fg))),
            ],
            None,
            theme,
        ),
        Overlay::ConfirmClose { name, .. } => render_dialog(
            frame,
            area,
            vec![
                Line::from(format!("Close {name}? Unsaved changes will be lost.")),
                Line::from(Span::styled(
                    "[y] Yes  [n] No",
                    Style::default().fg(theme.muted_fg),
                )),
            ],
            None,
            theme,
        ),
        Overlay::Rename { input, .. } => render_dialog(
            frame,
            area,
            vec![
                Line::from(Span::styled("Rename tab", Style::default().fg(theme.muted_fg))),
                Line::from(input.text().to_string()),
            ],
            Some((1, input.cursor())),
            theme,
        ),
    }
}

fn render_dialog(
    frame: &mut Frame,
    area: Rect,
    lines: Vec<Line<'static>>,
    cursor: Option<(u16, usize)>,
    theme: &Theme,
) {
    let width = DIALOG_WIDTH.min(area.width.saturating_sub(2)).max(20);
    let text_width = width.saturating_sub(TEXT_PADDING * 2);
    let lines = wrap_lines(lines, text_width);
    let body_height = u16::try_from(lines.len()).unwrap_or(area.height);
    let height = body_height
        .saturating_add(TEXT_PADDING * 2)
        .min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let dialog = Rect::new(x, y, width.min(area.width), height);
    frame.render_widget(Clear, dialog);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .style(Style::default().fg(theme.active_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(Color::Rgb(20, 20, 20)))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        dialog,
    );
    if let Some((row, column)) = cursor {
        let inner = dialog.inner(Margin {
            horizontal: TEXT_PADDING,
            vertical: TEXT_PADDING,
        });
        if inner.width > 0 && row < inner.height {
            let text_len = u16::try_from(column).unwrap_or(inner.width);
            let start = inner.x + inner.width.saturating_sub(text_len) / 2;
            frame.set_cursor_position((
                (start + text_len).min(inner.right().saturating_sub(1)),
                inner.y + row,
            ));
        }
    }
}

/// Splits the styled transcript into display lines at embedded newlines.
fn transcript_lines(spans: &[StyledSpan], theme: &Theme) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for span in spans {
        let style = span_style(span.class, theme);
        let mut parts = span.text.split('\n').peekable();
        while let Some(part) = parts.next() {
            let part = part.trim_end_matches('\r');
            if !part.is_empty() {
                current.push(Span::styled(part.to_string(), style));
            }
            if parts.peek().is_some() {
                lines.push(Line::from(mem::take(&mut current)));
            }
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

fn span_style(class: SpanClass, theme: &Theme) -> Style {
    match class {
        SpanClass::Plain => Style::default().fg(theme.text_fg),
        SpanClass::Banner => Style::default()
            .fg(theme.muted_fg)
            .add_modifier(Modifier::BOLD),
        SpanClass::Echo => Style::default()
            .fg(theme.active_fg)
            .add_modifier(Modifier::ITALIC),
        SpanClass::Error => Style::default()
            .fg(theme.error_fg)
            .add_modifier(Modifier::BOLD),
        SpanClass::Warning => Style::default().fg(theme.warning_fg),
        SpanClass::Location => Style::default()
            .fg(theme.location_fg)
            .add_modifier(Modifier::UNDERLINED),
        SpanClass::Success => Style::default()
            .fg(theme.success_fg)
            .add_modifier(Modifier::BOLD),
    }
}

fn turn_lines(turn: &Turn, ticks: u64, theme: &Theme) -> Vec<Line<'static>> {
    let (label, label_style) = match turn.role {
        Role::User => ("You:", Style::default().fg(Color::Rgb(80, 190, 100))),
        Role::Assistant => ("AI:", Style::default().fg(Color::Rgb(230, 150, 60))),
    };
    let header = |body: Vec<Span<'static>>| {
        let mut spans = vec![Span::styled(label, label_style), Span::raw(" ")];
        spans.extend(body);
        Line::from(spans)
    };

    match turn.kind {
        TurnKind::Working(_) => vec![header(vec![Span::styled(
            format!("{} {}", turn.content, busy_dots(ticks)),
            Style::default()
                .fg(theme.muted_fg)
                .add_modifier(Modifier::DIM),
        )])],
        TurnKind::Error => vec![header(vec![Span::styled(
            turn.content.clone(),
            Style::default().fg(theme.error_fg),
        )])],
        TurnKind::Message if turn.role == Role::User => {
            let mut lines = Vec::new();
            for (index, text) in turn.content.split('\n').enumerate() {
                let body = Span::raw(text.to_string());
                if index == 0 {
                    lines.push(header(vec![body]));
                } else {
                    lines.push(Line::from(body));
                }
            }
            lines
        }
        TurnKind::Message => {
            let mut lines = vec![header(Vec::new())];
            lines.extend(fragment_lines(&format_response(&turn.content), theme));
            lines
        }
    }
}

fn fragment_lines(fragments: &[Fragment], theme: &Theme) -> Vec<Line<'static>> {
    let frame_style = Style::default().fg(theme.muted_fg);
    let code_style = Style::default().fg(theme.code_fg);
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for fragment in fragments {
        match fragment {
            Fragment::Text(text) => current.push(Span::raw(text.clone())),
            Fragment::InlineCode(code) => {
                current.push(Span::styled(code.clone(), code_style.bg(theme.input_bg)))
            }
            Fragment::LineBreak => lines.push(Line::from(mem::take(&mut current))),
            Fragment::CodeBlock { language, code } => {
                if !current.is_empty() {
                    lines.push(Line::from(mem::take(&mut current)));
                }
                let label = language.as_deref().unwrap_or("code");
                lines.push(Line::from(Span::styled(format!("┌─ {label}"), frame_style)));
                for code_line in code.trim_end_matches('\n').split('\n') {
                    lines.push(Line::from(vec![
                        Span::styled("│ ", frame_style),
                        Span::styled(code_line.to_string(), code_style),
                    ]));
                }
                lines.push(Line::from(Span::styled("└─", frame_style)));
            }
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

/// Hard-wraps styled lines at `width` characters, keeping span styles.
fn wrap_lines(lines: Vec<Line<'static>>, width: u16) -> Vec<Line<'static>> {
    let width = usize::from(width.max(1));
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let mut current: Vec<Span<'static>> = Vec::new();
        let mut used = 0;
        for span in line.spans {
            let mut chunk = String::new();
            for ch in span.content.chars() {
                if used == width {
                    if !chunk.is_empty() {
                        current.push(Span::styled(mem::take(&mut chunk), span.style));
                    }
                    out.push(Line::from(mem::take(&mut current)));
                    used = 0;
                }
                chunk.push(ch);
                used += 1;
            }
            if !chunk.is_empty() {
                current.push(Span::styled(chunk, span.style));
            }
        }
        out.push(Line::from(current));
    }
    out
}

/// Scroll offset that pins the view to the bottom, moved up by `scroll_back`.
fn tail_offset(total_lines: usize, visible: u16, scroll_back: u16) -> u16 {
    let max = u16::try_from(total_lines.saturating_sub(usize::from(visible))).unwrap_or(u16::MAX);
    max.saturating_sub(scroll_back)
}

fn title_bar_bg(base: Color, active: bool) -> Color {
    if active {
        return ACTIVE_TITLE_BG;
    }
    match base {
        Color::Rgb(r, g, b) => {
            let delta = -12;
            Color::Rgb(
                adjust_channel(r, delta),
                adjust_channel(g, delta),
                adjust_channel(b, delta),
            )
        }
        _ => base,
    }
}

fn adjust_channel(channel: u8, delta: i16) -> u8 {
    let value = channel as i16 + delta;
    value.clamp(0, 255) as u8
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
