use crate::app::{SidePanel, TuiMode};
use crate::state::conversation::STREAM_FAILURE_MARKER;
use crate::state::ChatSession;
use crate::types::{ChatMessage, PreferenceProposal, Role};
use crate::ui::input_metrics::{cursor_row_col, truncate_with_ellipsis, wrap_to_width};
use crate::ui::layout::{split_chat_layout, LayoutRequest};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const NOTICE_ROWS: u16 = 3;
const BANNER_ROWS: u16 = 4;
const MAX_INPUT_ROWS: usize = 6;

/// Draws one full frame: header, transcript, optional side panel and
/// proposal banner, recent notices, then the input box.
pub fn draw_chat(frame: &mut Frame<'_>, mode: &TuiMode, session: &ChatSession, input: &str, cursor: usize) {
    let area = frame.area();
    frame.render_widget(Clear, area);

    let input_width = area.width.saturating_sub(2).max(1) as usize;
    let input_rows = wrap_to_width(input, input_width).len().clamp(1, MAX_INPUT_ROWS) as u16;
    let banner = proposal_banner(session);
    let layout = split_chat_layout(
        area,
        LayoutRequest {
            input_rows,
            banner_rows: if banner.is_some() { BANNER_ROWS } else { 0 },
            notice_rows: NOTICE_ROWS,
        },
    );

    render_header(frame, layout.header, &mode.status_line(session));
    render_transcript(frame, layout.transcript, session, mode.scroll_offset_from_bottom());
    if let Some(side) = layout.side_panel {
        render_side_panel(frame, side, mode.side_panel(), session);
    }
    if let (Some(area), Some(proposal)) = (layout.banner, banner) {
        render_proposal_banner(frame, area, proposal);
    }
    render_notices(frame, layout.notices, mode.notices());
    render_input(frame, layout.input, input, cursor);
}

/// The proposal to put in front of the user. Hidden while a reply streams.
pub fn proposal_banner(session: &ChatSession) -> Option<&PreferenceProposal> {
    if session.is_streaming() {
        return None;
    }
    session.pending_proposal()
}

pub fn render_header(frame: &mut Frame<'_>, area: Rect, status: &str) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let text = truncate_with_ellipsis(status, area.width as usize);
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn message_heading(message: &ChatMessage, streaming: bool) -> Line<'static> {
    let (label, color) = match message.role {
        Role::User => ("you", Color::Cyan),
        Role::Assistant => ("assistant", Color::Green),
    };
    let mut spans = vec![Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    let tag = match message.id {
        Some(id) => format!(" #{id}"),
        None if streaming => " (streaming)".to_string(),
        None => " (unsaved)".to_string(),
    };
    spans.push(Span::styled(tag, Style::default().fg(Color::DarkGray)));
    if let Some(target) = message.corrects_message_id {
        spans.push(Span::styled(
            format!(" regenerates #{target}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

/// Transcript as pre-wrapped rows so scrolling can be measured from the
/// bottom.
pub fn transcript_rows(session: &ChatSession, width: usize) -> Vec<Line<'static>> {
    let streaming_slot = session.streaming_slot();
    let mut rows = Vec::new();

    for (index, message) in session.messages().iter().enumerate() {
        let streaming = streaming_slot == Some(index);
        if !rows.is_empty() {
            rows.push(Line::default());
        }
        rows.push(message_heading(message, streaming));

        if streaming && message.content.is_empty() {
            rows.push(Line::styled(
                "...",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
            ));
            continue;
        }
        let style = if message.content == STREAM_FAILURE_MARKER {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::White)
        };
        for row in wrap_to_width(&message.content, width) {
            rows.push(Line::styled(row, style));
        }
    }
    rows
}

pub fn render_transcript(frame: &mut Frame<'_>, area: Rect, session: &ChatSession, offset_from_bottom: usize) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    if session.active_conversation_id().is_none() {
        frame.render_widget(
            Paragraph::new("Connecting to backend...").style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    }

    let rows = transcript_rows(session, area.width as usize);
    let visible = area.height as usize;
    let max_offset = rows.len().saturating_sub(visible);
    let start = max_offset - offset_from_bottom.min(max_offset);
    let window: Vec<Line<'static>> = rows.into_iter().skip(start).take(visible).collect();
    frame.render_widget(Paragraph::new(window), area);
}

pub fn render_proposal_banner(frame: &mut Frame<'_>, area: Rect, proposal: &PreferenceProposal) {
    if area.height == 0 || area.width <= 2 {
        return;
    }
    let block = Block::default()
        .borders(Borders::TOP)
        .title(format!("Preference proposal #{}", proposal.id))
        .style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(proposal.proposal_text.clone()),
        Line::styled(
            format!("{} = {}    /approve  /reject", proposal.key, proposal.value),
            Style::default().fg(Color::Gray),
        ),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn preference_lines(session: &ChatSession) -> Vec<Line<'static>> {
    let Some(snapshot) = session.preferences() else {
        return vec![Line::styled(
            "preferences unavailable",
            Style::default().fg(Color::DarkGray),
        )];
    };

    let mut lines = vec![Line::styled(
        format!("scope: {}", snapshot.scope),
        Style::default().fg(Color::DarkGray),
    )];
    if let Some(reset) = &snapshot.reset {
        lines.push(Line::styled(
            format!("reset at {}", reset.created_at),
            Style::default().fg(Color::DarkGray),
        ));
    }
    let effective = snapshot.effective();
    if effective.is_empty() {
        lines.push(Line::from("(baseline, nothing learned yet)"));
    }
    for (key, value) in effective {
        lines.push(Line::from(format!("{key} = {value}")));
    }
    lines
}

fn tool_lines(session: &ChatSession) -> Vec<Line<'static>> {
    let gate = session.tool_gate();
    let selected = gate.selected_tool().map(|tool| tool.tool_id.as_str());
    let mut lines = Vec::new();

    if gate.catalog().is_empty() {
        lines.push(Line::styled("no tools loaded", Style::default().fg(Color::DarkGray)));
    }
    for tool in gate.catalog() {
        let marker = if selected == Some(tool.tool_id.as_str()) { "> " } else { "  " };
        let guard = if tool.requires_confirmation { " [confirm]" } else { "" };
        lines.push(Line::from(format!("{marker}{}{guard}", tool.tool_id)));
    }

    if selected.is_some() {
        lines.push(Line::default());
        let cause = gate
            .causal_message_id()
            .map(|id| format!("#{id}"))
            .unwrap_or_else(|| "none (/cause <id>)".to_string());
        lines.push(Line::from(format!("cause: {cause}")));
        lines.push(Line::from(format!(
            "confirmed: {}",
            if gate.is_confirmed() { "yes" } else { "no" }
        )));
        let input = if gate.input_text().trim().is_empty() {
            "{}"
        } else {
            gate.input_text()
        };
        lines.push(Line::from(format!("input: {input}")));
    }

    if gate.is_running() {
        lines.push(Line::styled("running...", Style::default().fg(Color::Yellow)));
    } else if let Some(error) = gate.error() {
        lines.push(Line::styled(format!("error: {error}"), Style::default().fg(Color::Red)));
    } else if let Some(result) = gate.last_result() {
        let (label, color) = if result.success {
            ("ok", Color::Green)
        } else {
            ("failed", Color::Red)
        };
        lines.push(Line::styled(format!("result: {label}"), Style::default().fg(color)));
        if let Some(output) = &result.output {
            lines.push(Line::from(output.to_string()));
        }
        if let Some(error) = &result.error {
            lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
        }
    }
    lines
}

pub fn render_side_panel(frame: &mut Frame<'_>, area: Rect, panel: SidePanel, session: &ChatSession) {
    if area.height == 0 || area.width <= 2 {
        return;
    }
    let (title, lines) = match panel {
        SidePanel::Preferences => ("Preferences", preference_lines(session)),
        SidePanel::Tools => ("Tools", tool_lines(session)),
    };
    let block = Block::default()
        .borders(Borders::LEFT)
        .title(title)
        .style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

pub fn render_notices(frame: &mut Frame<'_>, area: Rect, notices: &[String]) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let width = area.width as usize;
    let skip = notices.len().saturating_sub(area.height as usize);
    let lines: Vec<Line<'static>> = notices[skip..]
        .iter()
        .map(|notice| {
            let color = if notice.starts_with("[error]") {
                Color::Red
            } else {
                Color::Yellow
            };
            Line::styled(truncate_with_ellipsis(notice, width), Style::default().fg(color))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

pub fn render_input(frame: &mut Frame<'_>, area: Rect, input: &str, cursor_byte: usize) {
    if area.height == 0 || area.width <= 2 {
        return;
    }
    let width = area.width.saturating_sub(2).max(1) as usize;
    let rows = wrap_to_width(input, width);
    let (cursor_row, cursor_col) = cursor_row_col(input, cursor_byte, width);
    let visible = area.height as usize;
    let first = (cursor_row + 1).saturating_sub(visible);

    let lines: Vec<Line<'static>> = (first..first + visible)
        .map(|index| {
            let prefix = if index == 0 { "> " } else { "  " };
            let row = rows.get(index).map(String::as_str).unwrap_or("");
            Line::from(format!("{prefix}{row}"))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().fg(Color::Gray).bg(Color::Rgb(24, 24, 24))),
        area,
    );

    let x = (area.x + 2 + cursor_col as u16).min(area.x + area.width - 1);
    let y = area.y + (cursor_row - first) as u16;
    frame.set_cursor_position((x, y));
}
