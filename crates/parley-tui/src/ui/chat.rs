//! Chat area
//!
//! Displays the room's messages grouped by day, uploads in flight, and who
//! is typing.

use parley_app::{App, SessionView, present};
use parley_client::UploadState;
use parley_proto::{MessageKind, MessageRecord};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List},
};

const BORDER_SIZE: u16 = 2;

/// Render the chat area.
pub fn render(frame: &mut Frame, app: &App, session: &dyn SessionView, area: Rect) {
    let mut block = Block::default().borders(Borders::ALL).title(room_title(session));
    if let Some(typing) = present::typing_text(&session.typing()) {
        block = block.title_bottom(Span::styled(
            format!(" {typing} "),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ));
    }

    let lines = message_lines(session);
    let visible_height = area.height.saturating_sub(BORDER_SIZE) as usize;
    let end = lines.len().saturating_sub(app.scroll()).max(visible_height.min(lines.len()));
    let start = end.saturating_sub(visible_height);
    let visible: Vec<_> = lines.into_iter().take(end).skip(start).collect();

    frame.render_widget(List::new(visible).block(block), area);
}

/// Block title: room code and retention.
pub fn room_title(view: &dyn SessionView) -> String {
    match view.metadata() {
        Some(meta) if meta.is_persistent => match meta.persistence_days {
            Some(days) => format!(" Room {} · kept {days} days ", view.room_code()),
            None => format!(" Room {} · persistent ", view.room_code()),
        },
        _ => format!(" Room {} ", view.room_code()),
    }
}

/// Every line of the conversation, oldest first.
pub fn message_lines(view: &dyn SessionView) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);

    if !view.is_loaded() {
        return vec![Line::from(Span::styled("Loading messages...", dim))];
    }

    let mut lines = Vec::new();
    if view.messages().is_empty() {
        lines.push(Line::from(Span::styled("No messages yet", dim)));
    }

    let mut day = None;
    for message in view.messages() {
        let today = present::day_number(message.timestamp);
        if day != Some(today) {
            day = Some(today);
            lines.push(Line::from(Span::styled(
                format!("--- {} ---", present::day_label(message.timestamp)),
                dim,
            )));
        }
        lines.push(message_line(view, message));
    }

    for upload in view.uploads() {
        let text = match upload.state {
            UploadState::Queued => format!("Waiting to upload {}...", upload.filename),
            UploadState::RequestingSlot | UploadState::Transferring => {
                format!("Uploading {}... {}%", upload.filename, upload.progress)
            },
            UploadState::Completed | UploadState::Failed => continue,
        };
        lines.push(Line::from(Span::styled(text, Style::default().fg(Color::Cyan))));
    }
    lines
}

fn message_line(view: &dyn SessionView, message: &MessageRecord) -> Line<'static> {
    let time = Span::styled(
        format!("{} ", present::clock(message.timestamp)),
        Style::default().fg(Color::DarkGray),
    );
    let author = present::author_label(view, message);

    match message.kind {
        MessageKind::System => Line::from(vec![
            time,
            Span::styled(
                format!("{author}: {}", message.content),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ),
        ]),
        MessageKind::User => Line::from(vec![
            time,
            Span::styled(format!("{author}:"), author_style(view, message)),
            Span::raw(format!(" {}", message.content)),
        ]),
        MessageKind::File => {
            let file = message.file.as_ref().map_or_else(
                || message.content.clone(),
                |f| format!("{} ({})", f.name, present::file_size(f.size)),
            );
            let mut spans = vec![
                time,
                Span::styled(format!("{author}:"), author_style(view, message)),
                Span::styled(format!(" [file] {file}"), Style::default().fg(Color::Cyan)),
            ];
            if view.can_delete(message) {
                spans.push(Span::styled(" (yours)", Style::default().fg(Color::DarkGray)));
            }
            Line::from(spans)
        },
    }
}

fn author_style(view: &dyn SessionView, message: &MessageRecord) -> Style {
    let color = if view.is_own(message) { Color::Yellow } else { Color::Green };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}
