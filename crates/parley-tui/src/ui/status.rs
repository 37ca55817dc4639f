//! Status bar and notices
//!
//! Displays connection status, room, role, and transient notifications.

use parley_app::{App, SessionView, present};
use parley_client::{ConnectionState, FailureReason, NoticeLevel};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

/// Render the status bar.
pub fn render(frame: &mut Frame, app: &App, session: &dyn SessionView, area: Rect) {
    let paragraph = Paragraph::new(status_line(app, session))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(paragraph, area);
}

/// Connection status followed by room and role.
pub fn status_line(app: &App, view: &dyn SessionView) -> Line<'static> {
    let state = view.connection_state();
    let color = match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting | ConnectionState::Reconnecting => Color::Yellow,
        ConnectionState::Disconnected | ConnectionState::Failed => Color::Red,
    };

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(
            present::status_text(view, app.server_url()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if state == ConnectionState::Failed && view.failure() != Some(FailureReason::ServerForced) {
        spans.push(Span::raw(" Type /retry to try again."));
    }
    spans.push(Span::raw(format!(" | Room: {} | {}", view.room_code(), view.role())));
    Line::from(spans)
}

/// One line per visible notification, oldest first.
pub fn notice_lines(app: &App) -> Vec<Line<'static>> {
    app.notifications()
        .map(|notice| {
            let color = match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(notice.message.clone(), Style::default().fg(color)))
        })
        .collect()
}

/// Render notification lines into `area`.
pub fn render_notices(frame: &mut Frame, lines: Vec<Line<'static>>, area: Rect) {
    if !lines.is_empty() {
        frame.render_widget(Paragraph::new(lines), area);
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::ui::testing::{alice, chatting, plain};

    #[test]
    fn connected_status() {
        let world = chatting();
        let app = App::new("http://localhost:5000".into());
        let line = status_line(&app, alice(&world));
        let text = plain(&[line]);
        assert!(text.starts_with(" Connected to: http://localhost:5000"));
        assert!(text.ends_with(" | Room: ABCD | Leader"));
    }

    #[test]
    fn notices_keep_order() {
        let mut app = App::new("http://localhost:5000".into());
        app.notify(NoticeLevel::Info, "Saved notes.txt");
        app.notify(NoticeLevel::Error, "Export failed: http error");
        assert_snapshot!(plain(&notice_lines(&app)), @r"
        Saved notes.txt
        Export failed: http error
        ");
    }
}
