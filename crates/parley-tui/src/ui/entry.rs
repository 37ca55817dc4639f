//! Entry page
//!
//! Name and room form, validation error, and any notices left over from a
//! session that just ended.

use parley_app::{App, EntryField, LineEditor};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::status;

const FORM_WIDTH: u16 = 50;
const FORM_HEIGHT: u16 = 10;
const LABEL_WIDTH: usize = 14;

/// Render the entry page centered in `area`.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let notices = status::notice_lines(app);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(FORM_HEIGHT),
            Constraint::Length(notices.len() as u16),
            Constraint::Min(0),
        ])
        .split(area);
    let [_, form_row, notice_row, _] = rows.as_ref() else {
        return;
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(FORM_WIDTH), Constraint::Min(0)])
        .split(*form_row);
    let [_, form_area, _] = columns.as_ref() else {
        return;
    };

    let block = Block::default().borders(Borders::ALL).title(" Parley ");
    let paragraph = Paragraph::new(form_lines(app)).block(block);
    frame.render_widget(paragraph, *form_area);

    status::render_notices(frame, notices, *notice_row);

    // Cursor inside the focused field, below the border and heading
    let form = app.entry();
    let (editor, row) = match form.focus {
        EntryField::Name => (&form.name, 2),
        EntryField::Room => (&form.room, 3),
    };
    let x = form_area.x + 1 + (LABEL_WIDTH + 2) as u16 + editor.cursor() as u16;
    let max_x = form_area.x + form_area.width.saturating_sub(2);
    frame.set_cursor_position((x.min(max_x), form_area.y + row));
}

/// Text of the form.
pub fn form_lines(app: &App) -> Vec<Line<'static>> {
    let form = app.entry();

    let mut lines = vec![
        Line::from(Span::styled(
            "Join a room",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        field_line("Display name", &form.name, form.focus == EntryField::Name),
        field_line("Room code", &form.room, form.focus == EntryField::Room),
        Line::default(),
    ];

    match &form.error {
        Some(error) => {
            lines.push(Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))));
        },
        None => lines.push(Line::default()),
    }

    lines.push(Line::from(Span::styled(
        "Tab switch field · Enter join · Esc quit",
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(Span::styled(
        format!("Server: {}", app.server_url()),
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

fn field_line(label: &str, editor: &LineEditor, focused: bool) -> Line<'static> {
    let marker = if focused { ">" } else { " " };
    let style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{marker} {label:<LABEL_WIDTH$}"), style),
        Span::raw(editor.text().to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use parley_app::{AppEvent, KeyInput};

    use super::*;
    use crate::ui::testing::plain;

    fn typed(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle(AppEvent::Key(KeyInput::Char(c)));
        }
    }

    #[test]
    fn empty_form() {
        let app = App::new("http://localhost:5000".into());
        assert_snapshot!(plain(&form_lines(&app)), @r"
        Join a room
        > Display name
          Room code


        Tab switch field · Enter join · Esc quit
        Server: http://localhost:5000
        ");
    }

    #[test]
    fn validation_error_is_shown() {
        let mut app = App::new("http://localhost:5000".into());
        typed(&mut app, "alice");
        app.handle(AppEvent::Key(KeyInput::Tab));
        app.handle(AppEvent::Key(KeyInput::Enter));

        let text = plain(&form_lines(&app));
        assert!(text.contains("  Display name  alice"));
        assert!(text.contains("> Room code"));
        assert!(app.entry().error.as_ref().is_some_and(|e| text.contains(e.as_str())));
    }
}
