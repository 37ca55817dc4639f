//! Input line
//!
//! Displays the composer with cursor, or the pending confirmation.

use parley_app::App;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

const PROMPT_WIDTH: u16 = 3; // "> "
const INPUT_LINE_OFFSET_Y: u16 = 1; // inside top border
const RIGHT_PADDING: u16 = 1; // inside right border

/// Render the input line.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    if app.confirmation().is_some() {
        let block = Block::default().borders(Borders::ALL).title(" Confirm ");
        frame.render_widget(Paragraph::new(input_line(app)).block(block), area);
        return;
    }

    let block = Block::default().borders(Borders::ALL).title(" Message ");
    let paragraph =
        Paragraph::new(input_line(app)).style(Style::default().fg(Color::White)).block(block);
    frame.render_widget(paragraph, area);

    let available_width = area.width.saturating_sub(PROMPT_WIDTH + RIGHT_PADDING);
    let cursor_offset = (app.composer().cursor() as u16).min(available_width);

    let cursor_x = area.x.saturating_add(PROMPT_WIDTH).saturating_add(cursor_offset);
    let cursor_y = area.y.saturating_add(INPUT_LINE_OFFSET_Y);
    let max_x = area.x.saturating_add(area.width).saturating_sub(RIGHT_PADDING);
    let cursor_x = cursor_x.min(max_x);

    frame.set_cursor_position((cursor_x, cursor_y));
}

/// Confirmation question, composer text, or a hint when empty.
pub fn input_line(app: &App) -> Line<'static> {
    if let Some(confirmation) = app.confirmation() {
        return Line::from(Span::styled(
            confirmation.prompt(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    let composer = app.composer();
    if composer.is_empty() {
        return Line::from(vec![
            Span::raw("> "),
            Span::styled("Type a message, /help for commands", Style::default().fg(Color::DarkGray)),
        ]);
    }
    Line::from(format!("> {}", composer.text()))
}

#[cfg(test)]
mod tests {
    use parley_app::{AppEvent, KeyInput, Page};

    use super::*;
    use crate::ui::testing::plain;

    fn chat_app() -> App {
        let mut app = App::new("http://localhost:5000".into());
        for c in "alice".chars() {
            app.handle(AppEvent::Key(KeyInput::Char(c)));
        }
        app.handle(AppEvent::Key(KeyInput::Tab));
        for c in "abcd".chars() {
            app.handle(AppEvent::Key(KeyInput::Char(c)));
        }
        app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(app.page(), &Page::Chat);
        app
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle(AppEvent::Key(KeyInput::Char(c)));
        }
    }

    #[test]
    fn empty_composer_shows_hint() {
        let app = chat_app();
        assert_eq!(plain(&[input_line(&app)]), "> Type a message, /help for commands");
    }

    #[test]
    fn composer_text() {
        let mut app = chat_app();
        type_text(&mut app, "hello there");
        assert_eq!(plain(&[input_line(&app)]), "> hello there");
    }

    #[test]
    fn confirmation_replaces_composer() {
        let mut app = chat_app();
        type_text(&mut app, "/kick bob");
        app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(plain(&[input_line(&app)]), "Remove bob from the room? (y/n)");
    }
}
