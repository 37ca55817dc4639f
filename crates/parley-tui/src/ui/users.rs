//! Users sidebar
//!
//! Displays who is online, the local role, and room retention.

use parley_app::{SessionView, present};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List},
};

/// Render the users sidebar.
pub fn render(frame: &mut Frame, session: &dyn SessionView, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Users ");
    frame.render_widget(List::new(user_lines(session)).block(block), area);
}

/// Presence header, one line per participant, then the local role.
pub fn user_lines(view: &dyn SessionView) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![Line::from(Span::styled(present::presence_text(view.users().len()), dim))];
    for name in view.users() {
        let style = if view.identity().is(name) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(present::user_label(view, name), style)));
    }

    lines.push(Line::default());
    lines.push(Line::from(vec![Span::styled("Role: ", dim), Span::raw(view.role().to_string())]));
    if view.permissions().can_kick() {
        lines.push(Line::from(Span::styled("/kick /role available", dim)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::ui::testing::{alice, bob, chatting, plain};

    #[test]
    fn leader_sees_moderation_hint() {
        let world = chatting();
        assert_snapshot!(plain(&user_lines(alice(&world))), @r"
        2 users online
        alice (You)
        bob

        Role: Leader
        /kick /role available
        ");
    }

    #[test]
    fn member_marks_self() {
        let world = chatting();
        assert_snapshot!(plain(&user_lines(bob(&world))), @r"
        2 users online
        alice
        bob (You)

        Role: Member
        ");
    }
}
