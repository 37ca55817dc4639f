//! UI rendering
//!
//! Rendering functions that convert App and session state into terminal
//! output using ratatui widgets. All functions are pure (no I/O). Each panel
//! builds its text through a `*_lines` helper so the wording can be checked
//! without a terminal.

mod chat;
mod entry;
mod input;
mod status;
mod users;

use parley_app::{App, Page, SessionView};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
};

/// Render the entire UI.
pub fn render(frame: &mut Frame, app: &App, session: Option<&dyn SessionView>) {
    match (app.page(), session) {
        (Page::Chat, Some(session)) => render_chat_page(frame, app, session),
        _ => entry::render(frame, app, frame.area()),
    }
}

/// Chat page: conversation and users, notices, composer, status bar.
fn render_chat_page(frame: &mut Frame, app: &App, session: &dyn SessionView) {
    const MAIN_AREA_MIN_HEIGHT: u16 = 3;
    const INPUT_HEIGHT: u16 = 3;
    const STATUS_HEIGHT: u16 = 1;

    let notices = status::notice_lines(app);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(MAIN_AREA_MIN_HEIGHT),
            Constraint::Length(notices.len() as u16),
            Constraint::Length(INPUT_HEIGHT),
            Constraint::Length(STATUS_HEIGHT),
        ])
        .split(frame.area());

    let [main_area, notice_area, input_area, status_area] = chunks.as_ref() else {
        return;
    };

    render_main_area(frame, app, session, *main_area);
    status::render_notices(frame, notices, *notice_area);
    input::render(frame, app, *input_area);
    status::render(frame, app, session, *status_area);
}

/// Render the main area (chat + users sidebar).
fn render_main_area(frame: &mut Frame, app: &App, session: &dyn SessionView, area: Rect) {
    const USERS_SIDEBAR_WIDTH: u16 = 24;
    const CHAT_AREA_MIN_WIDTH: u16 = 20;

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(CHAT_AREA_MIN_WIDTH), Constraint::Length(USERS_SIDEBAR_WIDTH)])
        .split(area);

    let [chat_area, users_area] = chunks.as_ref() else {
        return;
    };

    chat::render(frame, app, session, *chat_area);
    users::render(frame, session, *users_area);
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for checking rendered text.

    use parley_client::{Client, ClientEvent};
    use parley_harness::{SimEnv, SimWorld};
    use ratatui::text::Line;

    /// Lines as plain text, one per row, trailing padding removed.
    pub fn plain(lines: &[Line<'_>]) -> String {
        lines
            .iter()
            .map(|line| {
                let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
                text.trim_end().to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Alice and bob in ABCD; alice said hi.
    #[allow(clippy::unwrap_used)]
    pub fn chatting() -> SimWorld {
        let mut world = SimWorld::new("abcd").unwrap();
        let alice = world.add_client("alice").unwrap();
        let bob = world.add_client("bob").unwrap();
        world.join(alice).unwrap();
        world.join(bob).unwrap();
        world.handle(alice, ClientEvent::SendMessage("hi".into())).unwrap();
        world.settle();
        world
    }

    /// Alice's session.
    pub fn alice(world: &SimWorld) -> &Client<SimEnv> {
        world.client(0)
    }

    /// Bob's session.
    pub fn bob(world: &SimWorld) -> &Client<SimEnv> {
        world.client(1)
    }
}
