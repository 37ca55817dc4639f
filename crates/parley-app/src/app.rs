//! Application state machine.
//!
//! This module defines the [`App`] state machine, which manages the interactive
//! state of the application completely decoupled from I/O and protocol
//! mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Entry form editing and validation.
//! - The chat composer, slash commands, and destructive-action confirmations.
//! - Transient notifications and the last observed connection state.
//! - Terminal dimensions and scrollback offset.

use std::collections::VecDeque;

use parley_client::{ConnectionState, NoticeLevel, SessionEndReason};
use parley_core::{Identity, RoomCode};
use parley_proto::Role;

use crate::{
    AppAction, AppEvent, KeyInput,
    commands::{self, Command},
    input::LineEditor,
    prefs::{PrefUpdate, SavedSession},
    state::{Confirmation, EntryForm, NOTIFICATION_TICKS, Notification, Page},
};

/// Most notifications kept on screen at once.
const MAX_NOTIFICATIONS: usize = 5;

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App {
    /// Server the session connects to, for status text.
    server_url: String,
    /// Current screen.
    page: Page,
    /// Entry form, kept while chatting so leaving restores it.
    entry: EntryForm,
    /// Chat input line.
    composer: LineEditor,
    /// Pending yes/no question.
    confirmation: Option<Confirmation>,
    /// Oldest first.
    notifications: VecDeque<Notification>,
    /// Last reported connection state. `None` outside a session.
    connection: Option<ConnectionState>,
    /// Last reported local role.
    role: Role,
    /// Lines scrolled back from the newest message.
    scroll: usize,
    /// Terminal dimensions (columns, rows).
    terminal_size: (u16, u16),
}

impl App {
    /// Create an App on the entry page.
    pub fn new(server_url: String) -> Self {
        Self {
            server_url,
            page: Page::Entry,
            entry: EntryForm::default(),
            composer: LineEditor::new(),
            confirmation: None,
            notifications: VecDeque::new(),
            connection: None,
            role: Role::Member,
            scroll: 0,
            terminal_size: (80, 24),
        }
    }

    /// Create an App with the entry form pre-filled from a previous run.
    pub fn with_saved(server_url: String, saved: &SavedSession) -> Self {
        let mut app = Self::new(server_url);
        app.entry = EntryForm::prefilled(
            saved.identity.as_deref().unwrap_or_default(),
            saved.room_code.as_deref().unwrap_or_default(),
        );
        if let Some(role) = saved.role {
            app.role = role;
        }
        app
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::Key(key) => match self.page {
                Page::Entry => self.handle_entry_key(key),
                Page::Chat => self.handle_chat_key(key),
            },
            AppEvent::Tick => self.handle_tick(),
            AppEvent::Resize(cols, rows) => {
                self.terminal_size = (cols, rows);
                vec![AppAction::Render]
            },
            AppEvent::StatusChanged { from, to } => {
                tracing::debug!(?from, ?to, "status changed");
                if self.page == Page::Chat {
                    self.connection = Some(to);
                }
                vec![AppAction::Render]
            },
            AppEvent::SessionUpdated => vec![AppAction::Render],
            AppEvent::RoleChanged(role) => {
                self.role = role;
                vec![AppAction::Persist(PrefUpdate::Role(role)), AppAction::Render]
            },
            AppEvent::RoomInfo { is_persistent, persistence_days } => vec![
                AppAction::Persist(PrefUpdate::Room { is_persistent, persistence_days }),
                AppAction::Render,
            ],
            AppEvent::Notify { level, message } => {
                self.notify(level, message);
                vec![AppAction::Render]
            },
            AppEvent::SessionEnded(reason) => self.handle_session_ended(reason),
        }
    }

    /// Show a notification.
    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(Notification {
            level,
            message: message.into(),
            ticks_left: NOTIFICATION_TICKS,
        });
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    fn handle_entry_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        match key {
            KeyInput::Esc => self.quit(),
            KeyInput::Tab | KeyInput::Up | KeyInput::Down => {
                self.entry.toggle_focus();
                vec![AppAction::Render]
            },
            KeyInput::Enter => self.submit_entry(),
            key => {
                self.entry.focused_mut().edit(key);
                vec![AppAction::Render]
            },
        }
    }

    /// Validate the entry form and start a session.
    fn submit_entry(&mut self) -> Vec<AppAction> {
        let identity = match Identity::parse(self.entry.name.text()) {
            Ok(identity) => identity,
            Err(e) => {
                self.entry.error = Some(e.to_string());
                self.entry.focus = crate::state::EntryField::Name;
                return vec![AppAction::Render];
            },
        };
        let room_code = match RoomCode::parse(self.entry.room.text()) {
            Ok(room_code) => room_code,
            Err(e) => {
                self.entry.error = Some(e.to_string());
                self.entry.focus = crate::state::EntryField::Room;
                return vec![AppAction::Render];
            },
        };

        tracing::info!(user = %identity, room = %room_code, "joining");
        self.entry.error = None;
        self.page = Page::Chat;
        self.connection = Some(ConnectionState::Connecting);
        self.composer = LineEditor::new();
        self.confirmation = None;
        self.scroll = 0;

        vec![
            AppAction::Persist(PrefUpdate::Session {
                identity: identity.clone(),
                room_code: room_code.clone(),
            }),
            AppAction::Join { identity, room_code },
            AppAction::Render,
        ]
    }

    fn handle_chat_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        if let Some(confirmation) = self.confirmation.take() {
            return match key {
                KeyInput::Char('y' | 'Y') | KeyInput::Enter => {
                    let mut actions = vec![Self::confirmed(confirmation)];
                    actions.push(AppAction::Render);
                    actions
                },
                KeyInput::Char('n' | 'N') | KeyInput::Esc => vec![AppAction::Render],
                _ => {
                    self.confirmation = Some(confirmation);
                    vec![]
                },
            };
        }

        match key {
            KeyInput::Esc => self.quit(),
            KeyInput::Enter => self.submit_composer(),
            KeyInput::Up => {
                self.scroll = self.scroll.saturating_add(1);
                vec![AppAction::Render]
            },
            KeyInput::Down => {
                self.scroll = self.scroll.saturating_sub(1);
                vec![AppAction::Render]
            },
            KeyInput::Tab => vec![],
            KeyInput::Char(_) => {
                self.composer.edit(key);
                if self.composer.text().starts_with('/') {
                    vec![AppAction::Render]
                } else {
                    vec![AppAction::Typing, AppAction::Render]
                }
            },
            key => {
                self.composer.edit(key);
                vec![AppAction::Render]
            },
        }
    }

    /// Parse the composer line and act on it.
    fn submit_composer(&mut self) -> Vec<AppAction> {
        let line = self.composer.take();
        if line.trim().is_empty() {
            return vec![AppAction::Render];
        }

        match commands::parse(&line) {
            Command::Message { content } => {
                self.scroll = 0;
                vec![AppAction::SendMessage(content), AppAction::Render]
            },
            Command::Leave => self.confirm(Confirmation::Leave),
            Command::Delete { file } => self.confirm(Confirmation::DeleteFile { file }),
            Command::Kick { user } => self.confirm(Confirmation::Kick { user }),
            Command::Retry => vec![AppAction::Retry, AppAction::Render],
            Command::Upload { path } => vec![AppAction::Upload { path }, AppAction::Render],
            Command::Download { file } => vec![AppAction::Download { file }, AppAction::Render],
            Command::AssignRole { user, role } => {
                vec![AppAction::AssignRole { user, role }, AppAction::Render]
            },
            Command::Export => vec![AppAction::Export, AppAction::Render],
            Command::Help => {
                self.notify(NoticeLevel::Info, commands::HELP);
                vec![AppAction::Render]
            },
            Command::Quit => self.quit(),
            Command::Unknown { input } => {
                self.notify(NoticeLevel::Warning, format!("Unknown command: {input}"));
                vec![AppAction::Render]
            },
            Command::InvalidArgs { command, error } => {
                self.notify(NoticeLevel::Warning, format!("/{command}: {error}"));
                vec![AppAction::Render]
            },
        }
    }

    fn confirm(&mut self, confirmation: Confirmation) -> Vec<AppAction> {
        self.confirmation = Some(confirmation);
        vec![AppAction::Render]
    }

    fn confirmed(confirmation: Confirmation) -> AppAction {
        match confirmation {
            Confirmation::Leave => AppAction::Leave,
            Confirmation::DeleteFile { file } => AppAction::DeleteFile { file },
            Confirmation::Kick { user } => AppAction::Kick { user },
        }
    }

    fn handle_tick(&mut self) -> Vec<AppAction> {
        let before = self.notifications.len();
        for notification in &mut self.notifications {
            notification.ticks_left = notification.ticks_left.saturating_sub(1);
        }
        self.notifications.retain(|n| n.ticks_left > 0);

        if self.notifications.len() == before { vec![] } else { vec![AppAction::Render] }
    }

    fn handle_session_ended(&mut self, reason: SessionEndReason) -> Vec<AppAction> {
        match &reason {
            SessionEndReason::Left => {},
            SessionEndReason::Kicked { message } => {
                self.notify(NoticeLevel::Warning, message.clone());
            },
            SessionEndReason::ForcedDisconnect => {
                self.notify(
                    NoticeLevel::Error,
                    crate::present::failure_text(Some(parley_client::FailureReason::ServerForced)),
                );
            },
        }
        tracing::info!(?reason, "session ended");

        self.page = Page::Entry;
        self.entry = EntryForm::default();
        self.composer = LineEditor::new();
        self.confirmation = None;
        self.connection = None;
        self.role = Role::Member;
        self.scroll = 0;

        vec![AppAction::Persist(PrefUpdate::Clear), AppAction::Render]
    }

    /// Current screen.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Entry form.
    pub fn entry(&self) -> &EntryForm {
        &self.entry
    }

    /// Chat input line.
    pub fn composer(&self) -> &LineEditor {
        &self.composer
    }

    /// Pending yes/no question.
    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    /// Visible notifications, oldest first.
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    /// Last observed connection state. `None` outside a session.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection
    }

    /// Last reported local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Lines scrolled back from the newest message.
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// Server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Terminal dimensions (columns, rows).
    pub fn terminal_size(&self) -> (u16, u16) {
        self.terminal_size
    }
}
