//! Presentation text derived from session state.
//!
//! Pure functions shared by every frontend, so wording stays identical
//! between the terminal UI and simulation assertions.

use parley_client::{ConnectionState, FailureReason};
use parley_proto::{MessageKind, MessageRecord};

use crate::view::SessionView;

const MS_PER_MINUTE: u64 = 60_000;
const MINUTES_PER_DAY: u64 = 24 * 60;

/// Status line for the current connection state.
pub fn status_text(view: &dyn SessionView, server_url: &str) -> String {
    match view.connection_state() {
        ConnectionState::Connecting => format!("Connecting to: {server_url}"),
        ConnectionState::Connected => match view.server_ip() {
            Some(ip) => format!("Connected to: {server_url} ({ip})"),
            None => format!("Connected to: {server_url}"),
        },
        ConnectionState::Disconnected => match view.disconnect_reason() {
            Some(reason) => format!("Disconnected: {reason}"),
            None => "Disconnected".to_string(),
        },
        ConnectionState::Reconnecting => {
            let progress = view.retry_progress();
            format!("Reconnecting... (Attempt {}/{})", progress.attempt, progress.max)
        },
        ConnectionState::Failed => failure_text(view.failure()).to_string(),
    }
}

/// Message for a failed session.
pub fn failure_text(reason: Option<FailureReason>) -> &'static str {
    match reason {
        Some(FailureReason::ReconnectFailed) => "Failed to reconnect. Please refresh.",
        Some(FailureReason::ServerForced) => "Server disconnected you. Please refresh the page.",
        Some(FailureReason::ConnectFailed) | None => {
            "Failed to connect to chat server. Please retry."
        },
    }
}

/// Typing indicator, or `None` when nobody is typing.
pub fn typing_text(names: &[&str]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{one} is typing...")),
        [a, b] => Some(format!("{a} and {b} are typing...")),
        [first, rest @ ..] => Some(format!("{first} and {} others are typing...", rest.len())),
    }
}

/// Online count.
pub fn presence_text(count: usize) -> String {
    if count == 1 { "1 user online".to_string() } else { format!("{count} users online") }
}

/// Label for a user-list entry.
pub fn user_label(view: &dyn SessionView, name: &str) -> String {
    if view.identity().is(name) { format!("{name} (You)") } else { name.to_string() }
}

/// Author shown next to a message.
pub fn author_label(view: &dyn SessionView, message: &MessageRecord) -> String {
    if message.kind == MessageKind::System {
        return "System".to_string();
    }
    if view.is_own(message) {
        return "You".to_string();
    }
    message.username.clone().unwrap_or_else(|| "Unknown".to_string())
}

/// `HH:MM`, 24-hour, UTC.
pub fn clock(timestamp_ms: u64) -> String {
    let minutes = (timestamp_ms / MS_PER_MINUTE) % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Days since the Unix epoch, used to group messages.
pub fn day_number(timestamp_ms: u64) -> u64 {
    timestamp_ms / MS_PER_MINUTE / MINUTES_PER_DAY
}

/// `YYYY-MM-DD` for a day separator.
pub fn day_label(timestamp_ms: u64) -> String {
    let (year, month, day) = civil_from_days(day_number(timestamp_ms));
    format!("{year:04}-{month:02}-{day:02}")
}

/// Human-readable byte count.
pub fn file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{value:.1} {}", UNITS[unit]) }
}

/// Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}
