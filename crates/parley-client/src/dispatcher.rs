//! Outbound action dispatcher.
//!
//! Validates and rate-limits local intents before they become frames. Owns
//! the local typing state: a start is emitted on the first keystroke after
//! an idle period, a stop once the debounce window passes without input.

use std::{fmt::Debug, ops::Sub, time::Duration};

use parley_core::ConnectionState;
use parley_proto::ClientFrame;

use crate::error::ClientError;

/// Longest message sent, in characters. Longer input is truncated.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1000;

/// Idle time after the last keystroke before typing stops.
pub const DEFAULT_TYPING_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Age at which a remote typing entry without refresh is dropped.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(5);

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Message length limit in characters
    pub max_message_len: usize,
    /// Local typing debounce
    pub typing_debounce: Duration,
    /// Remote typing expiry
    pub typing_ttl: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            typing_debounce: DEFAULT_TYPING_DEBOUNCE,
            typing_ttl: DEFAULT_TYPING_TTL,
        }
    }
}

/// Outbound validation and typing debounce.
#[derive(Debug, Clone)]
pub struct Dispatcher<I> {
    config: DispatchConfig,
    /// Last keystroke while typing is active
    typing_since: Option<I>,
}

impl<I> Dispatcher<I>
where
    I: Copy + Debug + Sub<Output = Duration>,
{
    /// Create an idle dispatcher.
    pub fn new(config: DispatchConfig) -> Self {
        Self { config, typing_since: None }
    }

    /// Configuration in use.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Whether a typing start was emitted and not yet stopped.
    pub fn is_typing(&self) -> bool {
        self.typing_since.is_some()
    }

    /// Validate a message and produce the frames to send.
    ///
    /// The text is trimmed and truncated. If typing is active, a typing stop
    /// follows the message and the debounce is cancelled.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotConnected` unless `state` is `Connected`
    /// - `ClientError::EmptyMessage` if the text is blank
    pub fn send_message(
        &mut self,
        state: ConnectionState,
        text: &str,
    ) -> Result<Vec<ClientFrame>, ClientError> {
        if state != ConnectionState::Connected {
            return Err(ClientError::NotConnected { state });
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let body: String = trimmed.chars().take(self.config.max_message_len).collect();
        let mut frames = vec![ClientFrame::SendMessage(body)];
        if self.typing_since.take().is_some() {
            frames.push(ClientFrame::TypingStop);
        }
        Ok(frames)
    }

    /// Register a keystroke.
    ///
    /// Emits a typing start only when idle; otherwise just restarts the
    /// debounce window. Ignored while disconnected.
    pub fn keystroke(&mut self, state: ConnectionState, now: I) -> Option<ClientFrame> {
        if state != ConnectionState::Connected {
            return None;
        }

        let was_idle = self.typing_since.replace(now).is_none();
        was_idle.then_some(ClientFrame::TypingStart)
    }

    /// Emit a typing stop once the debounce window elapsed.
    pub fn tick(&mut self, now: I) -> Option<ClientFrame> {
        let since = self.typing_since?;
        if now - since < self.config.typing_debounce {
            return None;
        }
        self.typing_since = None;
        Some(ClientFrame::TypingStop)
    }

    /// Stop typing immediately, e.g. before leaving.
    pub fn stop_typing(&mut self) -> Option<ClientFrame> {
        self.typing_since.take().map(|_| ClientFrame::TypingStop)
    }

    /// Forget typing state without emitting anything (channel gone).
    pub fn reset(&mut self) {
        self.typing_since = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn dispatcher() -> Dispatcher<Instant> {
        Dispatcher::new(DispatchConfig::default())
    }

    #[test]
    fn send_requires_connection() {
        let mut d = dispatcher();
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Reconnecting,
            ConnectionState::Failed,
        ] {
            assert_eq!(d.send_message(state, "hi"), Err(ClientError::NotConnected { state }));
        }
    }

    #[test]
    fn blank_message_is_rejected() {
        let mut d = dispatcher();
        assert_eq!(
            d.send_message(ConnectionState::Connected, " \n\t "),
            Err(ClientError::EmptyMessage)
        );
    }

    #[test]
    fn message_is_trimmed_and_truncated() {
        let mut d = dispatcher();
        let long = format!("  {}  ", "x".repeat(1500));
        let frames = d.send_message(ConnectionState::Connected, &long).unwrap();
        let [ClientFrame::SendMessage(body)] = frames.as_slice() else {
            unreachable!("expected a single message frame");
        };
        assert_eq!(body.chars().count(), 1000);
    }

    #[test]
    fn typing_start_is_emitted_once() {
        let t0 = Instant::now();
        let mut d = dispatcher();
        assert_eq!(d.keystroke(ConnectionState::Connected, t0), Some(ClientFrame::TypingStart));
        assert_eq!(d.keystroke(ConnectionState::Connected, t0 + Duration::from_millis(500)), None);

        // Debounce restarts from the latest keystroke
        assert_eq!(d.tick(t0 + Duration::from_millis(1200)), None);
        assert_eq!(d.tick(t0 + Duration::from_millis(1500)), Some(ClientFrame::TypingStop));
        assert_eq!(d.tick(t0 + Duration::from_millis(3000)), None);

        assert_eq!(
            d.keystroke(ConnectionState::Connected, t0 + Duration::from_secs(4)),
            Some(ClientFrame::TypingStart)
        );
    }

    #[test]
    fn send_stops_active_typing() {
        let t0 = Instant::now();
        let mut d = dispatcher();
        d.keystroke(ConnectionState::Connected, t0);

        let frames = d.send_message(ConnectionState::Connected, "hi").unwrap();
        assert_eq!(frames, vec![ClientFrame::SendMessage("hi".into()), ClientFrame::TypingStop]);
        assert_eq!(d.tick(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn keystrokes_ignored_while_disconnected() {
        let mut d = dispatcher();
        assert_eq!(d.keystroke(ConnectionState::Reconnecting, Instant::now()), None);
        assert!(!d.is_typing());
    }
}
