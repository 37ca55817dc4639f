//! Terminal-agnostic keyboard input and line editing.

/// Keyboard input abstraction.
///
/// Decouples application logic from terminal libraries (crossterm, termion,
/// etc.) enabling deterministic simulation testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Printable character.
    Char(char),
    /// Enter/Return key.
    Enter,
    /// Backspace key (delete character before cursor).
    Backspace,
    /// Delete key (delete character at cursor).
    Delete,
    /// Tab key (switch entry field).
    Tab,
    /// Escape key (cancel or quit).
    Esc,
    /// Left arrow key.
    Left,
    /// Right arrow key.
    Right,
    /// Up arrow key (scroll back).
    Up,
    /// Down arrow key (scroll forward).
    Down,
    /// Home key (cursor to start).
    Home,
    /// End key (cursor to end).
    End,
}

/// Single-line text buffer with a cursor.
///
/// The cursor counts characters, not bytes, so multi-byte input edits
/// cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditor {
    buffer: String,
    cursor: usize,
    limit: Option<usize>,
}

impl LineEditor {
    /// Empty, unbounded editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty editor accepting at most `limit` characters.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    /// Editor pre-filled with `text`, cursor at the end.
    pub fn with_text(mut self, text: &str) -> Self {
        self.buffer = match self.limit {
            Some(limit) => text.chars().take(limit).collect(),
            None => text.to_string(),
        };
        self.cursor = self.buffer.chars().count();
        self
    }

    /// Current text.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the text and reset.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Apply an editing key. Returns whether the text changed.
    ///
    /// Keys that are not editing keys are ignored.
    pub fn edit(&mut self, key: KeyInput) -> bool {
        let len = self.buffer.chars().count();
        match key {
            KeyInput::Char(c) => {
                if self.limit.is_some_and(|limit| len >= limit) {
                    return false;
                }
                let at = self.byte_offset(self.cursor);
                self.buffer.insert(at, c);
                self.cursor += 1;
                true
            },
            KeyInput::Backspace => {
                if self.cursor == 0 {
                    return false;
                }
                self.cursor -= 1;
                let at = self.byte_offset(self.cursor);
                self.buffer.remove(at);
                true
            },
            KeyInput::Delete => {
                if self.cursor >= len {
                    return false;
                }
                let at = self.byte_offset(self.cursor);
                self.buffer.remove(at);
                true
            },
            KeyInput::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                false
            },
            KeyInput::Right => {
                self.cursor = (self.cursor + 1).min(len);
                false
            },
            KeyInput::Home => {
                self.cursor = 0;
                false
            },
            KeyInput::End => {
                self.cursor = len;
                false
            },
            KeyInput::Enter | KeyInput::Tab | KeyInput::Esc | KeyInput::Up | KeyInput::Down => {
                false
            },
        }
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.buffer.char_indices().nth(chars).map_or(self.buffer.len(), |(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> LineEditor {
        let mut editor = LineEditor::new();
        for c in text.chars() {
            editor.edit(KeyInput::Char(c));
        }
        editor
    }

    #[test]
    fn char_input_adds_to_buffer() {
        let editor = typed("hi");
        assert_eq!(editor.text(), "hi");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn backspace_removes_char() {
        let mut editor = typed("ab");
        assert!(editor.edit(KeyInput::Backspace));
        assert_eq!(editor.text(), "a");
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn cursor_movement() {
        let mut editor = typed("abc");

        editor.edit(KeyInput::Home);
        assert_eq!(editor.cursor(), 0);
        editor.edit(KeyInput::End);
        assert_eq!(editor.cursor(), 3);
        editor.edit(KeyInput::Left);
        assert_eq!(editor.cursor(), 2);
        editor.edit(KeyInput::Right);
        editor.edit(KeyInput::Right);
        assert_eq!(editor.cursor(), 3);
    }

    #[test]
    fn multibyte_editing_stays_on_char_boundaries() {
        let mut editor = typed("héllo");
        editor.edit(KeyInput::Home);
        editor.edit(KeyInput::Right);
        editor.edit(KeyInput::Delete);
        assert_eq!(editor.text(), "hllo");

        editor.edit(KeyInput::Char('é'));
        assert_eq!(editor.text(), "héllo");
    }

    #[test]
    fn limit_rejects_extra_chars() {
        let mut editor = LineEditor::with_limit(3);
        for c in "abcd".chars() {
            editor.edit(KeyInput::Char(c));
        }
        assert_eq!(editor.text(), "abc");
    }

    #[test]
    fn take_resets() {
        let mut editor = typed("test");
        assert_eq!(editor.take(), "test");
        assert!(editor.is_empty());
        assert_eq!(editor.cursor(), 0);
    }
}
