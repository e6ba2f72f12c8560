use crate::ui::input_metrics::clamp_to_char_boundary_left;

/// Editable input buffer with a byte cursor that always sits on a char
/// boundary.
#[derive(Debug, Default)]
pub struct InputLine {
    buffer: String,
    cursor: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn insert_str(&mut self, value: &str) {
        let at = clamp_to_char_boundary_left(&self.buffer, self.cursor);
        self.buffer.insert_str(at, value);
        self.cursor = at + value.len();
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut encoded = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut encoded));
    }

    pub fn backspace(&mut self) {
        let end = clamp_to_char_boundary_left(&self.buffer, self.cursor);
        let start = self.prev_boundary(end);
        if start < end {
            self.buffer.replace_range(start..end, "");
        }
        self.cursor = start;
    }

    pub fn delete(&mut self) {
        let start = clamp_to_char_boundary_left(&self.buffer, self.cursor);
        let end = self.next_boundary(start);
        if start < end {
            self.buffer.replace_range(start..end, "");
        }
        self.cursor = start;
    }

    pub fn move_left(&mut self) {
        self.cursor = self.prev_boundary(self.cursor);
    }

    pub fn move_right(&mut self) {
        self.cursor = self.next_boundary(self.cursor);
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.buffer.len();
    }

    /// Takes the trimmed buffer, leaving the editor empty. Blank input
    /// yields `None` and is kept for further editing.
    pub fn submit(&mut self) -> Option<String> {
        let value = self.buffer.trim();
        if value.is_empty() {
            return None;
        }
        let value = value.to_string();
        self.buffer.clear();
        self.cursor = 0;
        Some(value)
    }

    fn prev_boundary(&self, index: usize) -> usize {
        let index = clamp_to_char_boundary_left(&self.buffer, index);
        self.buffer[..index]
            .char_indices()
            .next_back()
            .map(|(at, _)| at)
            .unwrap_or(0)
    }

    fn next_boundary(&self, index: usize) -> usize {
        let index = clamp_to_char_boundary_left(&self.buffer, index);
        self.buffer[index..]
            .chars()
            .next()
            .map(|ch| index + ch.len_utf8())
            .unwrap_or(self.buffer.len())
    }
}
