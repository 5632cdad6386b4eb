use std::fmt;

const DEFAULT_TAB_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A diagnostic reported by a buffer. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub initial_value: String,
    pub language_mode: &'static str,
    pub tab_size: usize,
}

impl EditorOptions {
    pub fn new(initial_value: impl Into<String>, language_mode: &'static str) -> Self {
        Self {
            initial_value: initial_value.into(),
            language_mode,
            tab_size: DEFAULT_TAB_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Char(char),
    Newline,
    Tab,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferChange {
    None,
    Cursor,
    Content,
}

/// The editing widget contract consumed by the session layer.
pub trait EditorWidget: fmt::Debug {
    fn value(&self) -> String;
    fn set_value(&mut self, text: &str);
    fn language_mode(&self) -> &str;
    fn set_language_mode(&mut self, mode: &'static str);
    fn apply_key(&mut self, key: EditKey) -> BufferChange;
    fn markers(&self) -> Vec<Marker>;
    /// Caret as 1-based (line, column).
    fn caret(&self) -> (u32, u32);
    fn reveal_and_place_caret(&mut self, line: u32, column: u32);
    fn focus(&mut self);
    fn blur(&mut self);
    fn is_focused(&self) -> bool;
    fn dispose(&mut self);
}

pub trait EditorFactory {
    /// False while the widget toolkit is still loading.
    fn is_ready(&self) -> bool;
    fn create(&mut self, options: EditorOptions) -> Box<dyn EditorWidget>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextBufferFactory;

impl EditorFactory for TextBufferFactory {
    fn is_ready(&self) -> bool {
        true
    }

    fn create(&mut self, options: EditorOptions) -> Box<dyn EditorWidget> {
        Box::new(TextBuffer::new(options))
    }
}

#[derive(Debug, Clone)]
pub struct TextBuffer {
    lines: Vec<String>,
    cursor_line: usize,
    cursor_col: usize,
    mode: &'static str,
    tab_size: usize,
    focused: bool,
    disposed: bool,
}

impl TextBuffer {
    pub fn new(options: EditorOptions) -> Self {
        Self {
            lines: split_lines(&options.initial_value),
            cursor_line: 0,
            cursor_col: 0,
            mode: options.language_mode,
            tab_size: options.tab_size.max(1),
            focused: false,
            disposed: false,
        }
    }

    fn line_len(&self, line: usize) -> usize {
        self.lines.get(line).map(|l| l.chars().count()).unwrap_or(0)
    }

    fn insert_str_at_cursor(&mut self, text: &str) {
        let line = &mut self.lines[self.cursor_line];
        let byte_idx = char_to_byte_idx(line, self.cursor_col);
        line.insert_str(byte_idx, text);
        self.cursor_col += text.chars().count();
    }

    fn backspace(&mut self) -> BufferChange {
        if self.cursor_col > 0 {
            let line = &mut self.lines[self.cursor_line];
            let start = char_to_byte_idx(line, self.cursor_col - 1);
            let end = char_to_byte_idx(line, self.cursor_col);
            line.drain(start..end);
            self.cursor_col -= 1;
            return BufferChange::Content;
        }
        if self.cursor_line == 0 {
            return BufferChange::None;
        }
        let removed = self.lines.remove(self.cursor_line);
        self.cursor_line -= 1;
        self.cursor_col = self.line_len(self.cursor_line);
        self.lines[self.cursor_line].push_str(&removed);
        BufferChange::Content
    }

    fn delete(&mut self) -> BufferChange {
        let len = self.line_len(self.cursor_line);
        if self.cursor_col < len {
            let line = &mut self.lines[self.cursor_line];
            let start = char_to_byte_idx(line, self.cursor_col);
            let end = char_to_byte_idx(line, self.cursor_col + 1);
            line.drain(start..end);
            return BufferChange::Content;
        }
        if self.cursor_line + 1 >= self.lines.len() {
            return BufferChange::None;
        }
        let next = self.lines.remove(self.cursor_line + 1);
        self.lines[self.cursor_line].push_str(&next);
        BufferChange::Content
    }

    fn move_to(&mut self, line: usize, col: usize) -> BufferChange {
        let line = line.min(self.lines.len().saturating_sub(1));
        let col = col.min(self.line_len(line));
        if (line, col) == (self.cursor_line, self.cursor_col) {
            return BufferChange::None;
        }
        self.cursor_line = line;
        self.cursor_col = col;
        BufferChange::Cursor
    }
}

impl EditorWidget for TextBuffer {
    fn value(&self) -> String {
        self.lines.join("\n")
    }

    fn set_value(&mut self, text: &str) {
        self.lines = split_lines(text);
        self.cursor_line = 0;
        self.cursor_col = 0;
    }

    fn language_mode(&self) -> &str {
        self.mode
    }

    fn set_language_mode(&mut self, mode: &'static str) {
        self.mode = mode;
    }

    fn apply_key(&mut self, key: EditKey) -> BufferChange {
        if self.disposed {
            return BufferChange::None;
        }
        match key {
            EditKey::Char(ch) => {
                let mut tmp = [0u8; 4];
                self.insert_str_at_cursor(ch.encode_utf8(&mut tmp));
                BufferChange::Content
            }
            EditKey::Tab => {
                let spaces = " ".repeat(self.tab_size);
                self.insert_str_at_cursor(&spaces);
                BufferChange::Content
            }
            EditKey::Newline => {
                let line = &mut self.lines[self.cursor_line];
                let byte_idx = char_to_byte_idx(line, self.cursor_col);
                let rest = line.split_off(byte_idx);
                self.lines.insert(self.cursor_line + 1, rest);
                self.cursor_line += 1;
                self.cursor_col = 0;
                BufferChange::Content
            }
            EditKey::Backspace => self.backspace(),
            EditKey::Delete => self.delete(),
            EditKey::Left => {
                if self.cursor_col > 0 {
                    self.move_to(self.cursor_line, self.cursor_col - 1)
                } else if self.cursor_line > 0 {
                    let prev = self.cursor_line - 1;
                    self.move_to(prev, self.line_len(prev))
                } else {
                    BufferChange::None
                }
            }
            EditKey::Right => {
                if self.cursor_col < self.line_len(self.cursor_line) {
                    self.move_to(self.cursor_line, self.cursor_col + 1)
                } else if self.cursor_line + 1 < self.lines.len() {
                    self.move_to(self.cursor_line + 1, 0)
                } else {
                    BufferChange::None
                }
            }
            EditKey::Up if self.cursor_line > 0 => {
                self.move_to(self.cursor_line - 1, self.cursor_col)
            }
            EditKey::Up => BufferChange::None,
            EditKey::Down => self.move_to(self.cursor_line + 1, self.cursor_col),
            EditKey::Home => self.move_to(self.cursor_line, 0),
            EditKey::End => self.move_to(self.cursor_line, self.line_len(self.cursor_line)),
        }
    }

    fn markers(&self) -> Vec<Marker> {
        delimiter_markers(&self.lines)
    }

    fn caret(&self) -> (u32, u32) {
        (self.cursor_line as u32 + 1, self.cursor_col as u32 + 1)
    }

    fn reveal_and_place_caret(&mut self, line: u32, column: u32) {
        let line = (line.max(1) - 1) as usize;
        let column = (column.max(1) - 1) as usize;
        self.move_to(line, column);
    }

    fn focus(&mut self) {
        if !self.disposed {
            self.focused = true;
        }
    }

    fn blur(&mut self) {
        self.focused = false;
    }

    fn is_focused(&self) -> bool {
        self.focused
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.focused = false;
        self.lines = vec![String::new()];
        self.cursor_line = 0;
        self.cursor_col = 0;
    }
}

/// Line endings are stored as LF; a CRLF file reads back LF-only.
fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

fn char_to_byte_idx(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(byte_idx, _)| byte_idx)
        .unwrap_or_else(|| s.len())
}

fn opening_for(closer: char) -> char {
    match closer {
        ')' => '(',
        ']' => '[',
        _ => '{',
    }
}

// Unbalanced brackets outside double-quoted strings, plus trailing whitespace.
fn delimiter_markers(lines: &[String]) -> Vec<Marker> {
    let mut open: Vec<(char, u32, u32)> = Vec::new();
    let mut markers = Vec::new();

    for (line_idx, line) in lines.iter().enumerate() {
        let line_no = line_idx as u32 + 1;
        let mut in_string = false;
        let mut escaped = false;
        for (col_idx, ch) in line.chars().enumerate() {
            let col_no = col_idx as u32 + 1;
            if in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '(' | '[' | '{' => open.push((ch, line_no, col_no)),
                ')' | ']' | '}' => match open.last() {
                    Some((opener, _, _)) if *opener == opening_for(ch) => {
                        open.pop();
                    }
                    _ => markers.push(Marker {
                        severity: Severity::Error,
                        message: format!("Unexpected '{ch}'"),
                        line: line_no,
                        column: col_no,
                    }),
                },
                _ => {}
            }
        }

        let full_len = line.chars().count();
        let trimmed_len = line.trim_end().chars().count();
        if trimmed_len < full_len {
            markers.push(Marker {
                severity: Severity::Warning,
                message: "Trailing whitespace".to_string(),
                line: line_no,
                column: trimmed_len as u32 + 1,
            });
        }
    }

    for (opener, line, column) in open {
        markers.push(Marker {
            severity: Severity::Error,
            message: format!("Unclosed '{opener}'"),
            line,
            column,
        });
    }
    markers.sort_by_key(|marker| (marker.line, marker.column));
    markers
}

#[cfg(test)]
#[path = "../tests/unit/editor_tests.rs"]
mod tests;
