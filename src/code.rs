use super::{Location, Position, SourceText};
use once_cell::unsync::OnceCell;

impl From<&str> for SourceText {
    fn from(value: &str) -> Self {
        SourceText::new(value.to_string())
    }
}
impl From<String> for SourceText {
    fn from(value: String) -> Self {
        SourceText::new(value)
    }
}

impl SourceText {
    pub fn new(text: String) -> Self {
        Self {
            text,
            line_breaks: OnceCell::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn obtain_line_breaks(&self) -> &Vec<usize> {
        self.line_breaks.get_or_init(|| {
            self.text
                .bytes()
                .enumerate()
                .filter_map(|(index, b)| if b == b'\n' { Some(index) } else { None })
                .collect()
        })
    }

    /// Map a byte offset to 1-based line and column numbers. Columns count characters, not
    /// bytes. Offsets outside the text clamp to its end.
    pub fn obtain_position(&self, pointer: usize) -> Position {
        let pointer = pointer.min(self.text.len());
        let line_breaks = self.obtain_line_breaks();
        let index = match line_breaks.binary_search(&pointer) {
            Ok(index) | Err(index) => index,
        };

        let line_start = if index == 0 { 0 } else { line_breaks[index - 1] + 1 };
        let column = self.text[line_start..pointer].chars().count() + 1;
        Position::new(index + 1, column)
    }

    /// The full text of the line containing a byte offset, without its terminator.
    pub fn line_text(&self, pointer: usize) -> &str {
        let pointer = pointer.min(self.text.len());
        let line_breaks = self.obtain_line_breaks();
        let index = match line_breaks.binary_search(&pointer) {
            Ok(index) | Err(index) => index,
        };

        let start = if index == 0 { 0 } else { line_breaks[index - 1] + 1 };
        let end = if index < line_breaks.len() {
            line_breaks[index]
        } else {
            self.text.len()
        };
        self.text[start..end].trim_end_matches('\r')
    }

    pub fn position_at(&self, location: Location) -> Option<Position> {
        if location < 0 {
            None
        } else {
            Some(self.obtain_position(location as usize))
        }
    }
}
