//! Byte offset to line/column mapping.

use std::fmt;

/// A 1-based line and column position. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Precomputed line start offsets for a source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    source: String,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source: source.to_string(),
            line_starts,
        }
    }

    /// Location of a byte offset. Offsets past the end clamp to the end of input.
    pub fn location(&self, offset: usize) -> Location {
        let offset = self.clamp(offset);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = self.source[start..offset].chars().count() + 1;
        Location {
            line: line + 1,
            column,
        }
    }

    /// Text of a 1-based line without its terminator.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    /// Render `ERROR: <description>:LINE:COL: message` followed by the
    /// offending source line and a caret under the column.
    pub fn render(&self, description: &str, offset: usize, message: &str) -> String {
        let loc = self.location(offset);
        let mut out = format!("ERROR: {}:{}: {}", description, loc, message);
        if let Some(line) = self.line_text(loc.line) {
            out.push_str("\n | ");
            out.push_str(line);
            out.push_str("\n | ");
            out.push_str(&".".repeat(loc.column - 1));
            out.push('^');
        }
        out
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn clamp(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.source.len());
        while !self.source.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        let index = LineIndex::new("a + b");
        assert_eq!(index.location(0), Location { line: 1, column: 1 });
        assert_eq!(index.location(4), Location { line: 1, column: 5 });
    }

    #[test]
    fn multi_line() {
        let index = LineIndex::new("a +\n  b\nc");
        assert_eq!(index.location(6), Location { line: 2, column: 3 });
        assert_eq!(index.location(8), Location { line: 3, column: 1 });
        assert_eq!(index.line_text(2), Some("  b"));
        assert_eq!(index.line_text(4), None);
    }

    #[test]
    fn columns_count_chars() {
        let index = LineIndex::new("'αβ' + x");
        assert_eq!(index.location(8).column, 7);
    }

    #[test]
    fn render_points_at_column() {
        let index = LineIndex::new("a +\nb c");
        let rendered = index.render("<input>", 6, "unexpected token 'c'");
        assert_eq!(
            rendered,
            "ERROR: <input>:2:3: unexpected token 'c'\n | b c\n | ..^"
        );
    }

    #[test]
    fn past_end_clamps() {
        let index = LineIndex::new("ab");
        assert_eq!(index.location(100), Location { line: 1, column: 3 });
    }
}
