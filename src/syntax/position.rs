//! Conversion between protocol coordinates and byte offsets.
//!
//! Protocol positions are zero-based lines and zero-based UTF-16 code unit
//! columns. Internally every node is addressed by its UTF-8 byte offset.

use std::sync::Arc;

use thiserror::Error;

/// A zero-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Half-open range of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("line {line} is out of range (file has {lines} lines)")]
    LineOutOfRange { line: u32, lines: usize },

    #[error("column {column} is past the end of line {line} ({len} UTF-16 units)")]
    ColumnOutOfRange { line: u32, column: u32, len: u32 },

    #[error("column {column} on line {line} falls inside a multi-unit character")]
    InsideCharacter { line: u32, column: u32 },

    #[error("byte offset {offset} is out of range (file has {len} bytes)")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("byte offset {offset} is not on a character boundary")]
    NotCharBoundary { offset: usize },
}

/// Line table for one version of a file's text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    text: Arc<str>,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: Arc<str>) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of a line without its terminator.
    fn line_text(&self, line: usize) -> &str {
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let content = &self.text[start..end];
        content.strip_suffix('\r').unwrap_or(content)
    }

    /// Maps a protocol position to a byte offset.
    ///
    /// Columns that land inside a surrogate pair are rejected rather than
    /// rounded, so a hover never silently targets the neighbouring character.
    pub fn offset(&self, position: Position) -> Result<usize, PositionError> {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return Err(PositionError::LineOutOfRange {
                line: position.line,
                lines: self.line_starts.len(),
            });
        }

        let start = self.line_starts[line];
        let content = self.line_text(line);
        let mut units = 0u32;
        for (i, ch) in content.char_indices() {
            if units == position.column {
                return Ok(start + i);
            }
            let width = ch.len_utf16() as u32;
            if position.column < units + width {
                return Err(PositionError::InsideCharacter {
                    line: position.line,
                    column: position.column,
                });
            }
            units += width;
        }

        if units == position.column {
            Ok(start + content.len())
        } else {
            Err(PositionError::ColumnOutOfRange {
                line: position.line,
                column: position.column,
                len: units,
            })
        }
    }

    /// Maps a byte offset back to a protocol position.
    pub fn position(&self, offset: usize) -> Result<Position, PositionError> {
        if offset > self.text.len() {
            return Err(PositionError::OffsetOutOfRange {
                offset,
                len: self.text.len(),
            });
        }
        if !self.text.is_char_boundary(offset) {
            return Err(PositionError::NotCharBoundary { offset });
        }

        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let column = self.text[self.line_starts[line]..offset]
            .chars()
            .map(|ch| ch.len_utf16() as u32)
            .sum();
        Ok(Position {
            line: line as u32,
            column,
        })
    }

    pub fn range(&self, start: usize, end: usize) -> Result<Range, PositionError> {
        Ok(Range {
            start: self.position(start)?,
            end: self.position(end)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn index(text: &str) -> LineIndex {
        LineIndex::new(Arc::from(text))
    }

    #[rstest]
    #[case("package p", Position::new(0, 8), 8)]
    #[case("a\nbc\n", Position::new(1, 1), 3)]
    #[case("a\nbc\n", Position::new(2, 0), 5)]
    #[case("a\r\nbc", Position::new(1, 2), 5)]
    // 'é' is two bytes, one UTF-16 unit
    #[case("aéb", Position::new(0, 2), 3)]
    // '🌍' is four bytes, two UTF-16 units
    #[case("a🌍b", Position::new(0, 3), 5)]
    fn offset_maps_utf16_columns_to_bytes(
        #[case] text: &str,
        #[case] position: Position,
        #[case] expected: usize,
    ) {
        assert_eq!(index(text).offset(position), Ok(expected));
    }

    #[test]
    fn offset_rejects_column_inside_surrogate_pair() {
        let err = index("a🌍b").offset(Position::new(0, 2)).unwrap_err();
        assert_eq!(err, PositionError::InsideCharacter { line: 0, column: 2 });
    }

    #[test]
    fn offset_rejects_out_of_range_coordinates() {
        let lines = index("ab\ncd");
        assert!(matches!(
            lines.offset(Position::new(5, 0)),
            Err(PositionError::LineOutOfRange { .. })
        ));
        assert!(matches!(
            lines.offset(Position::new(0, 3)),
            Err(PositionError::ColumnOutOfRange { len: 2, .. })
        ));
    }

    #[test]
    fn position_is_inverse_of_offset() {
        let lines = index("var s = \"é🌍\"\nvar t int\n");
        for offset in [0, 4, 9, 11, 15, 16, 20] {
            let position = lines.position(offset).unwrap();
            assert_eq!(lines.offset(position).unwrap(), offset);
        }
    }

    #[test]
    fn position_rejects_offset_inside_character() {
        let lines = index("aé");
        assert_eq!(
            lines.position(2),
            Err(PositionError::NotCharBoundary { offset: 2 })
        );
        assert!(matches!(
            lines.position(9),
            Err(PositionError::OffsetOutOfRange { .. })
        ));
    }
}
