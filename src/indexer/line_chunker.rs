//! Line-window chunking, the universal fallback strategy.
//!
//! Windows of `window` lines advance by `window - overlap` lines, so two
//! neighbouring blocks always share exactly `overlap` lines.

use super::relations::scan_call_sites;
use crate::chunk::{Chunk, ChunkId, ChunkKind, SourceFile, Span};
use crate::error::ExtractError;

/// Byte offsets of line starts, for span ↔ line conversions.
pub(crate) struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let len = text.len();
        let mut starts = vec![0];
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(i, b)| b == b'\n' && i + 1 < len)
                .map(|(i, _)| i + 1),
        );
        Self { starts, len }
    }

    pub fn line_count(&self) -> usize {
        if self.len == 0 { 0 } else { self.starts.len() }
    }

    /// First byte of a 0-based line.
    pub fn line_start(&self, line: usize) -> usize {
        self.starts[line]
    }

    /// One past the last byte of a 0-based line, newline included.
    pub fn line_end(&self, line: usize) -> usize {
        self.starts.get(line + 1).copied().unwrap_or(self.len)
    }

    /// 1-based line containing `byte`.
    pub fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|&s| s <= byte).max(1)
    }

    /// Span for `[start, end)` bytes, `end > start`.
    pub fn span(&self, start: usize, end: usize) -> Span {
        Span {
            start_byte: start,
            end_byte: end,
            start_line: self.line_of(start),
            end_line: self.line_of(end.saturating_sub(1).max(start)),
        }
    }
}

/// Split a file into overlapping windows of whole lines.
pub fn chunk_by_lines(
    file: &SourceFile,
    window: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ExtractError> {
    if window == 0 || overlap == 0 || overlap >= window {
        return Err(ExtractError::InvalidWindow { window, overlap });
    }

    let lines = LineIndex::new(&file.text);
    let total = lines.line_count();
    let step = window - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + window).min(total);
        let start_byte = lines.line_start(start);
        let end_byte = lines.line_end(end - 1);
        let content = file.text[start_byte..end_byte].to_string();
        let ordinal = chunks.len();

        chunks.push(Chunk {
            id: ChunkId::new(&file.path, ordinal),
            path: file.path.clone(),
            language: file.language,
            ordinal,
            kind: ChunkKind::LineBlock,
            qualified_name: String::new(),
            span: lines.span(start_byte, end_byte),
            references: scan_call_sites(&content),
            content,
            docstring: None,
            members: Vec::new(),
        });

        if end == total {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn test_line_index() {
        let idx = LineIndex::new("a\nbb\nccc");
        assert_eq!(idx.line_count(), 3);
        assert_eq!(idx.line_start(1), 2);
        assert_eq!(idx.line_end(1), 5);
        assert_eq!(idx.line_end(2), 8);
        assert_eq!(idx.line_of(0), 1);
        assert_eq!(idx.line_of(4), 2);
        assert_eq!(idx.line_of(7), 3);
    }

    #[test]
    fn test_windows_overlap_exactly() {
        let file = SourceFile::new("notes.txt", numbered(10));
        let chunks = chunk_by_lines(&file, 4, 1).unwrap();

        let lines: Vec<(usize, usize)> = chunks
            .iter()
            .map(|c| (c.span.start_line, c.span.end_line))
            .collect();
        assert_eq!(lines, vec![(1, 4), (4, 7), (7, 10)]);

        for pair in chunks.windows(2) {
            let shared = pair[0].span.end_line + 1 - pair[1].span.start_line;
            assert_eq!(shared, 1);
        }
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::LineBlock));
        assert_eq!(chunks[2].id.as_str(), "notes.txt:2");
    }

    #[test]
    fn test_short_file_is_one_block() {
        let file = SourceFile::new("a.txt", "one\ntwo");
        let chunks = chunk_by_lines(&file, 25, 4).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "one\ntwo");
        assert_eq!(chunks[0].span.end_byte, 7);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let file = SourceFile::new("empty.txt", "");
        assert!(chunk_by_lines(&file, 25, 4).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_window_rejected() {
        let file = SourceFile::new("a.txt", "x");
        assert!(chunk_by_lines(&file, 3, 3).is_err());
        assert!(chunk_by_lines(&file, 0, 0).is_err());
        assert!(matches!(
            chunk_by_lines(&file, 3, 0),
            Err(ExtractError::InvalidWindow {
                window: 3,
                overlap: 0
            })
        ));
    }

    #[test]
    fn test_line_blocks_record_call_sites() {
        let file = SourceFile::new("script.sh", "setup(a)\nrun_all()\n");
        let chunks = chunk_by_lines(&file, 25, 4).unwrap();
        let names: Vec<&str> = chunks[0].references.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["run_all", "setup"]);
    }
}
