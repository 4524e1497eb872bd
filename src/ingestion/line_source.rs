//! Line Source - lazy, in-order line reader over a CSV stream

use crate::error::{IngestError, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// One line of input with its 1-based line number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLine {
    pub number: u64,
    pub text: String,
}

/// Produces lines one at a time. LF and CRLF endings are both accepted and
/// never appear in the returned text. To read a file again, open a new source.
pub struct LineSource<R> {
    lines: Lines<R>,
    line_number: u64,
}

impl LineSource<BufReader<File>> {
    /// Open a file for reading. A missing file is reported as `FileNotFound`
    /// so the caller can abort before any processing happens.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngestError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                IngestError::Io(e)
            }
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }

    /// Next line, `Ok(None)` at end of input
    pub async fn next_line(&mut self) -> Result<Option<SourceLine>> {
        let Some(mut text) = self.lines.next_line().await? else {
            return Ok(None);
        };
        self.line_number += 1;

        if text.ends_with('\r') {
            text.pop();
        }
        if self.line_number == 1 {
            if let Some(stripped) = text.strip_prefix('\u{feff}') {
                text = stripped.to_string();
            }
        }

        Ok(Some(SourceLine {
            number: self.line_number,
            text,
        }))
    }

    /// Number of lines handed out so far
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &'static [u8]) -> Vec<String> {
        let mut source = LineSource::new(input);
        let mut out = Vec::new();
        while let Some(line) = source.next_line().await.unwrap() {
            out.push(line.text);
        }
        out
    }

    #[tokio::test]
    async fn test_lf_and_crlf_normalized() {
        let lines = collect(b"a,b\r\n1,2\n3,4\r\n").await;
        assert_eq!(lines, vec!["a,b", "1,2", "3,4"]);
    }

    #[tokio::test]
    async fn test_missing_trailing_newline() {
        let lines = collect(b"a\n1").await;
        assert_eq!(lines, vec!["a", "1"]);
    }

    #[tokio::test]
    async fn test_bom_stripped_from_first_line_only() {
        let lines = collect("\u{feff}name\n\u{feff}x\n".as_bytes()).await;
        assert_eq!(lines[0], "name");
        assert_eq!(lines[1], "\u{feff}x");
    }

    #[tokio::test]
    async fn test_line_numbers_count_from_one() {
        let mut source = LineSource::new(&b"h\nv\n"[..]);
        assert_eq!(source.next_line().await.unwrap().unwrap().number, 1);
        assert_eq!(source.next_line().await.unwrap().unwrap().number, 2);
        assert!(source.next_line().await.unwrap().is_none());
        assert_eq!(source.lines_read(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_file_not_found() {
        let path = std::env::temp_dir().join(format!("missing_{}.csv", uuid::Uuid::new_v4()));
        let err = LineSource::open(&path).await.err().unwrap();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_io_error() {
        let mut source = LineSource::new(&b"ok\n\xff\xfe\n"[..]);
        assert!(source.next_line().await.is_ok());
        let err = source.next_line().await.unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
