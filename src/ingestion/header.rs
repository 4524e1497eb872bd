//! Header Parser - turns the first line into ordered field paths

use crate::error::{IngestError, Result};
use crate::ingestion::line_source::SourceLine;
use std::collections::HashSet;
use std::fmt;

/// Column delimiter. No quoting or escaping is supported.
pub const DELIMITER: char = ',';

/// Separator between nesting levels inside a header name
pub const PATH_SEPARATOR: char = '.';

/// A dot-separated location in a nested record, e.g. `address.city`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty header name".to_string());
        }

        let segments: Vec<String> = raw.split(PATH_SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(format!("header '{}' has an empty path segment", raw));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered column paths, fixed for one ingestion run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    paths: Vec<FieldPath>,
}

impl Header {
    pub fn parse(line: &SourceLine) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for raw in line.text.split(DELIMITER) {
            let path = FieldPath::parse(raw).map_err(|reason| IngestError::malformed(line.number, reason))?;
            if !seen.insert(path.as_str().to_string()) {
                return Err(IngestError::malformed(
                    line.number,
                    format!("duplicate header '{}'", path),
                ));
            }
            paths.push(path);
        }

        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Split a data line into values, one per column.
    ///
    /// Missing trailing values are simply not returned. More values than
    /// columns means a value contained the delimiter, which cannot be
    /// represented, so the line is rejected.
    pub fn split_row<'a>(&self, line: &'a SourceLine) -> Result<Vec<&'a str>> {
        let values: Vec<&str> = line.text.split(DELIMITER).collect();
        if values.len() > self.paths.len() {
            return Err(IngestError::malformed(
                line.number,
                format!(
                    "expected at most {} values, found {} (values may not contain '{}')",
                    self.paths.len(),
                    values.len(),
                    DELIMITER
                ),
            ));
        }
        Ok(values)
    }
}
