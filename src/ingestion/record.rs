//! Raw Record tree and the nested field assigner
//!
//! A raw record is built fresh for every data line: header paths such as
//! `name.firstName` create intermediate mappings on demand and the cell value
//! lands at the leaf.

use crate::error::{IngestError, Result};
use crate::ingestion::header::{FieldPath, Header};
use crate::ingestion::line_source::SourceLine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The one path whose value is parsed as an integer
pub const AGE_PATH: &str = "age";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    Integer(i64),
    /// `age` was present but not a base-10 integer
    NotANumber,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawNode {
    Leaf(RawValue),
    Branch(RawRecord),
}

impl RawNode {
    pub fn to_json(&self) -> Value {
        match self {
            RawNode::Leaf(RawValue::Text(s)) => Value::String(s.clone()),
            RawNode::Leaf(RawValue::Integer(n)) => Value::from(*n),
            RawNode::Leaf(RawValue::NotANumber) => Value::Null,
            RawNode::Branch(record) => record.to_json(),
        }
    }
}

/// Outcome of a single `assign` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assigned {
    /// Empty value, nothing written
    Skipped,
    Stored,
    /// Stored the not-a-number marker for `age`
    AgeNotANumber,
}

/// A path tried to descend through, or overwrite, an existing node of the wrong kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignConflict {
    pub path: String,
    pub segment: String,
}

impl fmt::Display for AssignConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path '{}' conflicts with an existing value at '{}'",
            self.path, self.segment
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawNode>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&RawNode> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawNode)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Write `raw_value` at `path`, creating intermediate mappings.
    ///
    /// Empty values are skipped entirely. A segment that already holds a leaf
    /// is never overwritten with a mapping (or the other way round).
    pub fn assign(&mut self, path: &FieldPath, raw_value: &str) -> std::result::Result<Assigned, AssignConflict> {
        if raw_value.is_empty() {
            return Ok(Assigned::Skipped);
        }

        let conflict = |segment: &str| AssignConflict {
            path: path.as_str().to_string(),
            segment: segment.to_string(),
        };

        let segments = path.segments();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(Assigned::Skipped);
        };

        let mut node = self;
        for segment in parents {
            let entry = node
                .fields
                .entry(segment.clone())
                .or_insert_with(|| RawNode::Branch(RawRecord::new()));
            node = match entry {
                RawNode::Branch(child) => child,
                RawNode::Leaf(_) => return Err(conflict(segment)),
            };
        }

        if let Some(RawNode::Branch(_)) = node.fields.get(last) {
            return Err(conflict(last));
        }

        let (value, outcome) = if path.as_str() == AGE_PATH {
            match raw_value.trim().parse::<i64>() {
                Ok(n) => (RawValue::Integer(n), Assigned::Stored),
                Err(_) => (RawValue::NotANumber, Assigned::AgeNotANumber),
            }
        } else {
            (RawValue::Text(raw_value.to_string()), Assigned::Stored)
        };

        node.fields.insert(last.clone(), RawNode::Leaf(value));
        Ok(outcome)
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

/// A raw record built from one data line
#[derive(Clone, Debug)]
pub struct AssembledRecord {
    pub line: u64,
    pub record: RawRecord,
    pub age_parse_warnings: u32,
}

/// Build the raw record for one data line against `header`
pub fn assemble(header: &Header, line: &SourceLine) -> Result<AssembledRecord> {
    let values = header.split_row(line)?;
    let mut record = RawRecord::new();
    let mut age_parse_warnings = 0;

    for (path, value) in header.paths().iter().zip(values) {
        match record.assign(path, value) {
            Ok(Assigned::AgeNotANumber) => {
                tracing::debug!(line = line.number, value, "age is not an integer, defaulting");
                age_parse_warnings += 1;
            }
            Ok(_) => {}
            Err(conflict) => return Err(IngestError::malformed(line.number, conflict.to_string())),
        }
    }

    Ok(AssembledRecord {
        line: line.number,
        record,
        age_parse_warnings,
    })
}
