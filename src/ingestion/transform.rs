//! Record Transformer - maps a raw record onto the fixed `users` shape

use crate::ingestion::record::{RawNode, RawRecord, RawValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NAME_KEY: &str = "name";
pub const FIRST_NAME_KEY: &str = "firstName";
pub const LAST_NAME_KEY: &str = "lastName";
pub const AGE_KEY: &str = "age";
pub const ADDRESS_KEY: &str = "address";

/// One row of the target table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    pub age: i32,
    pub address: Option<Value>,
    pub additional_info: Option<Value>,
}

/// Map a raw record to a target record. Pure: same input, same output.
///
/// Age `0` and "no usable age" both end up as `0`; the two cannot be told
/// apart after this step.
pub fn transform(raw: &RawRecord) -> TargetRecord {
    let mut additional = Map::new();
    for (key, node) in raw.iter() {
        if !matches!(key, NAME_KEY | AGE_KEY | ADDRESS_KEY) {
            additional.insert(key.to_string(), node.to_json());
        }
    }

    TargetRecord {
        name: compose_name(raw.get(NAME_KEY)),
        age: extract_age(raw.get(AGE_KEY)),
        address: raw.get(ADDRESS_KEY).map(RawNode::to_json),
        additional_info: if additional.is_empty() {
            None
        } else {
            Some(Value::Object(additional))
        },
    }
}

fn compose_name(node: Option<&RawNode>) -> String {
    match node {
        Some(RawNode::Branch(name)) => {
            let first = text_leaf(name.get(FIRST_NAME_KEY)).unwrap_or("");
            let last = text_leaf(name.get(LAST_NAME_KEY)).unwrap_or("");
            format!("{} {}", first, last).trim().to_string()
        }
        _ => String::new(),
    }
}

fn text_leaf(node: Option<&RawNode>) -> Option<&str> {
    match node {
        Some(RawNode::Leaf(RawValue::Text(s))) => Some(s.as_str()),
        _ => None,
    }
}

fn extract_age(node: Option<&RawNode>) -> i32 {
    match node {
        Some(RawNode::Leaf(RawValue::Integer(n))) if *n != 0 => i32::try_from(*n).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::header::FieldPath;
    use serde_json::json;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord::new();
        for (path, value) in pairs {
            record.assign(&FieldPath::parse(path).unwrap(), value).unwrap();
        }
        record
    }

    #[test]
    fn test_full_mapping() {
        let record = transform(&raw(&[
            ("name.firstName", "Ann"),
            ("name.lastName", "Lee"),
            ("age", "34"),
            ("address.city", "Paris"),
            ("hobby", "chess"),
        ]));

        assert_eq!(
            record,
            TargetRecord {
                name: "Ann Lee".to_string(),
                age: 34,
                address: Some(json!({"city": "Paris"})),
                additional_info: Some(json!({"hobby": "chess"})),
            }
        );
    }

    #[test]
    fn test_defaults_when_absent() {
        let record = transform(&RawRecord::new());
        assert_eq!(record.name, "");
        assert_eq!(record.age, 0);
        assert!(record.address.is_none());
        assert!(record.additional_info.is_none());
    }

    #[test]
    fn test_name_trimmed_with_one_part() {
        assert_eq!(transform(&raw(&[("name.firstName", "Ann")])).name, "Ann");
        assert_eq!(transform(&raw(&[("name.lastName", "Lee")])).name, "Lee");
    }

    #[test]
    fn test_flat_name_column_yields_empty_name() {
        let record = transform(&raw(&[("name", "Ann Lee"), ("age", "34")]));
        assert_eq!(record.name, "");
        assert_eq!(record.age, 34);
        assert!(record.additional_info.is_none());
    }

    #[test]
    fn test_unparsable_and_zero_age_default() {
        assert_eq!(transform(&raw(&[("age", "abc")])).age, 0);
        assert_eq!(transform(&raw(&[("age", "0")])).age, 0);
        assert_eq!(transform(&raw(&[("age", "99999999999")])).age, 0);
    }

    #[test]
    fn test_empty_age_takes_default_path() {
        let raw_record = raw(&[("age", "")]);
        assert!(raw_record.get("age").is_none());
        assert_eq!(transform(&raw_record).age, 0);
    }

    #[test]
    fn test_nested_extras_keep_shape() {
        let record = transform(&raw(&[
            ("gender", "female"),
            ("contact.email", "a@b.c"),
            ("contact.phone", "123"),
        ]));
        assert_eq!(
            record.additional_info,
            Some(json!({"gender": "female", "contact": {"email": "a@b.c", "phone": "123"}}))
        );
    }

    #[test]
    fn test_transform_is_idempotent() {
        let raw_record = raw(&[("name.firstName", "A"), ("age", "15"), ("x.y", "z")]);
        assert_eq!(transform(&raw_record), transform(&raw_record));
    }
}
