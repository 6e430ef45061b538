//! Root field schema and field classification.
//!
//! Consumers of emitted records may rely on exactly the keys in
//! [`ROOT_FIELDS`] appearing at the top level. Every other key lives
//! under [`DATA`].

use serde_json::{Map, Value};

use crate::level::Level;
use crate::record::EventRecord;

pub const LEVEL: &str = "level";
pub const MESSAGE: &str = "message";
pub const DATA: &str = "data";
pub const ENVIRONMENT: &str = "environment";
pub const SOURCE: &str = "source";
pub const TYPE: &str = "type";
pub const COMPONENT: &str = "component";
pub const STACKTRACE: &str = "stacktrace";
pub const REQUEST_ID: &str = "requestId";
pub const TIMESTAMP: &str = "timestamp";

/// Free-form key an error value is attached under by callers.
pub const EXCEPTION: &str = "exception";

pub const ROOT_FIELDS: [&str; 10] = [
    LEVEL,
    MESSAGE,
    DATA,
    ENVIRONMENT,
    SOURCE,
    TYPE,
    COMPONENT,
    STACKTRACE,
    REQUEST_ID,
    TIMESTAMP,
];

pub fn is_root_field(key: &str) -> bool {
    ROOT_FIELDS.contains(&key)
}

/// Value of the `type` root field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Event,
    Error,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Event => "event",
            EventType::Error => "error",
        }
    }
}

/// Value of the `source` root field: which channel produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Application,
    Dependency,
}

impl Source {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Source::Application => "application",
            Source::Dependency => "dependency",
        }
    }
}

/// Warnings and above are errors, everything else is an event.
pub fn classify_type(level: Level) -> EventType {
    match level {
        Level::Warning | Level::Error | Level::Critical => EventType::Error,
        Level::Debug | Level::Info => EventType::Event,
    }
}

/// Move every non-root key of `record` under `data`, unmodified.
///
/// Returns a new record and leaves the input alone. An existing `data`
/// object is extended; a `data` value that is not an object is kept as
/// `data.data`. Applying this twice gives the same result as once.
pub fn relocate_extra_fields(record: &EventRecord) -> EventRecord {
    let mut root = Map::new();
    let mut data = match record.get(DATA) {
        Some(Value::Object(existing)) => existing.clone(),
        Some(other) => {
            let mut wrapped = Map::new();
            wrapped.insert(DATA.to_string(), other.clone());
            wrapped
        }
        None => Map::new(),
    };

    for (key, value) in record.entries() {
        if key == DATA {
            continue;
        }
        if is_root_field(key) {
            root.insert(key.clone(), value.clone());
        } else {
            data.insert(key.clone(), value.clone());
        }
    }

    root.insert(DATA.to_string(), Value::Object(data));
    EventRecord::from_parts(root, record.exception().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EventRecord {
        let mut fields = Map::new();
        fields.insert("user_id".into(), json!(42));
        fields.insert("reason".into(), json!("invalid password"));
        let mut record = EventRecord::new("authentication failed", fields, None);
        record.insert(LEVEL, "error");
        record.insert(TYPE, "error");
        record.insert(COMPONENT, "auth");
        record
    }

    #[test]
    fn type_is_error_for_warning_and_above() {
        for level in Level::ALL {
            let expected = match level {
                Level::Warning | Level::Error | Level::Critical => EventType::Error,
                _ => EventType::Event,
            };
            assert_eq!(classify_type(level), expected, "level {level}");
        }
    }

    #[test]
    fn relocation_partitions_keys() {
        let record = sample();
        let relocated = relocate_extra_fields(&record);

        let mut seen = 0;
        for key in relocated.entries().keys() {
            assert!(is_root_field(key), "{key} left at root");
            seen += 1;
        }
        let data = relocated.data().unwrap();
        assert_eq!(data.get("user_id"), Some(&json!(42)));
        assert_eq!(data.get("reason"), Some(&json!("invalid password")));
        for key in data.keys() {
            assert!(!relocated.entries().contains_key(key) || key == DATA);
        }
        // level, type, component, message, data
        assert_eq!(seen, 5);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn relocation_is_idempotent_and_pure() {
        let record = sample();
        let before = record.clone();
        let once = relocate_extra_fields(&record);
        let twice = relocate_extra_fields(&once);

        assert_eq!(record, before);
        assert_eq!(once, twice);
    }

    #[test]
    fn relocation_extends_existing_data() {
        let mut fields = Map::new();
        fields.insert("component".into(), json!("shadowed"));
        fields.insert("extra".into(), json!(true));
        let record = EventRecord::new("m", fields, None);

        let relocated = relocate_extra_fields(&record);
        let data = relocated.data().unwrap();
        assert_eq!(data.get("component"), Some(&json!("shadowed")));
        assert_eq!(data.get("extra"), Some(&json!(true)));
    }

    #[test]
    fn non_object_data_is_preserved() {
        let mut record = EventRecord::new("m", Map::new(), None);
        record.insert(DATA, "scalar");

        let relocated = relocate_extra_fields(&record);
        assert_eq!(relocated.data().unwrap().get(DATA), Some(&json!("scalar")));
    }
}
