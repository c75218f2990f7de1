use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A typed column value for a parameterised INSERT/UPDATE
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    BigInt(Option<i64>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    /// JSONB column; `Value::Null` binds SQL NULL
    Json(Value),
}

impl ColumnValue {
    pub fn text(value: impl Into<String>) -> Self {
        ColumnValue::Text(Some(value.into()))
    }

    /// The value as it appears in the row's JSON representation
    pub fn to_json(&self) -> Value {
        match self {
            ColumnValue::Text(v) => v.clone().map(Value::String).unwrap_or(Value::Null),
            ColumnValue::BigInt(v) => v.map(Value::from).unwrap_or(Value::Null),
            ColumnValue::Uuid(v) => v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null),
            ColumnValue::Timestamp(v) => v
                .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Micros, true)))
                .unwrap_or(Value::Null),
            ColumnValue::Json(v) => v.clone(),
        }
    }
}

/// Ordered set of columns written by one insert or update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    columns: Vec<(&'static str, ColumnValue)>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any earlier value for it
    pub fn set(&mut self, column: &'static str, value: ColumnValue) -> &mut Self {
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(&'static str, ColumnValue)] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        self.columns
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }

    /// Byte length of the compact JSON encoding of the row payload
    pub fn serialized_len(&self) -> serde_json::Result<usize> {
        Ok(serde_json::to_vec(&self.to_json_map())?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_replaces_existing_column() {
        let mut write = WriteSet::new();
        write.set("title", ColumnValue::text("a"));
        write.set("title", ColumnValue::text("b"));
        assert_eq!(write.columns().len(), 1);
        assert_eq!(write.get("title"), Some(&ColumnValue::text("b")));
    }

    #[test]
    fn json_map_renders_nulls_and_values() {
        let mut write = WriteSet::new();
        write
            .set("content_storage_path", ColumnValue::Text(None))
            .set("content_size", ColumnValue::BigInt(Some(5000)))
            .set("tags", ColumnValue::Json(json!(["x"])));

        let map = write.to_json_map();
        assert_eq!(map["content_storage_path"], Value::Null);
        assert_eq!(map["content_size"], json!(5000));
        assert_eq!(map["tags"], json!(["x"]));
        assert_eq!(
            write.serialized_len().unwrap(),
            serde_json::to_vec(&map).unwrap().len()
        );
    }
}
