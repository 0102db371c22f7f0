//! Host-side dynamic values and the attribute value codec
//!
//! Callers describe entries with loosely typed values: a string-like scalar,
//! or a [`Table`] holding a 1-indexed sequence and named fields. The codec in
//! this module converts such values into owned LDAP attribute values and back.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Dynamically typed host value
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Bytes),
    Table(Table),
}

impl Value {
    /// Type name used in error reports
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
        }
    }

    /// Byte representation of a string-like value. Numbers coerce to their decimal text.
    pub fn as_bytes(&self) -> Option<Bytes> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(Bytes::from(i.to_string())),
            Value::Number(n) => Some(Bytes::from(format_number(*n))),
            _ => None,
        }
    }

    /// UTF-8 view of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_string_like(&self) -> bool {
        matches!(self, Value::String(_) | Value::Integer(_) | Value::Number(_))
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::String(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::String(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Table(Table::list(items))
    }
}

/// Host table: a 1-indexed positional sequence plus named fields.
///
/// Field order carries no meaning; fields iterate in key order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Table {
    seq: Vec<Value>,
    fields: BTreeMap<String, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding only a positional sequence
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self {
            seq: items.into_iter().map(Into::into).collect(),
            fields: BTreeMap::new(),
        }
    }

    /// Append a value to the positional sequence
    pub fn push<V: Into<Value>>(&mut self, value: V) {
        self.seq.push(value.into());
    }

    /// Set a named field, replacing any previous value
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`Table::set`]
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style [`Table::push`]
    pub fn with_item<V: Into<Value>>(mut self, value: V) -> Self {
        self.push(value);
        self
    }

    /// Positional element, 1-indexed
    pub fn get(&self, index: usize) -> Option<&Value> {
        index.checked_sub(1).and_then(|i| self.seq.get(i))
    }

    /// Named field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Length of the positional sequence
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty() && self.fields.is_empty()
    }

    /// Positional elements in order
    pub fn items(&self) -> impl Iterator<Item = &Value> {
        self.seq.iter()
    }

    /// Named fields
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Encode a scalar or a list of scalars into owned attribute values.
///
/// A string-like scalar and a one-element list encode identically.
pub fn encode(value: &Value) -> Result<Vec<Bytes>> {
    match value {
        Value::Table(table) => table
            .items()
            .enumerate()
            .map(|(i, item)| {
                item.as_bytes().ok_or(Error::InvalidValueType {
                    attribute: None,
                    position: Some(i + 1),
                    found: item.type_name(),
                })
            })
            .collect(),
        other => other.as_bytes().map(|b| vec![b]).ok_or(Error::InvalidValueType {
            attribute: None,
            position: None,
            found: other.type_name(),
        }),
    }
}

/// Decode attribute values: exactly one value yields a scalar,
/// anything else yields a list (empty for no values).
pub fn decode(mut values: Vec<Bytes>) -> Value {
    if values.len() == 1 {
        values.pop().map(Value::String).unwrap_or_default()
    } else {
        Value::Table(Table::list(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let value = Value::from("Babs Jensen");
        assert_eq!(decode(encode(&value).unwrap()), value);
    }

    #[test]
    fn test_list_round_trip_keeps_order() {
        let value = Value::from(vec!["z", "a", "m", "a"]);
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded, vec![Bytes::from("z"), "a".into(), "m".into(), "a".into()]);
        assert_eq!(decode(encoded), value);
    }

    #[test]
    fn test_single_element_list_encodes_like_scalar() {
        assert_eq!(
            encode(&Value::from(vec!["one"])).unwrap(),
            encode(&Value::from("one")).unwrap()
        );
        // the decoder reports multiplicity, so the list comes back as a scalar
        assert_eq!(decode(encode(&Value::from(vec!["one"])).unwrap()), Value::from("one"));
    }

    #[test]
    fn test_decode_multiplicity() {
        let list = decode(vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
        let table = list.as_table().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some(&Value::from("a")));
        assert_eq!(table.get(3), Some(&Value::from("c")));
        assert_eq!(table.get(0), None);

        assert_eq!(decode(Vec::new()), Value::Table(Table::new()));
    }

    #[test]
    fn test_binary_values_are_preserved() {
        let raw = Bytes::from_static(b"a\x00b\xff");
        let encoded = encode(&Value::from(raw.clone())).unwrap();
        assert_eq!(encoded, vec![raw.clone()]);
        assert_eq!(decode(encoded), Value::String(raw));
    }

    #[test]
    fn test_numbers_coerce_to_text() {
        assert_eq!(encode(&Value::Integer(42)).unwrap(), vec![Bytes::from("42")]);
        assert_eq!(encode(&Value::Number(3.0)).unwrap(), vec![Bytes::from("3")]);
        assert_eq!(encode(&Value::Number(2.5)).unwrap(), vec![Bytes::from("2.5")]);
    }

    #[test]
    fn test_invalid_value_types() {
        match encode(&Value::Boolean(true)) {
            Err(Error::InvalidValueType { position, found, .. }) => {
                assert_eq!(position, None);
                assert_eq!(found, "boolean");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let list = Value::Table(Table::list(vec![Value::from("ok"), Value::Nil]));
        match encode(&list) {
            Err(Error::InvalidValueType { position, found, .. }) => {
                assert_eq!(position, Some(2));
                assert_eq!(found, "nil");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let nested = Value::from(vec![Value::from(vec!["inner"])]);
        assert!(matches!(
            encode(&nested),
            Err(Error::InvalidValueType { position: Some(1), found: "table", .. })
        ));
    }
}
