//! Document body values

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level key/value mapping of a document revision.
///
/// Ordered so that the encoded form, and therefore the revision digest,
/// does not depend on insertion order.
pub type Body = BTreeMap<String, Value>;

/// A value that can be stored in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(Number::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(Number::Float(n)) => Some(*n),
            Value::Number(Number::Integer(n)) => Some(*n as f64),
            _ => None,
        }
    }

    /// Value at a path such as `items[0].name`; `None` if the path is
    /// malformed or leads nowhere
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.walk(&parse_path(path).ok()?)
    }

    /// Set the value at a path, creating missing objects and arrays.
    ///
    /// An array index may address an existing element or append one past
    /// the end; anything further out is rejected.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        let segments = parse_path(path)?;
        self.assign(&segments, value, path)
    }

    pub(crate) fn walk(&self, segments: &[PathSegment<'_>]) -> Option<&Value> {
        segments.iter().try_fold(self, |current, segment| match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(*key),
            (PathSegment::Index(idx), Value::Array(arr)) => arr.get(*idx),
            _ => None,
        })
    }

    /// Write `value` at `segments`; on error `self` is left unchanged
    pub(crate) fn assign(&mut self, segments: &[PathSegment<'_>], value: Value, path: &str) -> Result<()> {
        let mut updated = self.clone();
        let mut current = &mut updated;
        for segment in segments {
            current = current.child_mut(segment, path)?;
        }
        *current = value;
        *self = updated;
        Ok(())
    }

    /// Descend one segment, replacing scalars with the container the
    /// segment needs
    fn child_mut(&mut self, segment: &PathSegment<'_>, path: &str) -> Result<&mut Value> {
        match segment {
            PathSegment::Key(key) => {
                if !matches!(self, Value::Object(_)) {
                    *self = Value::Object(BTreeMap::new());
                }
                match self {
                    Value::Object(map) => Ok(map.entry(key.to_string()).or_insert(Value::Null)),
                    _ => unreachable!("replaced with an object above"),
                }
            }
            PathSegment::Index(idx) => {
                if !matches!(self, Value::Array(_)) {
                    *self = Value::Array(Vec::new());
                }
                match self {
                    Value::Array(arr) => {
                        if *idx > arr.len() {
                            return Err(Error::InvalidPath(format!(
                                "{}: index {} is past the end of an array of {}",
                                path,
                                idx,
                                arr.len()
                            )));
                        }
                        if *idx == arr.len() {
                            arr.push(Value::Null);
                        }
                        Ok(&mut arr[*idx])
                    }
                    _ => unreachable!("replaced with an array above"),
                }
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Integer(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(Number::Integer(v.into()))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<Body> for Value {
    fn from(v: Body) -> Self {
        Value::Object(v)
    }
}

/// Number type supporting both integers and floats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

/// One step of a value path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split `a.b[0].c` into segments.
///
/// Keys are separated by dots and may be followed by any number of
/// bracketed indices. The empty path has no segments.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment<'_>>> {
    let invalid = |why: &str| Error::InvalidPath(format!("{}: {}", path, why));
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    for part in path.split('.') {
        let (key, mut indices) = part.split_at(part.find('[').unwrap_or(part.len()));
        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        segments.push(PathSegment::Key(key));

        while !indices.is_empty() {
            let close = indices
                .find(']')
                .filter(|_| indices.starts_with('['))
                .ok_or_else(|| invalid("unterminated index"))?;
            let idx = indices[1..close]
                .parse::<usize>()
                .map_err(|_| invalid("index is not a number"))?;
            segments.push(PathSegment::Index(idx));
            indices = &indices[close + 1..];
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parsing() {
        let segments = parse_path("foo.bar[0][2].baz").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("foo"),
                PathSegment::Key("bar"),
                PathSegment::Index(0),
                PathSegment::Index(2),
                PathSegment::Key("baz"),
            ]
        );
        assert!(parse_path("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_paths_are_rejected() {
        for path in ["[0]", "a..b", "a.", "a[", "a[x]", "a[0]b", "a[-1]", "a[18446744073709551616]"] {
            assert!(parse_path(path).is_err(), "{} should not parse", path);
        }
    }

    #[test]
    fn test_value_get_path() {
        let mut obj = BTreeMap::new();
        obj.insert("name".to_string(), Value::String("Alice".to_string()));
        let value = Value::Object(obj);

        assert_eq!(value.get_path("name"), Some(&Value::from("Alice")));
        assert_eq!(value.get_path("missing"), None);
        assert_eq!(value.get_path("name[0]"), None);
        assert_eq!(value.get_path(""), Some(&value));
    }

    #[test]
    fn test_value_set_path_creates_containers() {
        let mut value = Value::Object(BTreeMap::new());
        value.set_path("user.tags[0]", Value::from("a")).unwrap();
        value.set_path("user.tags[1]", Value::from("b")).unwrap();
        value.set_path("user.tags[0]", Value::from("z")).unwrap();

        assert_eq!(value.get_path("user.tags[0]"), Some(&Value::from("z")));
        assert_eq!(value.get_path("user.tags[1]"), Some(&Value::from("b")));
    }

    #[test]
    fn test_set_path_rejects_indices_past_the_end() {
        let mut value = Value::Object(BTreeMap::new());
        value.set_path("tags[0]", Value::from("a")).unwrap();
        let before = value.clone();

        assert!(matches!(
            value.set_path("tags[2]", Value::from("c")),
            Err(Error::InvalidPath(_))
        ));
        assert!(value.set_path("tags[18446744073709551615]", Value::from(1)).is_err());
        assert!(value.set_path("tags[4000000000]", Value::from(1)).is_err());
        assert_eq!(value, before);
    }

    #[test]
    fn test_json_numbers_keep_integer_kind() {
        let value: Value = serde_json::from_str(r#"{"age": 31, "score": 4.5}"#).unwrap();
        assert_eq!(value.get_path("age").and_then(Value::as_i64), Some(31));
        assert_eq!(value.get_path("score").and_then(Value::as_f64), Some(4.5));
    }
}
