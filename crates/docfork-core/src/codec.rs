//! Body codec: MessagePack on disk and in digests, JSON at the edges

use crate::error::{Error, Result};
use crate::value::{Body, Value};

/// Encode a body to its canonical binary form
pub fn encode_body(body: &Body) -> Result<Vec<u8>> {
    rmp_serde::to_vec(body).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a body previously produced by [`encode_body`]
pub fn decode_body(bytes: &[u8]) -> Result<Body> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse a JSON object into a body
pub fn body_from_json(json: &str) -> Result<Body> {
    serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
}

/// Render a body as pretty JSON
pub fn body_to_json(body: &Body) -> Result<String> {
    serde_json::to_string_pretty(body).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse a single JSON value
pub fn value_from_json(json: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
}

/// Render a value as pretty JSON
pub fn value_to_json(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_body_survives_encoding() {
        let body = body_from_json(
            r#"{"type": "bio", "age": 31, "tags": ["a", "b"], "address": {"city": "Toronto"}, "score": 0.5, "none": null}"#,
        )
        .unwrap();

        let decoded = decode_body(&encode_body(&body).unwrap()).unwrap();
        assert_eq!(decoded, body);
        assert_eq!(decoded.get("age").and_then(Value::as_i64), Some(31));
    }

    #[test]
    fn test_encoding_is_independent_of_insertion_order() {
        let mut a = Body::new();
        a.insert("x".into(), Value::from(1));
        a.insert("y".into(), Value::from(2));

        let mut b = Body::new();
        b.insert("y".into(), Value::from(2));
        b.insert("x".into(), Value::from(1));

        assert_eq!(encode_body(&a).unwrap(), encode_body(&b).unwrap());
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        assert!(body_from_json("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_scalar_values_parse_from_json() {
        assert_eq!(value_from_json("\"Toronto\"").unwrap(), Value::from("Toronto"));
        assert_eq!(value_from_json("31").unwrap().as_i64(), Some(31));
        assert_eq!(value_to_json(&Value::from(true)).unwrap(), "true");
        assert!(value_from_json("{").is_err());
    }
}
