//! Provider replies and the canonical geolocation record

use crate::error::FetchError;
use crate::fetch::transport::HttpResponse;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Reason phrases that mark a provider error as a rate limit
const RATE_LIMIT_PHRASES: [&str; 2] = ["limit", "too many requests"];

/// One provider's reply: usable data, or the reason there is none
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    Data(Map<String, Value>),
    Error(String),
}

impl ProviderResponse {
    pub fn error(reason: impl Into<String>) -> Self {
        ProviderResponse::Error(reason.into())
    }

    /// A JSON object whose `error` key holds a truthy value is an error
    /// reply; `null`, `false`, `0` and empty values are ignored.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => match map.get("error").filter(|e| is_truthy(e)) {
                Some(Value::String(reason)) => ProviderResponse::Error(reason.clone()),
                Some(reason) => ProviderResponse::Error(reason.to_string()),
                None => ProviderResponse::Data(map),
            },
            _ => ProviderResponse::error("Unexpected response shape"),
        }
    }

    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(value),
            Err(_) => ProviderResponse::error("Invalid JSON"),
        }
    }

    /// Interpret the outcome of a resilient fetch
    pub fn from_fetch(result: Result<HttpResponse, FetchError>) -> Self {
        match result {
            Ok(response) => Self::from_body(&response.body),
            Err(e) => match e.response() {
                Some(response) if matches!(response.status, 402 | 429) => {
                    ProviderResponse::Error(format!("rate limited (HTTP {})", response.status))
                }
                Some(response) => Self::from_body(&response.body),
                None => ProviderResponse::error("No response"),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ProviderResponse::Error(_))
    }

    pub fn error_reason(&self) -> Option<&str> {
        match self {
            ProviderResponse::Error(reason) => Some(reason),
            ProviderResponse::Data(_) => None,
        }
    }

    /// True for error replies whose reason reports a rate limit
    pub fn is_rate_limited(&self) -> bool {
        self.error_reason().is_some_and(|reason| {
            let reason = reason.to_lowercase();
            RATE_LIMIT_PHRASES.iter().any(|p| reason.contains(p))
        })
    }

    /// Resolve a dotted key path; `None` for error replies, missing keys,
    /// nulls, and paths that cross a non-object.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        match self {
            ProviderResponse::Data(map) => resolve_path(map, path),
            ProviderResponse::Error(_) => None,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Walk `path` (e.g. `connection.isp`) through nested objects
pub fn resolve_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

/// A canonical field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl FieldValue {
    /// Convert a JSON value; nested objects and arrays become text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64()?),
            }),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            other => Some(FieldValue::Text(other.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(s) => s.parse().ok(),
            FieldValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Merged geolocation result plus the two replies it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    fields: Vec<(String, Option<FieldValue>)>,
    primary: ProviderResponse,
    secondary: ProviderResponse,
}

impl GeoRecord {
    pub(crate) fn new(
        fields: Vec<(String, Option<FieldValue>)>,
        primary: ProviderResponse,
        secondary: ProviderResponse,
    ) -> Self {
        Self {
            fields,
            primary,
            secondary,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Fields in table order
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// False when no field resolved from either provider
    pub fn has_data(&self) -> bool {
        self.fields.iter().any(|(_, value)| value.is_some())
    }

    pub fn primary(&self) -> &ProviderResponse {
        &self.primary
    }

    pub fn secondary(&self) -> &ProviderResponse {
        &self.secondary
    }

    /// Latitude and longitude, when both resolved
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.get("latitude")?.as_f64()?;
        let lon = self.get("longitude")?.as_f64()?;
        Some((lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_error_key() {
        assert_eq!(
            ProviderResponse::from_value(json!({"error": "No response", "country": "X"})),
            ProviderResponse::error("No response")
        );
        assert!(ProviderResponse::from_value(json!({"error": true})).is_error());
        assert!(ProviderResponse::from_value(json!([1, 2])).is_error());
    }

    #[test]
    fn test_falsy_error_key_is_data() {
        for marker in [json!(null), json!(false), json!(""), json!(0)] {
            let reply = ProviderResponse::from_value(json!({"error": marker, "city": "Oslo"}));
            assert_eq!(reply.lookup("city"), Some(&json!("Oslo")));
        }
    }

    #[test]
    fn test_from_body_invalid_json() {
        assert_eq!(
            ProviderResponse::from_body("<html>"),
            ProviderResponse::error("Invalid JSON")
        );
    }

    #[test]
    fn test_from_fetch() {
        let ok = ProviderResponse::from_fetch(Ok(HttpResponse::new(200, r#"{"city":"Oslo"}"#)));
        assert_eq!(ok.lookup("city"), Some(&json!("Oslo")));

        let none = ProviderResponse::from_fetch(Err(FetchError::Exhausted {
            attempts: 1,
            best_response: None,
        }));
        assert_eq!(none, ProviderResponse::error("No response"));

        let limited = ProviderResponse::from_fetch(Err(FetchError::Exhausted {
            attempts: 1,
            best_response: Some(HttpResponse::new(429, "")),
        }));
        assert!(limited.is_rate_limited());

        let not_found = ProviderResponse::from_fetch(Err(FetchError::Exhausted {
            attempts: 1,
            best_response: Some(HttpResponse::new(404, r#"{"error":"not found"}"#)),
        }));
        assert_eq!(not_found, ProviderResponse::error("not found"));
    }

    #[test]
    fn test_is_rate_limited() {
        assert!(ProviderResponse::error("You've hit the monthly limit").is_rate_limited());
        assert!(ProviderResponse::error("Too Many Requests").is_rate_limited());
        assert!(!ProviderResponse::error("invalid query").is_rate_limited());
        assert!(!ProviderResponse::Data(Map::new()).is_rate_limited());
    }

    #[test]
    fn test_resolve_path() {
        let value = json!({
            "connection": {"isp": "Example ISP", "asn": 64500},
            "flat": "x",
            "nothing": null
        });
        let map = value.as_object().unwrap();

        assert_eq!(resolve_path(map, "connection.isp"), Some(&json!("Example ISP")));
        assert_eq!(resolve_path(map, "flat"), Some(&json!("x")));
        assert_eq!(resolve_path(map, "flat.deeper"), None);
        assert_eq!(resolve_path(map, "connection.missing"), None);
        assert_eq!(resolve_path(map, "nothing"), None);
        assert_eq!(resolve_path(map, "absent.isp"), None);
    }

    #[test]
    fn test_field_value_from_json() {
        assert_eq!(FieldValue::from_json(&json!(null)), None);
        assert_eq!(FieldValue::from_json(&json!(42)), Some(FieldValue::Integer(42)));
        assert_eq!(FieldValue::from_json(&json!(51.5)), Some(FieldValue::Float(51.5)));
        assert_eq!(
            FieldValue::from_json(&json!({"id": "UTC"})),
            Some(FieldValue::Text(r#"{"id":"UTC"}"#.to_string()))
        );
        assert_eq!(FieldValue::Float(51.5).to_string(), "51.5");
        assert_eq!(FieldValue::Text("-0.12".into()).as_f64(), Some(-0.12));
    }
}
