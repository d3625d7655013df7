use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Deserialize an identifier that upstream sends as either a JSON string or a
/// number. Anything else (null, bool, object) becomes `None`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Deserialize an unsigned counter that may arrive as a number, a numeric
/// string, or null.
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Deserialize a signed id that may arrive as a number or a numeric string.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Deserialize any field, turning a value of the wrong shape into `None`
/// instead of failing the enclosing object.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// [`lenient`], falling back to `T::default()`.
pub fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Trim a string and drop it if nothing is left.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient_string")]
        id: Option<String>,
        #[serde(default, deserialize_with = "lenient_u64")]
        number: Option<u64>,
    }

    #[test]
    fn lenient_string_accepts_numbers() {
        let p: Sample = serde_json::from_str(r#"{"id": 5377}"#).expect("parse");
        assert_eq!(p.id.as_deref(), Some("5377"));
    }

    #[test]
    fn lenient_string_drops_objects_and_null() {
        let p: Sample = serde_json::from_str(r#"{"id": {"nested": true}}"#).expect("parse");
        assert_eq!(p.id, None);
        let p: Sample = serde_json::from_str(r#"{"id": null}"#).expect("parse");
        assert_eq!(p.id, None);
    }

    #[test]
    fn lenient_u64_accepts_numeric_strings() {
        let p: Sample = serde_json::from_str(r#"{"number": "42"}"#).expect("parse");
        assert_eq!(p.number, Some(42));
        let p: Sample = serde_json::from_str(r#"{"number": -1}"#).expect("parse");
        assert_eq!(p.number, None);
    }

    #[derive(Debug, Deserialize)]
    struct Nested {
        #[serde(default, deserialize_with = "lenient")]
        sample: Option<Sample>,
        #[serde(default, deserialize_with = "lenient_or_default")]
        count: i64,
        #[serde(default, deserialize_with = "lenient_i64")]
        user: Option<i64>,
    }

    #[test]
    fn wrong_shapes_degrade_instead_of_failing() {
        let n: Nested =
            serde_json::from_str(r#"{"sample": "text", "count": {"x": 1}, "user": [1]}"#).expect("parse");
        assert!(n.sample.is_none());
        assert_eq!(n.count, 0);
        assert_eq!(n.user, None);

        let n: Nested = serde_json::from_str(r#"{"sample": {"id": 3}, "count": 7, "user": "-42"}"#)
            .expect("parse");
        assert_eq!(n.sample.and_then(|p| p.id).as_deref(), Some("3"));
        assert_eq!(n.count, 7);
        assert_eq!(n.user, Some(-42));
    }

    #[test]
    fn missing_fields_default_to_none() {
        let p: Sample = serde_json::from_str("{}").expect("parse");
        assert!(p.id.is_none());
        assert!(p.number.is_none());
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  abc ")), Some("abc"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
