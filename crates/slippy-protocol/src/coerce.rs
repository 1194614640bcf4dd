//! Lenient scalar decoding shared by requests and mesh frames.
//!
//! Both clients and the device firmware are loose about JSON types: an
//! address may arrive as `"0x01234567"` or as a bare number, a service id as
//! `7` or `"7"`. These helpers normalise such values while still rejecting
//! arrays, objects, booleans and nulls.

use serde::de::{self, Deserialize, Deserializer, Unexpected};
use serde_json::Value;

/// Accept a string or a number; numbers are rendered in decimal.
pub(crate) fn string_like<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::invalid_type(
            unexpected(&other),
            &"a string or number",
        )),
    }
}

/// Accept an integer, a float (truncated toward zero) or an integer string.
pub(crate) fn integer_like<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    to_integer(&value).ok_or_else(|| de::Error::invalid_type(unexpected(&value), &"an integer"))
}

/// Like [`integer_like`] but restricted to `0..=255`.
pub(crate) fn byte_like<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = integer_like(deserializer)?;
    u8::try_from(value).map_err(|_| {
        de::Error::invalid_value(Unexpected::Signed(value), &"an integer between 0 and 255")
    })
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}
