use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::error::{MqError, MqResult};
use crate::serializer::Serializer;
use crate::types::payload::Payload;

/// Behavior switches for the JSON codec's special encodings
#[derive(Debug, Clone, Copy)]
pub struct JsonSerializerOptions {
    /// Encode big integers and timestamps as `__type`-tagged objects and
    /// revive them on decode
    pub typed_values: bool,

    /// Revive plain strings matching `YYYY-MM-DDTHH:MM:SS(.sss)?Z?` as
    /// timestamps on decode
    pub revive_iso_strings: bool,
}

impl Default for JsonSerializerOptions {
    fn default() -> Self {
        Self {
            typed_values: true,
            revive_iso_strings: false,
        }
    }
}

/// JSON codec with tagged big-integer and timestamp encodings
///
/// Wire shape of the tags:
/// `{"__type": "bigint", "value": "<decimal string>"}` and
/// `{"__type": "date", "value": "<ISO-8601 string>"}`.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    options: JsonSerializerOptions,
}

impl JsonSerializer {
    pub fn new(options: JsonSerializerOptions) -> Self {
        Self { options }
    }
}

impl Serializer for JsonSerializer {
    fn format(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn serialize(&self, payload: &Payload) -> MqResult<Vec<u8>> {
        let value = encode_value(payload, self.options.typed_values)?;
        serde_json::to_vec(&value).map_err(MqError::from)
    }

    fn deserialize(&self, bytes: &[u8]) -> MqResult<Payload> {
        let value: Value = serde_json::from_slice(bytes).map_err(MqError::from)?;
        Ok(decode_value(value, &self.options))
    }
}

/// Convert a payload to plain JSON without the tagged encodings
///
/// Used for typed decoding of envelope bodies; timestamps become RFC 3339
/// strings and in-range big integers become numbers.
pub fn payload_to_json(payload: &Payload) -> MqResult<Value> {
    encode_value(payload, false)
}

fn encode_value(payload: &Payload, typed: bool) -> MqResult<Value> {
    Ok(match payload {
        Payload::Null => Value::Null,
        Payload::Bool(b) => Value::Bool(*b),
        Payload::Int(n) => Value::Number((*n).into()),
        Payload::BigInt(n) => {
            if typed {
                json!({ "__type": "bigint", "value": n.to_string() })
            } else if let Ok(small) = i64::try_from(*n) {
                Value::Number(small.into())
            } else {
                return Err(MqError::serialization(format!(
                    "big integer {n} does not fit the plain JSON number range"
                )));
            }
        }
        Payload::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| {
                MqError::serialization(format!("non-finite float {f} is not representable in JSON"))
            })?,
        Payload::Text(s) => Value::String(s.clone()),
        Payload::Timestamp(t) => {
            let iso = t.to_rfc3339_opts(SecondsFormat::Millis, true);
            if typed {
                json!({ "__type": "date", "value": iso })
            } else {
                Value::String(iso)
            }
        }
        Payload::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| encode_value(item, typed))
                .collect::<MqResult<_>>()?,
        ),
        Payload::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), encode_value(v, typed)?);
            }
            Value::Object(out)
        }
    })
}

fn decode_value(value: Value, options: &JsonSerializerOptions) -> Payload {
    match value {
        Value::Null => Payload::Null,
        Value::Bool(b) => Payload::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Payload::Int(i)
            } else if let Some(u) = n.as_u64() {
                Payload::BigInt(u as i128)
            } else {
                Payload::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => {
            if options.revive_iso_strings {
                if let Some(ts) = parse_iso_timestamp(&s) {
                    return Payload::Timestamp(ts);
                }
            }
            Payload::Text(s)
        }
        Value::Array(items) => Payload::Array(
            items
                .into_iter()
                .map(|item| decode_value(item, options))
                .collect(),
        ),
        Value::Object(map) => {
            if options.typed_values {
                if let Some(revived) = revive_tagged(&map) {
                    return revived;
                }
            }
            Payload::Object(
                map.into_iter()
                    .map(|(k, v)| (k, decode_value(v, options)))
                    .collect(),
            )
        }
    }
}

/// Revive a `__type`-tagged object; None leaves it as a plain object
fn revive_tagged(map: &Map<String, Value>) -> Option<Payload> {
    if map.len() != 2 {
        return None;
    }
    let tag = map.get("__type")?.as_str()?;
    let value = map.get("value")?.as_str()?;
    match tag {
        "bigint" => value.parse::<i128>().ok().map(Payload::BigInt),
        "date" => parse_iso_timestamp(value).map(Payload::Timestamp),
        _ => None,
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS(.sss)?Z?`; anything else is None
fn parse_iso_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let rest = s.strip_suffix('Z').unwrap_or(s);
    let (base, frac) = match rest.split_once('.') {
        Some((base, frac)) => (base, Some(frac)),
        None => (rest, None),
    };
    if base.len() != 19 {
        return None;
    }
    if let Some(frac) = frac {
        if frac.is_empty() || frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    let naive = match frac {
        Some(frac) => NaiveDateTime::parse_from_str(
            &format!("{base}.{frac}"),
            "%Y-%m-%dT%H:%M:%S%.f",
        )
        .ok()?,
        None => NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H:%M:%S").ok()?,
    };
    Some(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn round_trip(payload: &Payload) -> Payload {
        let serializer = JsonSerializer::default();
        let bytes = serializer.serialize(payload).unwrap();
        serializer.deserialize(&bytes).unwrap()
    }

    #[test]
    fn test_round_trip_nested_structures() {
        let payload = Payload::object([
            ("order_id", Payload::from("123")),
            ("qty", Payload::from(2)),
            ("price", Payload::from(19.5)),
            (
                "lines",
                Payload::from(vec![
                    Payload::object([("sku", Payload::from("a-1"))]),
                    Payload::object([("sku", Payload::from("b-2"))]),
                ]),
            ),
        ]);
        assert_eq!(round_trip(&payload), payload);
    }

    #[test]
    fn test_big_int_tagged_encoding() {
        let seq = Payload::BigInt(18_446_744_073_709_551_615_i128);
        let serializer = JsonSerializer::default();

        let bytes = serializer.serialize(&seq).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw["__type"], "bigint");
        assert_eq!(raw["value"], "18446744073709551615");

        assert_eq!(serializer.deserialize(&bytes).unwrap(), seq);
    }

    #[test]
    fn test_timestamp_tagged_encoding() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        let payload = Payload::Timestamp(ts);
        let serializer = JsonSerializer::default();

        let bytes = serializer.serialize(&payload).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw["__type"], "date");
        assert_eq!(raw["value"], "2024-05-17T08:30:00.000Z");

        assert_eq!(serializer.deserialize(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_untagged_objects_pass_through() {
        // Same keys but a third field: not a tag, stays an object
        let serializer = JsonSerializer::default();
        let bytes = br#"{"__type":"bigint","value":"1","extra":true}"#;
        let decoded = serializer.deserialize(bytes).unwrap();
        assert!(matches!(decoded, Payload::Object(_)));
    }

    #[test]
    fn test_iso_revival_opt_in() {
        let plain = JsonSerializer::default();
        let reviving = JsonSerializer::new(JsonSerializerOptions {
            typed_values: true,
            revive_iso_strings: true,
        });
        let bytes = br#""2024-05-17T08:30:00Z""#;

        assert_eq!(
            plain.deserialize(bytes).unwrap(),
            Payload::Text("2024-05-17T08:30:00Z".to_string())
        );
        assert!(matches!(
            reviving.deserialize(bytes).unwrap(),
            Payload::Timestamp(_)
        ));
    }

    #[test]
    fn test_iso_pattern_rejects_near_misses() {
        assert!(parse_iso_timestamp("2024-05-17T08:30:00").is_some());
        assert!(parse_iso_timestamp("2024-05-17T08:30:00.123Z").is_some());
        assert!(parse_iso_timestamp("2024-05-17").is_none());
        assert!(parse_iso_timestamp("2024-05-17T08:30:00.1234Z").is_none());
        assert!(parse_iso_timestamp("2024-13-17T08:30:00Z").is_none());
        assert!(parse_iso_timestamp("not a date").is_none());
        assert!(parse_iso_timestamp("2024-05-17T08:30:00+02:00").is_none());
    }

    #[test]
    fn test_unrepresentable_values_surface_as_serialization_error() {
        let serializer = JsonSerializer::default();
        let err = serializer.serialize(&Payload::Float(f64::INFINITY)).unwrap_err();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_pathological_nesting_surfaces_as_serialization_error() {
        // serde_json refuses arbitrarily deep documents
        let deep = format!("{}null{}", "[".repeat(200), "]".repeat(200));
        let err = JsonSerializer::default()
            .deserialize(deep.as_bytes())
            .unwrap_err();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_huge_u64_decodes_as_big_int() {
        let serializer = JsonSerializer::default();
        let decoded = serializer.deserialize(b"18446744073709551615").unwrap();
        assert_eq!(decoded, Payload::BigInt(18_446_744_073_709_551_615_i128));
    }
}
