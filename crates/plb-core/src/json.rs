// JSON form of a document.
// Tables, arrays, strings, bools and null map directly. Types JSON lacks are
// tagged objects:
//   bytes -> {"$type":"bytes","hex":"00ff"}
//   date  -> {"$type":"date","value":"2024-01-01T00:00:00Z"}
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as J, json};

use crate::error::{Error, Result};
use crate::value::{Table, Value};

pub fn decode(data: &[u8]) -> Result<Value> {
    let parsed: J = serde_json::from_slice(data).map_err(|e| Error::Format {
        message: e.to_string(),
        offset: None,
    })?;
    from_json(parsed)
}

/// Pretty-printed JSON with a trailing newline.
pub fn encode(v: &Value) -> Vec<u8> {
    format!("{:#}\n", to_json(v)).into_bytes()
}

pub fn to_json(v: &Value) -> J {
    match v {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Integer(n) => json!(*n),
        Value::Float(x) => Number::from_f64(*x).map(J::Number).unwrap_or(J::Null),
        Value::Text(s) => J::String(s.clone()),
        Value::Bytes(b) => json!({"$type": "bytes", "hex": hex::encode(b)}),
        Value::Date(d) => json!({
            "$type": "date",
            "value": d.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }),
        Value::Array(items) => J::Array(items.iter().map(to_json).collect()),
        Value::Table(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, vv) in map {
                out.insert(k.clone(), to_json(vv));
            }
            J::Object(out)
        }
    }
}

pub fn from_json(j: J) -> Result<Value> {
    let v = match j {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(b),
        J::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        J::String(s) => Value::Text(s),
        J::Array(items) => Value::Array(items.into_iter().map(from_json).collect::<Result<_>>()?),
        J::Object(map) => match tagged(&map)? {
            Some(v) => v,
            None => {
                let mut table = Table::with_capacity(map.len());
                for (k, vv) in map {
                    table.insert(k, from_json(vv)?);
                }
                Value::Table(table)
            }
        },
    };
    Ok(v)
}

// Recognise the two-key tagged forms; anything else is an ordinary table.
fn tagged(map: &Map<String, J>) -> Result<Option<Value>> {
    if map.len() != 2 {
        return Ok(None);
    }
    let v = match (map.get("$type").and_then(J::as_str), map.get("hex"), map.get("value")) {
        (Some("bytes"), Some(J::String(h)), _) => {
            let bytes = hex::decode(h)
                .map_err(|e| Error::format(format!("invalid hex in bytes value: {e}")))?;
            Value::Bytes(bytes)
        }
        (Some("date"), _, Some(J::String(s))) => {
            let d = DateTime::parse_from_rfc3339(s)
                .map_err(|e| Error::format(format!("invalid date '{s}': {e}")))?;
            Value::Date(d.with_timezone(&Utc))
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}
