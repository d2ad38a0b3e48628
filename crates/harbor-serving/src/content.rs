//! Default request decoders and response encoders.

use crate::error::{ServingError, ServingResult};
use serde_json::{Number, Value};

pub const JSON: &str = "application/json";
pub const CSV: &str = "text/csv";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const ANY: &str = "*/*";

/// Media type used when a request leaves `Content-Type` or `Accept` out.
pub const DEFAULT_CONTENT_TYPE: &str = JSON;

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }
}

/// An encoded response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Lowercased media type without parameters: `Text/CSV; charset=utf-8` is `text/csv`.
pub fn media_type(header: &str) -> String {
    header.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Picks the response type from an `Accept` header.
///
/// The first supported entry wins; wildcards select JSON.
pub fn select_accept(accept: &str) -> ServingResult<&'static str> {
    for entry in accept.split(',') {
        match media_type(entry).as_str() {
            JSON | ANY | "application/*" => return Ok(JSON),
            CSV | "text/*" => return Ok(CSV),
            _ => {}
        }
    }
    Err(ServingError::UnsupportedAccept(accept.to_string()))
}

/// Decodes `body` according to `content_type`.
pub fn decode(body: &[u8], content_type: &str) -> ServingResult<Payload> {
    match media_type(content_type).as_str() {
        JSON => decode_json(body).map(Payload::Json),
        CSV => decode_csv(body).map(Payload::Json),
        OCTET_STREAM => Ok(Payload::Bytes(body.to_vec())),
        _ => Err(ServingError::UnsupportedContentType(content_type.to_string())),
    }
}

/// Encodes `prediction` for the given `Accept` header.
pub fn encode(prediction: &Value, accept: &str) -> ServingResult<Encoded> {
    let content_type = select_accept(accept)?;
    let body = match content_type {
        CSV => encode_csv(prediction)?,
        _ => serde_json::to_vec(prediction).map_err(|e| ServingError::Internal(e.into()))?,
    };
    Ok(Encoded { body, content_type: content_type.to_string() })
}

fn decode_json(body: &[u8]) -> ServingResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServingError::UnsupportedInputShape("empty JSON body".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ServingError::UnsupportedInputShape(format!("invalid JSON body: {e}")))
}

/// Parses CSV rows into a two-dimensional array. Numeric cells become numbers.
fn decode_csv(body: &[u8]) -> ServingResult<Value> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| ServingError::UnsupportedInputShape(format!("invalid CSV body: {e}")))?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    let Some(width) = rows.first().map(Vec::len) else {
        return Err(ServingError::UnsupportedInputShape("empty CSV body".to_string()));
    };
    if let Some(bad) = rows.iter().position(|row| row.len() != width) {
        return Err(ServingError::UnsupportedInputShape(format!(
            "CSV row {} has {} columns, expected {width}",
            bad + 1,
            rows[bad].len()
        )));
    }
    Ok(Value::Array(rows.into_iter().map(Value::Array).collect()))
}

fn parse_cell(cell: &str) -> Value {
    if let Ok(n) = cell.parse::<i64>() {
        return Value::from(n);
    }
    cell.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(cell.to_string()), Value::Number)
}

/// Renders scalars, one-dimensional arrays (one value per line) and
/// two-dimensional arrays (one row per line).
fn encode_csv(prediction: &Value) -> ServingResult<Vec<u8>> {
    let unsupported =
        || ServingError::UnsupportedAccept(format!("prediction cannot be represented as {CSV}"));
    let write_err = |e: csv::Error| ServingError::Internal(e.into());

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    match prediction {
        Value::Array(items) => {
            for item in items {
                let record = match item {
                    Value::Array(row) => row
                        .iter()
                        .map(csv_scalar)
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(unsupported)?,
                    scalar => vec![csv_scalar(scalar).ok_or_else(unsupported)?],
                };
                writer.write_record(&record).map_err(write_err)?;
            }
        }
        scalar => {
            writer.write_record([csv_scalar(scalar).ok_or_else(unsupported)?]).map_err(write_err)?;
        }
    }
    writer.into_inner().map_err(|e| ServingError::Internal(anyhow::anyhow!("CSV writer: {e}")))
}

fn csv_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_type_normalization() {
        assert_eq!(media_type("Text/CSV; charset=utf-8"), "text/csv");
        assert_eq!(media_type(" application/json "), "application/json");
    }

    #[test]
    fn test_select_accept() {
        assert_eq!(select_accept("text/csv").unwrap(), CSV);
        assert_eq!(select_accept("image/png, application/json;q=0.9").unwrap(), JSON);
        assert_eq!(select_accept("*/*").unwrap(), JSON);
        assert!(matches!(select_accept("image/png"), Err(ServingError::UnsupportedAccept(_))));
    }

    #[test]
    fn test_decode_json_and_csv() {
        assert_eq!(decode(br#"{"x": [1, 2]}"#, JSON).unwrap(), Payload::Json(json!({"x": [1, 2]})));
        assert_eq!(
            decode(b"1,2.5\n3,a\n", "text/csv").unwrap(),
            Payload::Json(json!([[1, 2.5], [3, "a"]]))
        );
        assert_eq!(decode(b"\x00\x01", OCTET_STREAM).unwrap(), Payload::Bytes(vec![0, 1]));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(b"{}", "image/png"), Err(ServingError::UnsupportedContentType(_))));
        assert!(matches!(decode(b"{", JSON), Err(ServingError::UnsupportedInputShape(_))));
        assert!(matches!(decode(b"  ", JSON), Err(ServingError::UnsupportedInputShape(_))));
        assert!(matches!(decode(b"1,2\n3\n", CSV), Err(ServingError::UnsupportedInputShape(_))));
    }

    #[test]
    fn test_encode_csv_shapes() {
        let encoded = encode(&json!([[1, 2], [3, 4]]), CSV).unwrap();
        assert_eq!(String::from_utf8(encoded.body).unwrap(), "1,2\n3,4\n");
        assert_eq!(encoded.content_type, CSV);

        let encoded = encode(&json!([0.5, 0.25]), CSV).unwrap();
        assert_eq!(String::from_utf8(encoded.body).unwrap(), "0.5\n0.25\n");

        let nested = encode(&json!({"label": 1}), CSV);
        assert!(matches!(nested, Err(ServingError::UnsupportedAccept(_))));
    }

    #[test]
    fn test_csv_quoted_cells_survive() {
        let encoded = encode(&json!([["a,b", 1], ["say \"hi\"", 2]]), CSV).unwrap();
        let text = String::from_utf8(encoded.body.clone()).unwrap();
        assert_eq!(text, "\"a,b\",1\n\"say \"\"hi\"\"\",2\n");

        let decoded = decode(&encoded.body, CSV).unwrap();
        assert_eq!(decoded, Payload::Json(json!([["a,b", 1], ["say \"hi\"", 2]])));
        assert_eq!(decode(b"\"a,b\",1\n", CSV).unwrap(), Payload::Json(json!([["a,b", 1]])));
    }

    #[test]
    fn test_encode_json() {
        let encoded = encode(&json!({"label": "cat"}), JSON).unwrap();
        assert_eq!(encoded.body, br#"{"label":"cat"}"#);
        assert_eq!(encoded.content_type, JSON);
    }
}
