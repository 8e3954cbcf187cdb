//! Sample wire format.
//!
//! A datagram carries one sample as UTF-8 text, either:
//!
//! - the bare literal `true` or `false`, optionally padded with ASCII
//!   whitespace (`"false\n"` is accepted), or
//! - a JSON object with a boolean field, `{"in_aoi": true}` by default.
//!
//! Anything else is rejected before it can reach a tracker.

use vigil_common::error::{VigilError, VigilResult};

/// Decodes datagram payloads into attention booleans.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    field: String,
}

impl PayloadDecoder {
    /// Create a decoder that reads `field` from JSON object payloads.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Decode one payload. `Ok(true)` means the gaze is inside the area of
    /// interest.
    pub fn decode(&self, payload: &[u8]) -> VigilResult<bool> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| VigilError::payload(format!("payload is not UTF-8: {e}")))?
            .trim_matches(|c: char| c.is_ascii_whitespace());

        match text {
            "true" => return Ok(true),
            "false" => return Ok(false),
            "" => return Err(VigilError::payload("empty payload")),
            _ => {}
        }

        if !text.starts_with('{') {
            return Err(VigilError::payload(format!(
                "expected `true`, `false`, or a JSON object, got {:?}",
                preview(text)
            )));
        }

        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| VigilError::payload(format!("invalid JSON payload: {e}")))?;

        match value.get(&self.field) {
            Some(serde_json::Value::Bool(b)) => Ok(*b),
            Some(other) => Err(VigilError::payload(format!(
                "field `{}` is not a boolean: {other}",
                self.field
            ))),
            None => Err(VigilError::payload(format!(
                "JSON payload has no `{}` field",
                self.field
            ))),
        }
    }

    /// Encode a sample in the bare-literal form.
    pub fn encode_literal(in_aoi: bool) -> &'static [u8] {
        if in_aoi {
            b"true\n"
        } else {
            b"false\n"
        }
    }

    /// Encode a sample as a JSON object using this decoder's field name.
    pub fn encode_json(&self, in_aoi: bool) -> Vec<u8> {
        let mut object = serde_json::Map::new();
        object.insert(self.field.clone(), serde_json::Value::Bool(in_aoi));
        serde_json::Value::Object(object).to_string().into_bytes()
    }
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new("in_aoi")
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 32;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}...")
    }
}
