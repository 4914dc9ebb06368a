//! Hydration payload validation and embedding.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SsrCoreError, MAX_PAYLOAD_SIZE};

/// Global the payload is exposed under inside a render context.
pub const DATA_GLOBAL: &str = "__PRERENDER_DATA__";

/// Id of the script element carrying the payload to the browser.
pub const DATA_SCRIPT_ID: &str = "__prerender-data";

/// Pre-fetched route data injected into a render context for one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HydrationPayload {
    data: serde_json::Value,
}

impl HydrationPayload {
    /// Create a payload, validating that its serialized size is within limits.
    pub fn new(data: serde_json::Value) -> Result<Self> {
        let size = serde_json::to_string(&data)
            .map(|s| s.len())
            .map_err(|e| SsrCoreError::Serialization(e.to_string()))?;

        if size > MAX_PAYLOAD_SIZE {
            return Err(SsrCoreError::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self { data })
    }

    /// Payload for routes without data (or whose loader failed).
    pub fn null() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Serialize the payload to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.data).map_err(|e| SsrCoreError::Serialization(e.to_string()))
    }

    /// Body of the inline script that re-exposes the payload in the browser.
    ///
    /// The JSON is escaped so it cannot terminate the surrounding script
    /// element or break out of a JS string context.
    pub fn script_body(&self) -> Result<String> {
        Ok(format!(
            "window.{DATA_GLOBAL} = {};",
            escape_json_for_script(&self.to_json()?)
        ))
    }
}

/// Escape characters that are valid JSON but unsafe inside `<script>`.
pub fn escape_json_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
    out
}
