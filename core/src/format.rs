//! Response rendering.
//!
//! Pure functions from a response (or an already-built JSON value) to the
//! text printed on stdout. Nothing here fails: a body that is not JSON is
//! printed as text in every mode.

use serde_json::{Map, Value};

use crate::dispatch::ApiResponse;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Status line, headers, blank line, body verbatim.
    Raw,
    Pretty,
    /// Compact JSON.
    #[default]
    Json,
}

pub fn render(response: &ApiResponse, mode: OutputMode) -> String {
    render_parts(
        response.status,
        &response.headers,
        &response.body,
        response.restli_id.as_deref(),
        mode,
    )
}

pub fn render_parts(
    status: u16,
    headers: &[(String, String)],
    body: &[u8],
    restli_id: Option<&str>,
    mode: OutputMode,
) -> String {
    if mode == OutputMode::Raw {
        let mut out = format!("HTTP {status}\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\n"));
        }
        out.push('\n');
        out.push_str(&String::from_utf8_lossy(body));
        return out;
    }

    let text = String::from_utf8_lossy(body);
    let parsed = if text.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str::<Value>(&text).ok()
    };
    let Some(value) = parsed else {
        return text.into_owned();
    };
    match promote_id(value, restli_id) {
        Value::Null => String::new(),
        value => render_value(&value, mode),
    }
}

/// Render a JSON value built locally, such as collected pages or an upload
/// report. Raw mode has no envelope to show, so it prints pretty JSON.
pub fn render_value(value: &Value, mode: OutputMode) -> String {
    let rendered = match mode {
        OutputMode::Json => serde_json::to_string(value),
        OutputMode::Pretty | OutputMode::Raw => serde_json::to_string_pretty(value),
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

/// The message printed on stderr for a failed invocation.
pub fn render_error(err: &Error, mode: OutputMode) -> String {
    match err {
        Error::Api { status, headers, body } => {
            let detail = render_parts(*status, headers, body.as_bytes(), None, mode);
            if mode == OutputMode::Raw {
                format!("error: API request failed\n{detail}")
            } else {
                format!("error: HTTP {status}\n{detail}")
            }
        }
        other => format!("error: {other}"),
    }
}

fn promote_id(value: Value, restli_id: Option<&str>) -> Value {
    let Some(id) = restli_id else {
        return value;
    };
    match value {
        Value::Null => {
            let mut object = Map::new();
            object.insert("id".to_string(), Value::String(id.to_string()));
            Value::Object(object)
        }
        Value::Object(mut object) => {
            if !object.contains_key("id") {
                object.insert("id".to_string(), Value::String(id.to_string()));
            }
            Value::Object(object)
        }
        other => other,
    }
}
