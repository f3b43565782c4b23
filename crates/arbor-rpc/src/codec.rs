//! Body decoding for the two response framings the service uses.
//!
//! A response is either a single JSON document or an SSE stream whose `data`
//! lines carry the JSON-RPC envelope. Some deployments emit non-conformant
//! framing, so after event parsing fails the raw text is scanned for the
//! first decodable JSON object or array.

use serde_json::Value;

use crate::RpcError;

/// Decodes an HTTP response body into a single JSON value based on the
/// declared content type.
pub fn decode_body(content_type: &str, body: &str) -> Result<Value, RpcError> {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("text/event-stream") {
        return parse_sse_json(body);
    }
    if content_type.contains("application/json") {
        return serde_json::from_str(body).map_err(|error| {
            RpcError::Decode(format!("response body is not valid JSON: {error}"))
        });
    }

    // No usable content type: try a plain JSON parse before falling back to
    // the tolerant stream handling.
    serde_json::from_str(body).or_else(|_| parse_sse_json(body))
}

/// Returns the first JSON object or array carried by an SSE payload.
fn parse_sse_json(text: &str) -> Result<Value, RpcError> {
    let normalized = text.replace("\r\n", "\n");

    let mut events: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_started = false;

    for raw_line in normalized.split('\n') {
        let line = raw_line.trim_end_matches('\r');

        if line.is_empty() {
            if current_started {
                events.push(std::mem::take(&mut current));
                current_started = false;
            }
            continue;
        }

        if line.starts_with(':') {
            // SSE comment line.
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        match field.trim() {
            "data" => {
                current.push(value.trim_start_matches(' '));
                current_started = true;
            }
            "event" => current_started = true,
            _ => {}
        }
    }
    if current_started {
        // Unterminated final event: flush whatever accumulated.
        events.push(current);
    }

    for data_lines in &events {
        for chunk in data_lines {
            let candidate = chunk.trim();
            if candidate.is_empty() || candidate == "[DONE]" || candidate == "DONE" {
                continue;
            }
            if candidate.starts_with(['{', '[']) {
                if let Ok(value) = serde_json::from_str(candidate) {
                    return Ok(value);
                }
            }
        }

        let joined = data_lines.join("\n");
        let joined = joined.trim();
        if joined.starts_with(['{', '[']) {
            if let Ok(value) = serde_json::from_str(joined) {
                return Ok(value);
            }
        }
    }

    scan_for_json(&normalized).ok_or(RpcError::NoJsonPayload)
}

/// Scans raw text for the first position at which a JSON object or array
/// decodes, tolerating trailing garbage after the value.
fn scan_for_json(text: &str) -> Option<Value> {
    for (index, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        if let Some(value) = parse_json_prefix(&text[index..]) {
            return Some(value);
        }
    }
    None
}

fn parse_json_prefix(text: &str) -> Option<Value> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some(value),
        _ => None,
    }
}
