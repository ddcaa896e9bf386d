//! Transport-level JSON-RPC helpers: id extraction and auth-challenge synthesis.
//!
//! The proxy never validates JSON-RPC payload semantics; it only peeks at
//! the top-level `id` field when it needs to synthesize an error reply.

use serde_json::{json, Value};

/// Extract the JSON-RPC `id` from a raw line, reducing numbers and
/// numeric strings to the nearest integer. Returns `-1` when the id is
/// absent, not representable as an integer, or the line is not valid JSON.
pub fn extract_id(line: &str) -> i64 {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return -1;
    };
    match value.get("id") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(-1),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f.round() as i64).unwrap_or(-1),
        _ => -1,
    }
}

/// Build the JSON-RPC error reply synthesized when the remote server
/// responds with `401`/`403` and the admission check permits an attempt.
pub fn synthesize_auth_challenge(id: i64, auth_url: &str) -> String {
    let text = format!(
        "This user is currently unauthorized to perform this operation. \
         Please tell them to go to {auth_url} to authenticate. \
         Then come back and tell you to try again."
    );
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "isError": true,
            "content": [{
                "type": "text",
                "text": text,
            }],
        },
    });
    body.to_string()
}
