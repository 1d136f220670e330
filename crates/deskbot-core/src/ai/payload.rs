//! `generateContent` request bodies and response parsing

use serde_json::{json, Value};

use super::types::Turn;
use crate::config::AiSettings;
use crate::constants::ai::PRIMING_ACK;

/// Endpoint for `model`; the credential travels in a header, never here
pub fn endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    )
}

/// Full request body for one exchange
///
/// The system prompt rides in a priming user turn followed by a canned model
/// acknowledgment, then the rolling history in order.
pub fn build_request(system_prompt: &str, history: &[Turn], settings: &AiSettings) -> Value {
    let mut contents = Vec::with_capacity(history.len() + 2);
    contents.push(Turn::user(system_prompt).to_content());
    contents.push(Turn::model(PRIMING_ACK).to_content());
    contents.extend(history.iter().map(Turn::to_content));

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": settings.temperature,
            "maxOutputTokens": settings.max_output_tokens,
        },
    });
    if settings.grounding {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

/// Smallest possible request, used to check that a key is accepted
pub fn verification_request() -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": "ping" }] }],
        "generationConfig": { "maxOutputTokens": 1 },
    })
}

/// Text of the first candidate's parts, if any
pub fn extract_text(body: &Value) -> Option<String> {
    let parts = body["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Human-readable message from a provider error envelope
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = error["message"].as_str().map(str::trim).unwrap_or("");
    let status = error["status"].as_str().unwrap_or("");
    match (message.is_empty(), status.is_empty()) {
        (false, false) => Some(format!("{status}: {message}")),
        (false, true) => Some(message.to_string()),
        (true, false) => Some(status.to_string()),
        (true, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_has_no_credential() {
        let url = endpoint("https://example.test/v1beta/", "gemini-2.0-flash");
        assert_eq!(
            url,
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn request_primes_then_replays_history() {
        let history = vec![
            Turn::user("How do I wipe an iPad?"),
            Turn::model("Use Erase All Content."),
            Turn::user("And a Chromebook?"),
        ];
        let body = build_request("be helpful", &history, &AiSettings::default());

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 5);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "be helpful");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], PRIMING_ACK);
        assert_eq!(contents[4]["parts"][0]["text"], "And a Chromebook?");

        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert!(body["tools"][0].get("google_search").is_some());
    }

    #[test]
    fn grounding_can_be_disabled() {
        let settings = AiSettings {
            grounding: false,
            ..Default::default()
        };
        let body = build_request("sys", &[], &settings);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn extracts_candidate_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hold " }, { "text": "power." }] } }]
        });
        assert_eq!(extract_text(&body).as_deref(), Some("Hold power."));
        assert!(extract_text(&json!({ "candidates": [] })).is_none());
        assert!(extract_text(&json!({ "promptFeedback": { "blockReason": "SAFETY" } })).is_none());
    }

    #[test]
    fn reads_error_envelope() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("INVALID_ARGUMENT: API key not valid.")
        );
        assert!(error_message("<html>bad gateway</html>").is_none());
    }
}
