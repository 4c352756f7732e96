use serde_json::{json, Value};

use triad_core::errors::BackendError;
use triad_core::messages::ConversationHistory;

/// Convert a conversation into a chat-completions request body.
pub fn build_request_body(history: &ConversationHistory, model: &str, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": convert_messages(history),
    })
}

fn convert_messages(history: &ConversationHistory) -> Vec<Value> {
    history
        .turns()
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role().as_str(),
                "content": turn.content(),
            })
        })
        .collect()
}

/// Extract the completion text from a chat-completions response body.
pub fn parse_completion(body: &Value) -> Result<String, BackendError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| BackendError::MalformedResponse("response has no choices".into()))?;

    match choice.pointer("/message/content").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => Err(BackendError::MalformedResponse("empty completion".into())),
        None => Err(BackendError::MalformedResponse(
            "choice has no message content".into(),
        )),
    }
}
