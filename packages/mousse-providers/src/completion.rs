use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::Result;

/// One chat-completion call with a fixed system/user message pair.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
	pub system_prompt: &'a str,
	pub user_content: &'a str,
	pub max_tokens: u32,
	pub temperature: f32,
}

/// Sends the request and returns the model's raw text content.
///
/// Connection, timeout, and HTTP status failures are errors. A successful response whose body
/// is not JSON, has no choices, or has no text content yields an empty string, which callers
/// treat as an unparseable reply.
pub async fn complete(
	client: &Client,
	cfg: &mousse_config::LlmProviderConfig,
	request: &ChatRequest<'_>,
) -> Result<String> {
	let body = serde_json::json!({
		"model": cfg.model,
		"messages": [
			{ "role": "system", "content": request.system_prompt },
			{ "role": "user", "content": request.user_content },
		],
		"max_tokens": request.max_tokens,
		"temperature": request.temperature,
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let body = res.error_for_status()?.text().await?;

	Ok(completion_content(&body))
}

fn completion_content(body: &str) -> String {
	let Ok(json) = serde_json::from_str::<Value>(body) else {
		return String::new();
	};

	json.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_first_choice_content() {
		let body = serde_json::json!({
			"choices": [
				{ "message": { "role": "assistant", "content": "```json\n{\"0\": \"Floods\"}\n```" } },
				{ "message": { "content": "ignored" } }
			]
		});

		assert_eq!(completion_content(&body.to_string()), "```json\n{\"0\": \"Floods\"}\n```");
	}

	#[test]
	fn unusable_bodies_are_empty_text() {
		let null_content = serde_json::json!({ "choices": [{ "message": { "content": null } }] });

		assert_eq!(completion_content(&null_content.to_string()), "");
		assert_eq!(completion_content(r#"{"error":"model overloaded"}"#), "");
		assert_eq!(completion_content(r#"{"choices":[]}"#), "");
		assert_eq!(completion_content("<html>Bad Gateway</html>"), "");
	}
}
