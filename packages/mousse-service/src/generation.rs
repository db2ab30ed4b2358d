//! Structured-output requests against the chat-completion service.
//!
//! Every attempt issues a fresh network call raced against the caller's cancellation token.
//! Replies are unwrapped from a fenced block when present, repaired, and parsed into the
//! caller's type. Parse failures are retried up to the attempt budget; transport failures and
//! disconnects end the operation immediately.

pub mod repair;

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use mousse_config::{GenerationBudget, LlmProviderConfig};

use crate::CompletionProvider;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerativeRequest {
	pub system_prompt: String,
	pub user_content: String,
	pub max_tokens: u32,
	pub temperature: f32,
}
impl GenerativeRequest {
	pub fn new(
		system_prompt: impl Into<String>,
		user_content: impl Into<String>,
		budget: &GenerationBudget,
	) -> Self {
		Self {
			system_prompt: system_prompt.into(),
			user_content: user_content.into(),
			max_tokens: budget.max_tokens,
			temperature: budget.temperature,
		}
	}
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
	#[error("Client disconnected during generation.")]
	ClientDisconnected,
	#[error("Completion service failed: {message}")]
	Service { message: String },
	#[error("Response did not match the expected schema: {message}")]
	InvalidResponse { message: String },
	#[error("LLM did not return a meaningful response after {attempts} attempts.")]
	Exhausted { attempts: u32, last: String },
}

/// A parsed reply and the number of failed attempts that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
	pub value: T,
	pub retries: u32,
}

/// Outcome of one attempt inside [`with_retries`].
#[derive(Debug)]
pub enum AttemptError<E> {
	Retryable(E),
	Fatal(E),
}

#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
	Exhausted { attempts: u32, last: E },
	Fatal(E),
}

/// Runs `attempt` until it succeeds, fails fatally, or `max_attempts` attempts have failed.
///
/// The attempt closure receives the zero-based attempt number. At least one attempt is made.
pub async fn with_retries<T, E, F, Fut>(
	max_attempts: u32,
	mut attempt: F,
) -> Result<Generated<T>, RetryError<E>>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, AttemptError<E>>>,
{
	let max_attempts = max_attempts.max(1);
	let mut made = 0;

	loop {
		match attempt(made).await {
			Ok(value) => return Ok(Generated { value, retries: made }),
			Err(AttemptError::Fatal(err)) => return Err(RetryError::Fatal(err)),
			Err(AttemptError::Retryable(err)) => {
				made += 1;

				if made >= max_attempts {
					return Err(RetryError::Exhausted { attempts: made, last: err });
				}
			},
		}
	}
}

/// Requests a JSON reply and parses it into `T`.
///
/// A top-level array of objects in the reply is merged into one object before parsing, since
/// the model does not reliably return a single object.
pub async fn generate<T>(
	provider: &dyn CompletionProvider,
	cfg: &LlmProviderConfig,
	request: &GenerativeRequest,
	max_attempts: u32,
	cancel: &CancellationToken,
) -> Result<Generated<T>, GenerationError>
where
	T: DeserializeOwned,
{
	let outcome = with_retries(max_attempts, |attempt| async move {
		if cancel.is_cancelled() {
			return Err(AttemptError::Fatal(GenerationError::ClientDisconnected));
		}

		let text = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				return Err(AttemptError::Fatal(GenerationError::ClientDisconnected));
			},
			reply = provider.complete(cfg, request) => reply.map_err(|err| {
				AttemptError::Fatal(GenerationError::Service { message: err.to_string() })
			})?,
		};

		parse_reply::<T>(&text).map_err(|err| {
			tracing::warn!(attempt, error = %err, "Generation attempt returned an invalid reply.");

			AttemptError::Retryable(err)
		})
	})
	.await;

	match outcome {
		Ok(generated) => Ok(generated),
		Err(RetryError::Fatal(GenerationError::ClientDisconnected)) => {
			tracing::info!("Client disconnected. Generation aborted.");

			Err(GenerationError::ClientDisconnected)
		},
		Err(RetryError::Fatal(err)) => Err(err),
		Err(RetryError::Exhausted { attempts, last }) => {
			tracing::warn!(attempts, last = %last, "Generation retries exhausted.");

			Err(GenerationError::Exhausted { attempts, last: last.to_string() })
		},
	}
}

/// Extracts, repairs, and parses one model reply.
pub fn parse_reply<T>(text: &str) -> Result<T, GenerationError>
where
	T: DeserializeOwned,
{
	let candidate = repair::fenced_json(text).unwrap_or(text);
	let repaired = repair::repair_json(candidate);
	let value: Value = serde_json::from_str(&repaired)
		.map_err(|err| GenerationError::InvalidResponse { message: err.to_string() })?;

	serde_json::from_value(merge_object_array(value))
		.map_err(|err| GenerationError::InvalidResponse { message: err.to_string() })
}

fn merge_object_array(value: Value) -> Value {
	let Value::Array(items) = value else {
		return value;
	};

	if items.is_empty() || !items.iter().all(Value::is_object) {
		return Value::Array(items);
	}

	let mut merged = Map::new();

	for item in items {
		if let Value::Object(map) = item {
			merged.extend(map);
		}
	}

	Value::Object(merged)
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use super::*;

	#[test]
	fn merges_single_key_objects() {
		let parsed: BTreeMap<String, String> =
			parse_reply(r#"[{"0": "Floods"}, {"3": "Wildfires"}]"#).expect("parse");

		assert_eq!(parsed.get("0").map(String::as_str), Some("Floods"));
		assert_eq!(parsed.get("3").map(String::as_str), Some("Wildfires"));
	}

	#[test]
	fn reads_fenced_block_before_whole_text() {
		let reply = "Here you go:\n```json\n{\"0\": \"Drought\"}\n```\nAnything else?";
		let parsed: BTreeMap<String, String> = parse_reply(reply).expect("parse");

		assert_eq!(parsed.get("0").map(String::as_str), Some("Drought"));
	}

	#[test]
	fn rejects_replies_that_do_not_fit_the_schema() {
		let err = parse_reply::<BTreeMap<String, u32>>(r#"{"0": "Drought"}"#).expect_err("schema");

		assert!(matches!(err, GenerationError::InvalidResponse { .. }));
	}

	#[tokio::test]
	async fn fatal_attempts_stop_the_loop() {
		let mut calls = 0;
		let outcome = with_retries(5, |_| {
			calls += 1;

			async { Err::<(), _>(AttemptError::Fatal("down")) }
		})
		.await;

		assert_eq!(outcome, Err(RetryError::Fatal("down")));
		assert_eq!(calls, 1);
	}

	#[tokio::test]
	async fn retryable_attempts_exhaust_the_budget() {
		let outcome = with_retries(3, |attempt| async move {
			Err::<(), _>(AttemptError::Retryable(attempt))
		})
		.await;

		assert_eq!(outcome, Err(RetryError::Exhausted { attempts: 3, last: 2 }));
	}
}
