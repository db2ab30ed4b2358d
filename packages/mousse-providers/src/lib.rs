pub mod completion;
pub mod embedding;

mod error;

pub use error::{Error, Result};

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};

/// Builds the request headers for a provider. An empty key sends no `Authorization` header,
/// which is what self-hosted inference servers expect.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if !api_key.is_empty() {
		headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {api_key}"))?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("default header '{key}' must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(raw)?);
	}

	Ok(headers)
}

/// One pooled client shared by every provider call.
pub fn http_client() -> Result<Client> {
	Ok(Client::builder().build()?)
}

fn endpoint(api_base: &str, path: &str) -> String {
	format!("{}/{}", api_base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn joins_base_and_path_once() {
		assert_eq!(
			endpoint("http://llm:8000/", "/v1/chat/completions"),
			"http://llm:8000/v1/chat/completions"
		);
		assert_eq!(endpoint("http://llm:8000", "embed"), "http://llm:8000/embed");
	}
}
