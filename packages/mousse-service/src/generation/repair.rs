//! Lenient clean-up of model-produced JSON.

use regex::Regex;

/// Content of the first ```` ```json ```` fenced block, if any.
pub fn fenced_json(text: &str) -> Option<&str> {
	let re = Regex::new(r"(?s)```(?:json|JSON)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").ok()?;

	re.captures(text).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Best-effort structural repair.
///
/// Skips leading prose, drops trailing commas, closes an unterminated string, closes open
/// brackets in order, and cuts anything after the first complete top-level value. Input that
/// contains no object or array is returned trimmed so the parser reports the real error.
pub fn repair_json(text: &str) -> String {
	let trimmed = text.trim();
	let Some(start) = trimmed.find(['{', '[']) else {
		return trimmed.to_string();
	};
	let mut out = String::with_capacity(trimmed.len() + 8);
	let mut stack = Vec::new();
	let mut in_string = false;
	let mut escaped = false;

	for c in trimmed[start..].chars() {
		if in_string {
			out.push(c);

			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_string = false;
			}

			continue;
		}

		match c {
			'"' => {
				in_string = true;

				out.push(c);
			},
			'{' => {
				stack.push('}');
				out.push(c);
			},
			'[' => {
				stack.push(']');
				out.push(c);
			},
			'}' | ']' => {
				drop_trailing_comma(&mut out);

				// A mismatched closer is replaced by the expected one.
				let Some(closer) = stack.pop() else {
					break;
				};

				out.push(closer);

				if stack.is_empty() {
					return out;
				}
			},
			_ => out.push(c),
		}
	}

	if in_string {
		if escaped {
			out.pop();
		}

		out.push('"');
	}

	drop_trailing_comma(&mut out);

	if out.trim_end().ends_with(':') {
		out.push_str(" null");
	}

	while let Some(closer) = stack.pop() {
		drop_trailing_comma(&mut out);
		out.push(closer);
	}

	out
}

fn drop_trailing_comma(out: &mut String) {
	let kept = out.trim_end().len();

	out.truncate(kept);

	if out.ends_with(',') {
		out.pop();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_fenced_json() {
		let text = "Sure.\n```json\n{\"a\": 1}\n```";

		assert_eq!(fenced_json(text), Some("{\"a\": 1}"));
		assert_eq!(fenced_json("{\"a\": 1}"), None);
	}

	#[test]
	fn closes_truncated_output() {
		assert_eq!(repair_json(r#"{"0": "Floods in It"#), r#"{"0": "Floods in It"}"#);
		assert_eq!(repair_json(r#"{"country": ["Italy", "#), r#"{"country": ["Italy"]}"#);
		assert_eq!(repair_json(r#"{"periodStart":"#), r#"{"periodStart": null}"#);
	}

	#[test]
	fn drops_trailing_commas_and_surrounding_prose() {
		assert_eq!(repair_json("Result: {\"a\": [1, 2,],} Thanks!"), "{\"a\": [1, 2]}");
	}

	#[test]
	fn keeps_brackets_inside_strings() {
		assert_eq!(repair_json(r#"{"t": "a } b ] c"}"#), r#"{"t": "a } b ] c"}"#);
	}

	#[test]
	fn leaves_non_json_for_the_parser() {
		assert_eq!(repair_json("  no json here "), "no json here");
	}
}
