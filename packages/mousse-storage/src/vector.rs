/// pgvector text literal, bound as `$n::text::vector`.
pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

/// Parses pgvector text output. Returns `None` for anything that is not a bracketed list of
/// numbers.
pub fn parse_pg_vector(text: &str) -> Option<Vec<f32>> {
	let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;

	if inner.trim().is_empty() {
		return Some(Vec::new());
	}

	inner.split(',').map(|part| part.trim().parse().ok()).collect()
}
