pub fn render_schema(vector_dim: u32, projection_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
		.replace("<VECTOR_DIM>", &vector_dim.to_string())
		.replace("<PROJECTION_DIM>", &projection_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		match line.trim().strip_prefix("\\ir ").map(str::trim) {
			Some(path) => out.push_str(include_file(path).unwrap_or(line)),
			None => out.push_str(line),
		}

		out.push('\n');
	}

	out
}

fn include_file(path: &str) -> Option<&'static str> {
	let sql = match path {
		"00_extensions.sql" => include_str!("../../../sql/00_extensions.sql"),
		"tables/001_records.sql" => include_str!("../../../sql/tables/001_records.sql"),
		"tables/002_record_locations.sql" =>
			include_str!("../../../sql/tables/002_record_locations.sql"),
		"tables/003_record_time_ranges.sql" =>
			include_str!("../../../sql/tables/003_record_time_ranges.sql"),
		"tables/004_record_embeddings.sql" =>
			include_str!("../../../sql/tables/004_record_embeddings.sql"),
		"tables/005_record_projections.sql" =>
			include_str!("../../../sql/tables/005_record_projections.sql"),
		"tables/006_topics.sql" => include_str!("../../../sql/tables/006_topics.sql"),
		"tables/007_record_topics.sql" => include_str!("../../../sql/tables/007_record_topics.sql"),
		"tables/008_countries.sql" => include_str!("../../../sql/tables/008_countries.sql"),
		"tables/009_result_cache.sql" => include_str!("../../../sql/tables/009_result_cache.sql"),
		_ => return None,
	};

	Some(sql)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_every_table_with_dimensions() {
		let sql = render_schema(1_536, 81);

		assert!(!sql.contains("\\ir "));
		assert!(!sql.contains("<VECTOR_DIM>") && !sql.contains("<PROJECTION_DIM>"));
		assert!(sql.contains("vector vector(1536)"));
		assert!(sql.contains("vector vector(81)"));

		for table in [
			"records",
			"record_locations",
			"record_time_ranges",
			"record_embeddings",
			"record_projections",
			"topics",
			"record_topics",
			"countries",
			"result_cache",
		] {
			assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")), "{table}");
		}
	}
}
