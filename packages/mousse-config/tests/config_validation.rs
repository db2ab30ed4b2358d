use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use mousse_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let mut table = root.as_table_mut().expect("Sample config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let mut path = env::temp_dir();

	path.push(format!("mousse_config_test_{nanos}_{}_{ordinal}.toml", std::process::id()));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> mousse_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = mousse_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(payload: String, needle: &str) {
	match load_payload(payload) {
		Err(Error::Validation { message }) => assert!(
			message.contains(needle),
			"Expected validation message containing {needle:?}, got {message:?}."
		),
		other => panic!("Expected a validation error, got {other:?}."),
	}
}

#[test]
fn sample_config_loads() {
	let cfg = load_payload(SAMPLE_CONFIG_TOML.to_string()).expect("Sample config must load.");

	assert_eq!(cfg.storage.vector_dim, 768);
	assert_eq!(cfg.clustering.default_clusters, 8);
	assert_eq!(cfg.generation.summary.max_tokens, 386);
	assert_eq!(cfg.cache.key_prefix, "semsearch:clusters");
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root.as_table_mut().expect("Sample config must be a table.");

	for section in ["search", "clustering", "generation", "cache"] {
		table.remove(section);
	}

	let cfg = load_payload(toml::to_string(&root).expect("Failed to render config."))
		.expect("Config without optional sections must load.");

	assert_eq!(cfg.search.default_results_per_page, 10);
	assert_eq!(cfg.clustering.seed, 42);
	assert_eq!(cfg.clustering.summary_chunk_chars, 420);
	assert_eq!(cfg.generation.extraction.max_tokens, 384);
	assert_eq!(cfg.cache.ttl_seconds, 300);
}

#[test]
fn trailing_colons_are_stripped_from_key_prefix() {
	let cfg = load_payload(sample_with("cache", "key_prefix", Value::String("mousse:c::".into())))
		.expect("Config must load.");

	assert_eq!(cfg.cache.key_prefix, "mousse:c");
}

#[test]
fn embedding_dimensions_must_match_storage() {
	expect_validation(
		sample_with("providers.embedding", "dimensions", Value::Integer(1_024)),
		"providers.embedding.dimensions",
	);
}

#[test]
fn thresholds_must_be_inside_the_unit_interval() {
	expect_validation(
		sample_with("search", "default_threshold", Value::Float(1.0)),
		"search.default_threshold",
	);
	expect_validation(
		sample_with("clustering", "threshold", Value::Float(0.0)),
		"clustering.threshold",
	);
}

#[test]
fn default_page_size_cannot_exceed_maximum() {
	expect_validation(
		sample_with("search", "default_results_per_page", Value::Integer(500)),
		"search.default_results_per_page",
	);
}

#[test]
fn fallback_clusters_cannot_exceed_default() {
	expect_validation(
		sample_with("clustering", "fallback_clusters", Value::Integer(20)),
		"clustering.fallback_clusters",
	);
}

#[test]
fn generation_budgets_are_validated() {
	expect_validation(
		sample_with("generation.summary", "max_retries", Value::Integer(0)),
		"generation.summary.max_retries",
	);
	expect_validation(
		sample_with("generation.extraction", "temperature", Value::Float(3.5)),
		"generation.extraction.temperature",
	);
}

#[test]
fn unknown_cache_backend_is_rejected() {
	expect_validation(sample_with("cache", "backend", Value::String("valkey".into())), "cache.backend");
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("mousse_config_missing_does_not_exist.toml");

	assert!(matches!(mousse_config::load(&path), Err(Error::ReadConfig { .. })));
}

#[test]
fn malformed_toml_reports_parse_error() {
	assert!(matches!(
		load_payload("[service\nhttp_bind = 1".to_string()),
		Err(Error::ParseConfig { .. })
	));
}
