mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Clustering, Config, EmbeddingProviderConfig, Generation, GenerationBudget,
	LlmProviderConfig, Postgres, Providers, Search, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::validation("service.http_bind must be non-empty."));
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::validation("storage.postgres.dsn must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::validation("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.storage.vector_dim == 0 || cfg.storage.projection_dim == 0 {
		return Err(Error::validation(
			"storage.vector_dim and storage.projection_dim must be greater than zero.",
		));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::validation(
			"providers.embedding.dimensions must match storage.vector_dim.",
		));
	}

	for (label, base, path) in [
		("embedding", &cfg.providers.embedding.api_base, &cfg.providers.embedding.path),
		("llm", &cfg.providers.llm.api_base, &cfg.providers.llm.path),
	] {
		if base.trim().is_empty() || path.trim().is_empty() {
			return Err(Error::validation(format!(
				"Provider {label} api_base and path must be non-empty."
			)));
		}
	}

	validate_search(cfg)?;
	validate_clustering(cfg)?;

	for (label, budget) in
		[("extraction", &cfg.generation.extraction), ("summary", &cfg.generation.summary)]
	{
		if budget.max_retries == 0 {
			return Err(Error::validation(format!(
				"generation.{label}.max_retries must be greater than zero."
			)));
		}
		if budget.max_tokens == 0 {
			return Err(Error::validation(format!(
				"generation.{label}.max_tokens must be greater than zero."
			)));
		}
		if !budget.temperature.is_finite() || !(0.0..=2.0).contains(&budget.temperature) {
			return Err(Error::validation(format!(
				"generation.{label}.temperature must be in the range 0.0-2.0."
			)));
		}
	}

	if !matches!(cfg.cache.backend.as_str(), "postgres" | "memory") {
		return Err(Error::validation("cache.backend must be one of postgres or memory."));
	}
	if cfg.cache.ttl_seconds == 0 {
		return Err(Error::validation("cache.ttl_seconds must be greater than zero."));
	}
	if cfg.cache.key_prefix.trim().is_empty() {
		return Err(Error::validation("cache.key_prefix must be non-empty."));
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	let search = &cfg.search;

	if !is_open_unit(search.default_threshold) {
		return Err(Error::validation("search.default_threshold must be between 0 and 1."));
	}
	if search.default_results_per_page == 0 || search.max_results_per_page == 0 {
		return Err(Error::validation("search page sizes must be greater than zero."));
	}
	if search.default_results_per_page > search.max_results_per_page {
		return Err(Error::validation(
			"search.default_results_per_page must not exceed search.max_results_per_page.",
		));
	}
	if !search.country_simplify_tolerance.is_finite() || search.country_simplify_tolerance < 0.0 {
		return Err(Error::validation(
			"search.country_simplify_tolerance must be zero or greater.",
		));
	}

	Ok(())
}

fn validate_clustering(cfg: &Config) -> Result<()> {
	let clustering = &cfg.clustering;

	if !is_open_unit(clustering.threshold) {
		return Err(Error::validation("clustering.threshold must be between 0 and 1."));
	}
	if clustering.max_results == 0 {
		return Err(Error::validation("clustering.max_results must be greater than zero."));
	}
	if clustering.default_clusters == 0 || clustering.fallback_clusters == 0 {
		return Err(Error::validation("clustering cluster counts must be greater than zero."));
	}
	if clustering.fallback_clusters > clustering.default_clusters {
		return Err(Error::validation(
			"clustering.fallback_clusters must not exceed clustering.default_clusters.",
		));
	}
	if !clustering.tolerance.is_finite() || clustering.tolerance <= 0.0 {
		return Err(Error::validation("clustering.tolerance must be greater than zero."));
	}
	if clustering.max_iterations == 0 {
		return Err(Error::validation("clustering.max_iterations must be greater than zero."));
	}
	if clustering.summary_batches == 0
		|| clustering.summary_examples == 0
		|| clustering.summary_chunk_chars == 0
	{
		return Err(Error::validation(
			"clustering summary batches, examples and chunk chars must be greater than zero.",
		));
	}

	Ok(())
}

fn is_open_unit(value: f32) -> bool {
	value.is_finite() && value > 0.0 && value < 1.0
}

fn normalize(cfg: &mut Config) {
	cfg.providers.embedding.api_key = cfg.providers.embedding.api_key.trim().to_string();
	cfg.providers.llm.api_key = cfg.providers.llm.api_key.trim().to_string();
	cfg.cache.backend = cfg.cache.backend.trim().to_lowercase();

	while cfg.cache.key_prefix.ends_with(':') {
		cfg.cache.key_prefix.pop();
	}
}
