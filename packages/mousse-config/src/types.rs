use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub clustering: Clustering,
	#[serde(default)]
	pub generation: Generation,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// Dimension of the full-size record embeddings used for ranking.
	pub vector_dim: u32,
	/// Dimension of the reduced projections used for clustering.
	pub projection_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_threshold: f32,
	pub default_results_per_page: u32,
	pub max_results_per_page: u32,
	/// `ST_Simplify` tolerance applied to country boundaries only.
	pub country_simplify_tolerance: f64,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_threshold: 0.2,
			default_results_per_page: 10,
			max_results_per_page: 100,
			country_simplify_tolerance: 0.1,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Clustering {
	pub threshold: f32,
	pub max_results: u32,
	pub default_clusters: u32,
	/// Cluster count used when the data cannot support the requested one.
	pub fallback_clusters: u32,
	pub seed: u64,
	pub tolerance: f64,
	pub max_iterations: u32,
	pub summary_batches: u32,
	pub summary_examples: u32,
	pub summary_chunk_chars: u32,
}
impl Default for Clustering {
	fn default() -> Self {
		Self {
			threshold: 0.5,
			max_results: 1_000,
			default_clusters: 8,
			fallback_clusters: 5,
			seed: 42,
			tolerance: 1e-6,
			max_iterations: 1_000,
			summary_batches: 2,
			summary_examples: 10,
			summary_chunk_chars: 420,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Generation {
	pub extraction: GenerationBudget,
	pub summary: GenerationBudget,
}
impl Default for Generation {
	fn default() -> Self {
		Self {
			extraction: GenerationBudget { max_retries: 3, max_tokens: 384, temperature: 0.0 },
			summary: GenerationBudget { max_retries: 3, max_tokens: 386, temperature: 0.6 },
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GenerationBudget {
	pub max_retries: u32,
	pub max_tokens: u32,
	pub temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub backend: String,
	pub ttl_seconds: u64,
	pub key_prefix: String,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			enabled: true,
			backend: "postgres".to_string(),
			ttl_seconds: 300,
			key_prefix: "semsearch:clusters".to_string(),
		}
	}
}
